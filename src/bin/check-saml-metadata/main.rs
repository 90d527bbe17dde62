//! Check that a SAML metadata document is being published and is not about to
//! expire

mod metadata;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use structopt::StructOpt;
use tracing::{debug, info};

use vigil_plugins::args::CommonArgs;
use vigil_plugins::check::{CheckResult, MessageOptions};
use vigil_plugins::perfdata::PerfOpts;
use vigil_plugins::threshold::{check_threshold, Range, Thresholds};
use vigil_plugins::timeout::{self, timeout_message, Deadline};
use vigil_plugins::Status;

use crate::metadata::{days_left, parse, parse_valid_until, Metadata, MetadataError};

const SHORT_NAME: &str = "SAML_METADATA";

/// Check a published SAML metadata document
///
/// Fetches the document, makes sure it is SAML metadata, and compares the
/// days left until its validUntil against -w and -c.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-saml-metadata (part of vigil-plugins)",
    raw(setting = "structopt::clap::AppSettings::ColoredHelp"),
    after_help = "Examples:

    Warn two weeks before the federation aggregate expires, go critical one
    week before:

        check-saml-metadata -u https://md.example.org/aggregate.xml -w 14: -c 7:

    Make sure our IdP is still listed:

        check-saml-metadata -u https://md.example.org/aggregate.xml \\
            --entity-id https://idp.example.org/idp/shibboleth"
)]
struct Args {
    #[structopt(short = "u", long = "url", help = "Where the metadata is published")]
    url: String,
    #[structopt(
        long = "entity-id",
        help = "Go critical unless this entityID appears in the document"
    )]
    entity_id: Option<String>,
    #[structopt(
        long = "require-valid-until",
        help = "Go critical if the document has no validUntil"
    )]
    require_valid_until: bool,
    #[structopt(
        long = "response-warning",
        help = "Range of seconds the response time should stay out of"
    )]
    response_warning: Option<Range>,
    #[structopt(long = "response-critical", help = "Like --response-warning, but critical")]
    response_critical: Option<Range>,
    #[structopt(flatten)]
    common: CommonArgs,
}

impl Args {
    fn response_thresholds(&self) -> Thresholds {
        Thresholds::new(self.response_warning.clone(), self.response_critical.clone())
    }
}

fn fetch(url: &str, deadline: &Deadline) -> Result<String, MetadataError> {
    let client = Client::builder()
        .timeout(deadline.remaining().unwrap_or_else(|| Duration::from_millis(1)))
        .user_agent(concat!("vigil-plugins/", env!("CARGO_PKG_VERSION")))
        .build()?;
    debug!(url, "fetching metadata");
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(MetadataError::BadStatus(status));
    }
    Ok(response.text()?)
}

/// Turn a parsed document into findings
fn evaluate(mut result: CheckResult, md: &Metadata, now: &DateTime<Utc>, args: &Args) -> CheckResult {
    let thresholds = args.common.thresholds();

    if let Some(ref wanted) = args.entity_id {
        if !md.entity_ids.iter().any(|id| id == wanted) {
            result.add_message(Status::Critical, format!("entityID {} not found", wanted));
        }
    }

    match md.valid_until {
        None if args.require_valid_until => {
            result.add_message(Status::Critical, "document has no validUntil")
        }
        None => result.add_message(Status::Ok, "no validUntil"),
        Some(ref raw) => match parse_valid_until(raw) {
            Err(e) => result.add_message(
                Status::Unknown,
                format!("unable to parse validUntil '{}': {}", raw, e),
            ),
            Ok(until) => {
                let days = days_left(&until, now);
                let status = if days <= 0.0 {
                    Status::Critical
                } else {
                    check_threshold(days, &thresholds)
                };
                let text = if days <= 0.0 {
                    format!("metadata expired at {}", raw)
                } else {
                    format!("valid until {} ({:.1} days left)", raw, days)
                };
                result.add_message(status, text);
                result.add_perfdata(
                    "days_left",
                    (days * 100.0).round() / 100.0,
                    PerfOpts::new().thresholds(&thresholds),
                );
            }
        },
    }

    result.add_message(
        Status::Ok,
        format!("{} with {} entities", md.root, md.entity_ids.len()),
    );
    result
}

/// Compare the response time against the response ranges
fn evaluate_response_time(mut result: CheckResult, elapsed: Duration, args: &Args) -> CheckResult {
    let thresholds = args.response_thresholds();
    let secs = elapsed.as_secs() as f64 + f64::from(elapsed.subsec_millis()) / 1000.0;
    let status = check_threshold(secs, &thresholds);
    if status != Status::Ok {
        result.add_message(status, format!("response time {:.3}s", secs));
    }
    result.add_elapsed(elapsed, &thresholds, Some(args.common.timeout()));
    result
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::from_args();
    args.common.init_logging();
    let deadline = Deadline::new(args.common.timeout());
    let _watchdog = timeout::arm(SHORT_NAME, deadline.timeout());

    let result = CheckResult::new(SHORT_NAME);
    let body = match fetch(&args.url, &deadline) {
        Ok(body) => body,
        Err(ref e) if e.is_timeout() => result.exit(Status::Unknown, timeout_message(deadline.timeout())),
        Err(e) => {
            info!("fetching {} failed: {}", args.url, e);
            result.exit(Status::Critical, e.to_string())
        }
    };
    let result = evaluate_response_time(result, deadline.elapsed(), &args);

    let md = match parse(&body) {
        Ok(md) => md,
        Err(e) => result.exit(Status::Critical, e.to_string()),
    };
    let result = evaluate(result, &md, &Utc::now(), &args);
    result.finish(&MessageOptions::join_all(", "))
}
