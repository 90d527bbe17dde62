//! The result accumulator every check threads through its logic
//!
//! A check creates one `CheckResult` at startup, adds messages and perfdata
//! as it learns things, and consumes it exactly once with `finish`, `exit` or
//! `finalize`. Consuming it is what makes the result immutable: there is no
//! way to add to a finalized result or to finalize twice.

use std::cmp::max;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::thread;
use std::time::Duration;

use itertools::Itertools;
use tracing::{debug, warn};

use crate::perfdata::{PerfDatum, PerfOpts};
use crate::threshold::Thresholds;
use crate::Status;

/// One finding
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub status: Status,
    pub text: String,
}

/// How `check_messages` joins text
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOptions {
    /// Between messages of the same status
    pub join: String,
    /// Between groups of differing status. If `None`, only the messages of
    /// the worst status are reported.
    pub join_all: Option<String>,
}

impl Default for MessageOptions {
    fn default() -> MessageOptions {
        MessageOptions {
            join: " ".to_owned(),
            join_all: None,
        }
    }
}

impl MessageOptions {
    /// Report every message, grouped by status, groups joined with `sep`
    pub fn join_all(sep: &str) -> MessageOptions {
        MessageOptions {
            join_all: Some(sep.to_owned()),
            ..MessageOptions::default()
        }
    }
}

static FINALIZED: AtomicBool = AtomicBool::new(false);

/// Order that groups are reported in when `join_all` is set
const GROUP_ORDER: [Status; 4] = [
    Status::Critical,
    Status::Warning,
    Status::Unknown,
    Status::Ok,
];

#[must_use]
#[derive(Debug)]
pub struct CheckResult {
    short_name: String,
    messages: Vec<Message>,
    perfdata: Vec<PerfDatum>,
    worst: Status,
}

impl CheckResult {
    /// An empty result for the check called `short_name`, e.g. `PPTP`
    pub fn new(short_name: &str) -> CheckResult {
        CheckResult {
            short_name: short_name.to_owned(),
            messages: Vec::new(),
            perfdata: Vec::new(),
            worst: Status::Ok,
        }
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The worst status seen so far
    pub fn status(&self) -> Status {
        self.worst
    }

    pub fn add_message<S: Into<String>>(&mut self, status: Status, text: S) {
        let text = text.into();
        debug!(%status, %text, "adding message");
        self.worst = max(self.worst, status);
        self.messages.push(Message { status, text });
    }

    /// Append a datum, dropping it with a warning if it is invalid
    ///
    /// Perfdata never decides the outcome of a check, so a bad datum is not
    /// allowed to abort one.
    pub fn add_perfdata(&mut self, label: &str, value: f64, opts: PerfOpts) {
        match PerfDatum::new(label, value, opts) {
            Ok(datum) => self.perfdata.push(datum),
            Err(e) => warn!("ignoring perfdata: {}", e),
        }
    }

    /// Record how long the check took as the reserved `time` datum
    ///
    /// Replaces any earlier elapsed-time datum.
    pub fn add_elapsed(&mut self, elapsed: Duration, thresholds: &Thresholds, timeout: Option<Duration>) {
        self.perfdata.retain(|d| d.label() != crate::perfdata::TIME_LABEL);
        self.perfdata.push(PerfDatum::elapsed(
            duration_secs(elapsed),
            thresholds,
            timeout.map(duration_secs),
        ));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn perfdata(&self) -> &[PerfDatum] {
        &self.perfdata
    }

    /// Reduce the messages to one status and one piece of text
    ///
    /// No messages at all is `Ok` with empty text.
    pub fn check_messages(&self, opts: &MessageOptions) -> (Status, String) {
        let texts_for = |status: Status| {
            self.messages
                .iter()
                .filter(|m| m.status == status)
                .map(|m| m.text.as_str())
                .filter(|t| !t.is_empty())
                .join(&opts.join)
        };
        let text = match opts.join_all {
            Some(ref sep) => GROUP_ORDER
                .iter()
                .map(|s| texts_for(*s))
                .filter(|t| !t.is_empty())
                .join(sep),
            None => texts_for(self.worst),
        };
        (self.worst, text)
    }

    /// Freeze the result with an explicit status and message
    pub fn finalize<S: Into<String>>(self, status: Status, message: S) -> Report {
        Report {
            short_name: self.short_name,
            status,
            message: message.into(),
            perfdata: self.perfdata,
        }
    }

    /// `check_messages` then `finalize`
    pub fn conclude(self, opts: &MessageOptions) -> Report {
        let (status, text) = self.check_messages(opts);
        self.finalize(status, text)
    }

    /// Print the line for the given status and message, keeping any perfdata
    /// gathered so far, and exit
    pub fn exit<S: Into<String>>(self, status: Status, message: S) -> ! {
        self.finalize(status, message).exit()
    }

    /// Print the aggregate of all messages and exit
    pub fn finish(self, opts: &MessageOptions) -> ! {
        self.conclude(opts).exit()
    }
}

fn duration_secs(d: Duration) -> f64 {
    d.as_secs() as f64 + f64::from(d.subsec_nanos()) / 1e9
}

/// A finalized result: exactly what gets printed, and how the process exits
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    short_name: String,
    status: Status,
    message: String,
    perfdata: Vec<PerfDatum>,
}

impl Report {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Print the plugin line to stdout and exit with the status's code
    ///
    /// Only the first report to get here is printed. A second caller, such as
    /// the timeout watchdog racing the main thread, parks until the process
    /// is gone.
    pub fn exit(self) -> ! {
        if FINALIZED.swap(true, AtomicOrdering::SeqCst) {
            loop {
                thread::park();
            }
        }
        println!("{}", self);
        self.status.exit()
    }
}

impl fmt::Display for Report {
    /// `<SHORTNAME> <STATUS> <message>[|<perfdata> ...]`
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.short_name, self.status)?;
        // the plugin line is one line, and the first '|' starts the perfdata
        let message = self
            .message
            .lines()
            .map(str::trim)
            .join(" ")
            .replace('|', "/");
        if !message.is_empty() {
            write!(f, " {}", message)?;
        }
        if !self.perfdata.is_empty() {
            write!(f, "|{}", self.perfdata.iter().join(" "))?;
        }
        Ok(())
    }
}

/// Print one line for `short_name` and exit
///
/// For failures that happen before a `CheckResult` exists, such as bad
/// arguments.
pub fn plugin_exit<S: Into<String>>(short_name: &str, status: Status, message: S) -> ! {
    CheckResult::new(short_name).exit(status, message)
}

#[cfg(test)]
mod test {
    use super::*;

    fn result_with(messages: &[(Status, &str)]) -> CheckResult {
        let mut result = CheckResult::new("TEST");
        for &(status, text) in messages {
            result.add_message(status, text);
        }
        result
    }

    #[test]
    fn worst_status_wins() {
        let result = result_with(&[
            (Status::Ok, "a"),
            (Status::Warning, "b"),
            (Status::Critical, "c"),
        ]);
        assert_eq!(result.status(), Status::Critical);
        let (status, text) = result.check_messages(&MessageOptions::default());
        assert_eq!(status, Status::Critical);
        assert_eq!(text, "c");
    }

    #[test]
    fn unknown_does_not_hide_alerts() {
        let result = result_with(&[(Status::Unknown, "?"), (Status::Warning, "w")]);
        assert_eq!(result.status(), Status::Warning);
        let result = result_with(&[(Status::Unknown, "?"), (Status::Ok, "fine")]);
        assert_eq!(result.status(), Status::Unknown);
    }

    #[test]
    fn same_status_messages_use_join() {
        let result = result_with(&[
            (Status::Warning, "disk a"),
            (Status::Ok, "disk b"),
            (Status::Warning, "disk c"),
        ]);
        let opts = MessageOptions {
            join: ", ".to_owned(),
            join_all: None,
        };
        assert_eq!(
            result.check_messages(&opts),
            (Status::Warning, "disk a, disk c".to_owned())
        );
    }

    #[test]
    fn join_all_groups_by_status() {
        let result = result_with(&[
            (Status::Ok, "a"),
            (Status::Critical, "c1"),
            (Status::Warning, "b"),
            (Status::Critical, "c2"),
        ]);
        let mut opts = MessageOptions::join_all("; ");
        opts.join = ", ".to_owned();
        assert_eq!(
            result.check_messages(&opts),
            (Status::Critical, "c1, c2; b; a".to_owned())
        );
    }

    #[test]
    fn no_messages_is_ok() {
        let result = CheckResult::new("TEST");
        assert_eq!(
            result.check_messages(&MessageOptions::default()),
            (Status::Ok, String::new())
        );
    }

    #[test]
    fn report_line_format() {
        let mut result = CheckResult::new("PPTP");
        result.add_perfdata("channels", 64.0, PerfOpts::new());
        result.add_elapsed(
            Duration::from_millis(250),
            &Thresholds::parse(Some("1"), Some("2")).unwrap(),
            Some(Duration::from_secs(10)),
        );
        let report = result.finalize(Status::Ok, "done");
        assert_eq!(report.status().code(), 0);
        assert_eq!(
            report.to_string(),
            "PPTP OK done|channels=64;;;; time=0.25s;1;2;0;10"
        );
    }

    #[test]
    fn report_without_message_or_perfdata() {
        let report = CheckResult::new("X").finalize(Status::Unknown, "");
        assert_eq!(report.to_string(), "X UNKNOWN");
    }

    #[test]
    fn report_is_a_single_line() {
        let report = CheckResult::new("X").finalize(Status::Critical, "first\nsecond ");
        assert_eq!(report.to_string(), "X CRITICAL first second");
    }

    #[test]
    fn pipes_in_the_message_cannot_start_perfdata() {
        let mut result = CheckResult::new("PROCS");
        result.add_message(Status::Ok, "1 process matching 'cassandra|postgres'");
        result.add_perfdata("procs", 1.0, PerfOpts::new().min(0.0));
        let line = result.conclude(&MessageOptions::default()).to_string();
        assert_eq!(line.matches('|').count(), 1, "line: {}", line);
        assert_eq!(
            line,
            "PROCS OK 1 process matching 'cassandra/postgres'|procs=1;;;0;"
        );
    }

    #[test]
    fn explicit_time_label_is_dropped_not_fatal() {
        let mut result = CheckResult::new("X");
        result.add_perfdata("time", 1.0, PerfOpts::new());
        result.add_perfdata(" time", 1.0, PerfOpts::new());
        result.add_perfdata("", 1.0, PerfOpts::new());
        result.add_perfdata("ok", 1.0, PerfOpts::new());
        result.add_message(Status::Ok, "still running");
        assert_eq!(result.perfdata().len(), 1);
        assert_eq!(result.perfdata()[0].label(), "ok");
        assert_eq!(result.status(), Status::Ok);
    }

    #[test]
    fn elapsed_is_recorded_once() {
        let mut result = CheckResult::new("X");
        let t = Thresholds::default();
        result.add_elapsed(Duration::from_secs(1), &t, None);
        result.add_elapsed(Duration::from_secs(2), &t, None);
        assert_eq!(result.perfdata().len(), 1);
        assert_eq!(result.perfdata()[0].to_string(), "time=2s;;;0;");
    }

    #[test]
    fn conclude_uses_messages() {
        let report = result_with(&[(Status::Warning, "slow")]).conclude(&MessageOptions::default());
        assert_eq!(report.status(), Status::Warning);
        assert_eq!(report.message(), "slow");
        assert!(report.to_string().starts_with("TEST WARNING slow"));
    }
}
