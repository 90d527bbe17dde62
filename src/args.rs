//! Flags shared by every check
//!
//! Each check flattens `CommonArgs` into its own structopt `Args`:
//!
//! ```rust,ignore
//! #[derive(StructOpt, Debug)]
//! struct Args {
//!     #[structopt(short = "H", long = "hostname")]
//!     host: String,
//!     #[structopt(flatten)]
//!     common: CommonArgs,
//! }
//! ```

use std::cmp::max;
use std::io;
use std::time::Duration;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use crate::threshold::{Range, Thresholds};

#[derive(StructOpt, Debug)]
pub struct CommonArgs {
    #[structopt(
        short = "w",
        long = "warning",
        help = "Range to warn at, e.g. 10, 10:, ~:10, 5:10 or @5:10"
    )]
    pub warning: Option<Range>,
    #[structopt(short = "c", long = "critical", help = "Range to go critical at")]
    pub critical: Option<Range>,
    #[structopt(
        short = "t",
        long = "timeout",
        default_value = "10",
        help = "Seconds before the check gives up and reports UNKNOWN"
    )]
    pub timeout: u64,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Log more to stderr. May be repeated"
    )]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.warning.clone(), self.critical.clone())
    }

    /// The configured timeout, at least one second
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(max(self.timeout, 1))
    }

    pub fn init_logging(&self) {
        init_logging(self.verbose)
    }
}

/// Send `tracing` output to stderr
///
/// Stdout belongs to the plugin line. `RUST_LOG` wins over the verbosity
/// count when it is set.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // a second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(StructOpt, Debug)]
    #[structopt(name = "check-test")]
    struct Args {
        #[structopt(short = "H", long = "hostname")]
        host: String,
        #[structopt(flatten)]
        common: CommonArgs,
    }

    fn build_args(argv: Vec<&str>) -> Args {
        Args::from_iter(argv.into_iter())
    }

    #[test]
    fn defaults() {
        let args = build_args(vec!["check-test", "-H", "vpn.example.org"]);
        assert_eq!(args.host, "vpn.example.org");
        assert_eq!(args.common.warning, None);
        assert_eq!(args.common.critical, None);
        assert_eq!(args.common.timeout(), Duration::from_secs(10));
        assert_eq!(args.common.verbose, 0);
    }

    #[test]
    fn thresholds_parse_as_ranges() {
        let args = build_args(vec![
            "check-test", "-H", "h", "-w", "5", "-c", "@10:20", "-t", "3", "-vv",
        ]);
        let t = args.common.thresholds();
        assert_eq!(t.warning, Some("5".parse().unwrap()));
        assert_eq!(t.critical, Some("@10:20".parse().unwrap()));
        assert_eq!(args.common.timeout(), Duration::from_secs(3));
        assert_eq!(args.common.verbose, 2);
    }

    #[test]
    fn rejects_bad_ranges() {
        let res = Args::from_iter_safe(vec!["check-test", "-H", "h", "-w", "20:10"].into_iter());
        assert!(res.is_err());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let args = build_args(vec!["check-test", "-H", "h", "-t", "0"]);
        assert_eq!(args.common.timeout(), Duration::from_secs(1));
    }
}
