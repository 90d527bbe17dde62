//! Vigil: Nagios-compatible network health checks
//!
//! Every script in this crate is a single process that polls one external
//! resource, decides on a [`Status`](enum.Status.html) and prints exactly one
//! line in the monitoring-plugins format before exiting with the matching
//! code:
//!
//! ```plain
//! PPTP OK server vpn1 (Linux) firmware 1 protocol 1.0|time=0.004s;1;5;0;10
//! ```
//!
//! The shared pieces live here:
//!
//! * [`threshold`](threshold/index.html): `-w`/`-c` range parsing and
//!   `check_threshold`
//! * [`perfdata`](perfdata/index.html): performance data rendering
//! * [`check`](check/index.html): the `CheckResult` accumulator and the one
//!   terminal `plugin_exit`
//! * [`timeout`](timeout/index.html): the wall-clock watchdog
//! * [`args`](args/index.html): the flags every check shares, and logging
//!
//! A check threads one `CheckResult` through its logic and consumes it at the
//! end:
//!
//! ```rust,no_run
//! use vigil_plugins::check::{CheckResult, MessageOptions};
//! use vigil_plugins::threshold::{check_threshold, Thresholds};
//! use vigil_plugins::perfdata::PerfOpts;
//!
//! let thresholds = Thresholds::parse(Some("10"), Some("20")).unwrap();
//! let mut result = CheckResult::new("EXAMPLE");
//! let queue_len = 12.0;
//! result.add_message(
//!     check_threshold(queue_len, &thresholds),
//!     format!("queue length is {}", queue_len),
//! );
//! result.add_perfdata("queue", queue_len, PerfOpts::new().thresholds(&thresholds));
//! result.finish(&MessageOptions::default());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::process;
use std::str::FromStr;

pub mod args;
pub mod check;
pub mod perfdata;
pub mod procfs;
pub mod threshold;
pub mod timeout;

pub use crate::check::{plugin_exit, CheckResult, MessageOptions, Report};
pub use crate::threshold::{check_threshold, Range, Thresholds};

/// The outcome of a check
///
/// The discriminants are the exit codes every monitoring scheduler expects.
///
/// Ordering is by *severity*, not by exit code: `Unknown` sorts above `Ok` but
/// below `Warning`, so reducing findings with `max` never lets an
/// indeterminate result hide a real alert.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl Status {
    /// Exit the process with the code for this status
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }

    /// The process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn str_values() -> [&'static str; 4] {
        ["ok", "warning", "critical", "unknown"]
    }

    fn severity(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Unknown => 1,
            Status::Warning => 2,
            Status::Critical => 3,
        }
    }
}

impl Default for Status {
    fn default() -> Status {
        Status::Ok
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Status) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Status {
    fn cmp(&self, other: &Status) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Status, String> {
        match s.to_lowercase().as_ref() {
            "ok" => Ok(Status::Ok),
            "warning" | "warn" => Ok(Status::Warning),
            "critical" | "crit" => Ok(Status::Critical),
            "unknown" => Ok(Status::Unknown),
            _ => Err(format!(
                "Unexpected exit status '{}', expected one of: {}",
                s,
                Status::str_values().join(", ")
            )),
        }
    }
}
