//! Wall-clock deadlines
//!
//! Every check arms a `Watchdog` as soon as it has parsed its arguments. If
//! the check is still running when the timeout passes, the watchdog prints an
//! `UNKNOWN` line naming the timeout and exits the process with code 3. Open
//! sockets are left to the OS.
//!
//! The watchdog is disarmed when it is dropped.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::check::{CheckResult, Report};
use crate::perfdata::format_number;
use crate::Status;

/// The budget a check has to finish in
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
}

impl Deadline {
    /// A deadline `timeout` from now
    pub fn new(timeout: Duration) -> Deadline {
        Deadline {
            started: Instant::now(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left, or `None` once the deadline has passed
    ///
    /// Never returns a zero duration, so the result can be handed straight to
    /// socket timeout setters.
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .checked_sub(self.elapsed())
            .filter(|d| *d > Duration::from_millis(0))
    }
}

/// The message printed when a check runs out of time
pub fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs() as f64 + f64::from(timeout.subsec_millis()) / 1000.0;
    format!(
        "check timed out after {} second{}",
        format_number(secs),
        if secs == 1.0 { "" } else { "s" }
    )
}

/// Guard for a running deadline
#[must_use = "the watchdog is disarmed as soon as it is dropped"]
#[derive(Debug)]
pub struct Watchdog {
    disarm: mpsc::Sender<()>,
}

/// Arm a watchdog that exits the process `UNKNOWN` after `timeout`
pub fn arm(short_name: &str, timeout: Duration) -> Watchdog {
    Watchdog::with_handler(short_name, timeout, |report| report.exit())
}

impl Watchdog {
    /// Arm a watchdog that hands its `UNKNOWN` report to `on_expiry`
    pub fn with_handler<F>(short_name: &str, timeout: Duration, on_expiry: F) -> Watchdog
    where
        F: FnOnce(Report) + Send + 'static,
    {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let short_name = short_name.to_owned();
        thread::spawn(move || match disarmed.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                let report = CheckResult::new(&short_name).finalize(Status::Unknown, timeout_message(timeout));
                on_expiry(report)
            }
            _ => debug!("watchdog disarmed"),
        });
        Watchdog { disarm }
    }

    /// Stop the watchdog. Dropping it does the same.
    pub fn disarm(self) {
        // the receiver may already be gone if the deadline fired
        let _ = self.disarm.send(());
    }
}
