//! Threshold ranges in the monitoring-plugins format
//!
//! A range describes when a value should *alert*:
//!
//! | range    | alert when                  |
//! |----------|-----------------------------|
//! | `10`     | `< 0` or `> 10`             |
//! | `10:`    | `< 10`                      |
//! | `:10`    | `> 10`                      |
//! | `~:10`   | `> 10`                      |
//! | `10:20`  | `< 10` or `> 20`            |
//! | `@10:20` | `>= 10` and `<= 20`         |
//!
//! End points are always part of the range.

use std::fmt;
use std::num::ParseFloatError;
use std::str::FromStr;

use crate::perfdata::format_number;
use crate::Status;

/// Why a range could not be parsed
#[derive(Debug, PartialEq)]
pub enum RangeError {
    Empty,
    InvalidNumber {
        input: String,
        err: ParseFloatError,
    },
    NotANumber(String),
    StartAfterEnd {
        start: f64,
        end: f64,
    },
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RangeError::Empty => write!(f, "empty threshold range"),
            RangeError::InvalidNumber { ref input, ref err } => {
                write!(f, "invalid number '{}' in threshold range: {}", input, err)
            }
            RangeError::NotANumber(ref input) => {
                write!(f, "'{}' is not a usable threshold bound", input)
            }
            RangeError::StartAfterEnd { start, end } => write!(
                f,
                "threshold range start {} is greater than its end {}",
                format_number(start),
                format_number(end)
            ),
        }
    }
}

impl std::error::Error for RangeError {}

/// A parsed threshold range
///
/// `None` on either side means that side is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    start: Option<f64>,
    end: Option<f64>,
    /// `@` was given: alert when the value is *inside*
    inside: bool,
}

impl Range {
    /// Alert if the value falls outside `start..=end`
    pub fn outside(start: Option<f64>, end: Option<f64>) -> Range {
        Range {
            start,
            end,
            inside: false,
        }
    }

    /// Alert if the value falls inside `start..=end`
    pub fn inside(start: Option<f64>, end: Option<f64>) -> Range {
        Range {
            start,
            end,
            inside: true,
        }
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    pub fn is_inverted(&self) -> bool {
        self.inside
    }

    /// Whether `value` is in this range's alert region
    pub fn alerts(&self, value: f64) -> bool {
        let within = self.start.map_or(true, |s| value >= s) && self.end.map_or(true, |e| value <= e);
        if self.inside {
            within
        } else {
            !within
        }
    }
}

fn parse_bound(s: &str) -> Result<f64, RangeError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_nan() => Err(RangeError::NotANumber(s.to_owned())),
        Ok(v) => Ok(v),
        Err(err) => Err(RangeError::InvalidNumber {
            input: s.to_owned(),
            err,
        }),
    }
}

impl FromStr for Range {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Range, RangeError> {
        let s = s.trim();
        let (inside, body) = if s.starts_with('@') {
            (true, s[1..].trim_start())
        } else {
            (false, s)
        };
        if body.is_empty() {
            return Err(RangeError::Empty);
        }

        let (start, end) = match body.find(':') {
            Some(idx) => {
                let (low, high) = (&body[..idx], &body[idx + 1..]);
                let start = match low {
                    "" | "~" => None,
                    low => Some(parse_bound(low)?),
                };
                let end = match high {
                    "" => None,
                    high => Some(parse_bound(high)?),
                };
                (start, end)
            }
            None => (Some(0.0), Some(parse_bound(body)?)),
        };

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(RangeError::StartAfterEnd { start, end });
            }
        }

        Ok(Range { start, end, inside })
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.inside {
            f.write_str("@")?;
        }
        match (self.start, self.end) {
            (Some(s), Some(e)) if s == 0.0 && !self.inside => write!(f, "{}", format_number(e)),
            (Some(s), Some(e)) => write!(f, "{}:{}", format_number(s), format_number(e)),
            (Some(s), None) => write!(f, "{}:", format_number(s)),
            (None, Some(e)) => write!(f, "~:{}", format_number(e)),
            (None, None) => f.write_str("~:"),
        }
    }
}

/// The `-w`/`-c` pair a check compares its measurement against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Thresholds {
    pub warning: Option<Range>,
    pub critical: Option<Range>,
}

impl Thresholds {
    pub fn new(warning: Option<Range>, critical: Option<Range>) -> Thresholds {
        Thresholds { warning, critical }
    }

    /// Parse both ranges from their string forms
    pub fn parse(warning: Option<&str>, critical: Option<&str>) -> Result<Thresholds, RangeError> {
        Ok(Thresholds {
            warning: warning.map(str::parse).transpose()?,
            critical: critical.map(str::parse).transpose()?,
        })
    }
}

/// Evaluate `value` against a threshold pair
///
/// The critical range is consulted first, so a value in both alert regions is
/// `Critical`. A missing range never alerts.
pub fn check_threshold(value: f64, thresholds: &Thresholds) -> Status {
    let alerts = |range: &Option<Range>| range.as_ref().map_or(false, |r| r.alerts(value));
    if alerts(&thresholds.critical) {
        Status::Critical
    } else if alerts(&thresholds.warning) {
        Status::Warning
    } else {
        Status::Ok
    }
}
