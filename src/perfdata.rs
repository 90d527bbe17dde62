//! Performance data
//!
//! Each datum renders as `label=value[UOM];[warn];[crit];[min];[max]`. The
//! trailing fields are always present, empty when unset.

use std::fmt;

use crate::threshold::{Range, Thresholds};

/// The one label checks cannot set themselves: it belongs to the elapsed-time
/// datum added by `CheckResult::add_elapsed`
pub const TIME_LABEL: &str = "time";

/// Render a number the way perfdata consumers expect
///
/// Integral values have no fractional part, everything else uses the shortest
/// representation that round-trips.
pub fn format_number(v: f64) -> String {
    if v == 0.0 {
        // avoid "-0"
        "0".to_owned()
    } else {
        format!("{}", v)
    }
}

#[derive(Debug, PartialEq)]
pub enum PerfDataError {
    EmptyLabel,
    ReservedLabel,
    InvalidLabel(String),
    InvalidUnit { label: String, uom: String },
    NotFinite { label: String, value: f64 },
}

impl fmt::Display for PerfDataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::PerfDataError::*;
        match *self {
            EmptyLabel => write!(f, "perfdata label must not be empty"),
            ReservedLabel => write!(
                f,
                "perfdata label '{}' is reserved for the elapsed time",
                TIME_LABEL
            ),
            InvalidLabel(ref label) => write!(
                f,
                "perfdata label {:?} must not contain '=' or single quotes",
                label
            ),
            InvalidUnit { ref label, ref uom } => {
                write!(f, "invalid unit of measure {:?} for '{}'", uom, label)
            }
            NotFinite { ref label, value } => {
                write!(f, "perfdata value for '{}' is not finite: {}", label, value)
            }
        }
    }
}

impl std::error::Error for PerfDataError {}

/// Everything about a datum besides its label and value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerfOpts {
    uom: Option<String>,
    warning: Option<Range>,
    critical: Option<Range>,
    min: Option<f64>,
    max: Option<f64>,
}

impl PerfOpts {
    pub fn new() -> PerfOpts {
        PerfOpts::default()
    }

    /// Unit of measure, e.g. `s`, `%`, `B` or `c`
    pub fn uom(mut self, uom: &str) -> PerfOpts {
        self.uom = Some(uom.to_owned());
        self
    }

    pub fn warning(mut self, range: Range) -> PerfOpts {
        self.warning = Some(range);
        self
    }

    pub fn critical(mut self, range: Range) -> PerfOpts {
        self.critical = Some(range);
        self
    }

    /// Copy both ranges out of a threshold pair
    pub fn thresholds(mut self, thresholds: &Thresholds) -> PerfOpts {
        self.warning = thresholds.warning.clone();
        self.critical = thresholds.critical.clone();
        self
    }

    pub fn min(mut self, min: f64) -> PerfOpts {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> PerfOpts {
        self.max = Some(max);
        self
    }
}

/// A single measurement reported after the status text
#[derive(Debug, Clone, PartialEq)]
pub struct PerfDatum {
    label: String,
    value: f64,
    opts: PerfOpts,
}

impl PerfDatum {
    /// Validate and build a datum
    ///
    /// Rejects empty labels, the reserved `time` label, labels that would
    /// break the output format, odd units and non-finite values.
    pub fn new(label: &str, value: f64, opts: PerfOpts) -> Result<PerfDatum, PerfDataError> {
        if label.trim().is_empty() {
            return Err(PerfDataError::EmptyLabel);
        }
        if label.trim() == TIME_LABEL {
            return Err(PerfDataError::ReservedLabel);
        }
        Self::build(label, value, opts)
    }

    /// The elapsed-time datum, `time=<secs>s;<warn>;<crit>;0;<timeout>`
    pub(crate) fn elapsed(seconds: f64, thresholds: &Thresholds, timeout: Option<f64>) -> PerfDatum {
        let mut opts = PerfOpts::new().uom("s").thresholds(thresholds).min(0.0);
        if let Some(timeout) = timeout {
            opts = opts.max(timeout);
        }
        PerfDatum {
            label: TIME_LABEL.to_owned(),
            // millisecond resolution is plenty for a check's runtime
            value: (seconds * 1000.0).round() / 1000.0,
            opts,
        }
    }

    fn build(label: &str, value: f64, opts: PerfOpts) -> Result<PerfDatum, PerfDataError> {
        if label.contains('=') || label.contains('\'') {
            return Err(PerfDataError::InvalidLabel(label.to_owned()));
        }
        if let Some(ref uom) = opts.uom {
            let bad = uom
                .chars()
                .any(|c| c.is_ascii_digit() || c.is_whitespace() || ";'\"=.-".contains(c));
            if bad {
                return Err(PerfDataError::InvalidUnit {
                    label: label.to_owned(),
                    uom: uom.clone(),
                });
            }
        }
        if !value.is_finite() {
            return Err(PerfDataError::NotFinite {
                label: label.to_owned(),
                value,
            });
        }
        Ok(PerfDatum {
            label: label.to_owned(),
            value,
            opts,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl fmt::Display for PerfDatum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.label.chars().any(char::is_whitespace) {
            write!(f, "'{}'", self.label)?;
        } else {
            f.write_str(&self.label)?;
        }
        write!(
            f,
            "={}{};",
            format_number(self.value),
            self.opts.uom.as_ref().map_or("", String::as_str)
        )?;
        if let Some(ref w) = self.opts.warning {
            write!(f, "{}", w)?;
        }
        f.write_str(";")?;
        if let Some(ref c) = self.opts.critical {
            write!(f, "{}", c)?;
        }
        f.write_str(";")?;
        if let Some(min) = self.opts.min {
            f.write_str(&format_number(min))?;
        }
        f.write_str(";")?;
        if let Some(max) = self.opts.max {
            f.write_str(&format_number(max))?;
        }
        Ok(())
    }
}
