//! Recoverable diagnostics and the simulation log stream.
//!
//! Warnings never stop the run. Each one is emitted through `log::warn!` and
//! kept in a [`Diagnostics`] collector so callers can inspect them afterwards.
//! The [`SimLog`] is the output of CHP `log(...)` statements.

use std::fmt;

/// A recoverable condition. Execution continues with a defined fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Division by zero; the result is 0.
    DivisionByZero { process: String },
    /// Modulo by zero; the result is 0.
    ModuloByZero { process: String },
    /// Computed width was zero or negative; clamped to 1 with value 0.
    NonPositiveWidth { process: String, width: i64 },
    /// Boolean read while undefined; read as 0.
    UndefinedBool { process: String, ident: String },
    /// Bitfield upper bound at or above the declared width.
    BitfieldOverflow {
        process: String,
        ident: String,
        hi: u32,
        width: u32,
    },
    /// Segmented transfer requested; handled as a single-segment channel.
    FragmentedChannel { channel: String },
    /// Two processes claimed the same side of a channel.
    ConcurrentAccess {
        channel: String,
        first: String,
        second: String,
    },
    /// Built-in procedure other than `log`.
    UnknownBuiltin { process: String, name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::DivisionByZero { process } => {
                write!(f, "{}: division by zero", process)
            }
            Warning::ModuloByZero { process } => {
                write!(f, "{}: modulo by zero", process)
            }
            Warning::NonPositiveWidth { process, width } => {
                write!(f, "{}: computed width {} is not positive, using 1", process, width)
            }
            Warning::UndefinedBool { process, ident } => {
                write!(f, "{}: reading undefined boolean {}", process, ident)
            }
            Warning::BitfieldOverflow {
                process,
                ident,
                hi,
                width,
            } => write!(
                f,
                "{}: bit-field {{{}}} is wider than {} (width {})",
                process, hi, ident, width
            ),
            Warning::FragmentedChannel { channel } => write!(
                f,
                "{}: need to implement the fragmented channel protocol",
                channel
            ),
            Warning::ConcurrentAccess {
                channel,
                first,
                second,
            } => write!(
                f,
                "{}: concurrent access by {} and {}",
                channel, first, second
            ),
            Warning::UnknownBuiltin { process, name } => {
                write!(f, "{}: built-in function `{}` not known", process, name)
            }
        }
    }
}

/// Collector for [`Warning`]s.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a warning.
    pub fn warn(&mut self, w: Warning) {
        log::warn!("{}", w);
        self.warnings.push(w);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn count(&self) -> usize {
        self.warnings.len()
    }

    pub fn clear(&mut self) {
        self.warnings.clear();
    }
}

/// Timestamped output of `log(...)` statements.
#[derive(Debug, Default)]
pub struct SimLog {
    lines: Vec<String>,
    echo: bool,
}

impl SimLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that also prints every line to stdout.
    pub fn echoing() -> Self {
        Self {
            lines: Vec::new(),
            echo: true,
        }
    }

    /// Append one line for `process` at `time`, issued from `slot`.
    pub fn write(&mut self, time: u64, slot: usize, process: &str, msg: &str) {
        let line = format!("[{:8} t#:{}] <{}> {}", time, slot, process, msg);
        if self.echo {
            println!("{}", line);
        }
        self.lines.push(line);
    }

    /// Append a line without the time/slot prefix.
    pub fn write_raw(&mut self, msg: &str) {
        if self.echo {
            println!("{}", msg);
        }
        self.lines.push(msg.to_string());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Drop recorded lines, keeping the echo setting.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_warnings() {
        let mut d = Diagnostics::new();
        d.warn(Warning::DivisionByZero {
            process: "p".to_string(),
        });
        assert_eq!(d.count(), 1);
        assert_eq!(d.warnings()[0].to_string(), "p: division by zero");
        d.clear();
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn test_concurrent_access_names_both() {
        let w = Warning::ConcurrentAccess {
            channel: "top.c".to_string(),
            first: "a".to_string(),
            second: "b".to_string(),
        };
        assert_eq!(w.to_string(), "top.c: concurrent access by a and b");
    }

    #[test]
    fn test_log_line_format() {
        let mut log = SimLog::new();
        log.write(42, 1, "top.p", "x=3");
        assert_eq!(log.lines()[0], "[      42 t#:1] <top.p> x=3");
    }
}
