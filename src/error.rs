use hifitime::Epoch;
use thiserror::Error;

use crate::tracking::TrackingMode;

/// Malformed session input (TLE, QTH, configuration).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("TLE must be 3 lines, not {0}")]
    TleLineCount(usize),
    #[error("TLE line {line} should start with \"{line} \"")]
    TleLineNumber { line: u8 },
    #[error("QTH must consist of a name and exactly three values (lat, long, alt), got {0}")]
    QthLineCount(usize),
    #[error("unable to convert {field} \"{value}\"")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} {value} out of range")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Angle or time outside of what the mount (or transit) accepts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RangeError {
    #[error("time {t} outside transit [{start}, {end}]")]
    OutsideTransit { t: Epoch, start: Epoch, end: Epoch },
    #[error("azimuth {value} outside mount limits [{min}, {max}]")]
    Azimuth { value: f64, min: f64, max: f64 },
    #[error("elevation {value} outside mount limits [{min}, {max}]")]
    Elevation { value: f64, min: f64, max: f64 },
    #[error("{0} does not fit in a 4 digit motor field")]
    DigitOverflow(i64),
    #[error("pulse resolution must be non zero")]
    NullPulse,
    #[error("{value} is not a valid {axis} angle")]
    NotFinite { axis: &'static str, value: f64 },
}

/// Serial link failures. The mount should be considered disconnected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommunicationError {
    #[error("timed out waiting for the mount")]
    Timeout,
    #[error("short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },
    #[error("pulse mismatch: horizontal {horizontal} vertical {vertical}")]
    PulseMismatch { horizontal: u8, vertical: u8 },
    #[error("link closed")]
    LinkClosed,
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CommunicationError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("parsing error: {0}")]
    Parse(#[from] ParseError),
    #[error("range error: {0}")]
    Range(#[from] RangeError),
    #[error("communication error: {0}")]
    Communication(#[from] CommunicationError),
    #[error("peak search did not converge within {iterations} iterations")]
    Convergence { iterations: usize },
    #[error("prediction error: {0}")]
    Predict(String),
    #[error("not permitted in {0} mode")]
    WrongMode(TrackingMode),
    #[error("system clock: {0}")]
    Clock(String),
}

impl Error {
    /// True for the errors that leave the mount in unknown state.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Communication(_))
    }
}
