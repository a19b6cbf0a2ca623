//! Error taxonomy shared by the library and the chart binary.
//!
//! Every variant is terminal for the current run; nothing in the pipeline
//! retries.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunboxError {
    /// Data source unreachable, or credentials missing/invalid/expired.
    #[error("connection error: {0}")]
    Connection(String),
    /// A raw activity record failed schema validation.
    #[error("invalid activity record: {0}")]
    Validation(String),
    /// `to` precedes `from`, or a date cannot be represented.
    #[error("invalid date range: {from} .. {to}")]
    InvalidRange { from: String, to: String },
    /// A distance fell outside every configured bin, or the bins are malformed.
    #[error("binning error: {0}")]
    Binning(String),
}

impl RunboxError {
    pub fn invalid_range(from: NaiveDate, to: NaiveDate) -> Self {
        RunboxError::InvalidRange {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunboxError>;
