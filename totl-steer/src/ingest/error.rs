//! Per-record ingestion errors

use thiserror::Error;

/// Why a single feed record was rejected
///
/// Never aborts a batch: each one becomes a line in the report.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a valid YYYY-MM-DD date: '{value}'")]
    InvalidDate { field: &'static str, value: String },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field '{field}' has invalid value '{value}': {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("member '{0}' not found")]
    MemberNotFound(String),

    #[error("plan {0} not found")]
    PlanNotFound(i64),

    #[error("storage error: {0}")]
    Storage(#[from] totl_common::Error),
}
