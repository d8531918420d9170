//! Repository layer
//!
//! Functions take `&mut SqliteConnection` so the same call works on a pooled
//! connection or inside a transaction (`&mut *tx`). Phone columns are only
//! ever bound from a [`totl_common::phone::PhoneKey`].

pub mod accumulators;
pub mod claims;
pub mod consent;
pub mod facilities;
pub mod geo_cache;
pub mod interactions;
pub mod members;
pub mod plans;
pub mod prices;
pub mod referrals;
pub mod support;

use chrono::{DateTime, NaiveDate, Utc};
use totl_common::{Error, Result};

/// Parse an optional RFC 3339 column
pub(crate) fn opt_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| totl_common::time::parse_timestamp(&s))
        .transpose()
}

/// Parse an optional ISO date column
pub(crate) fn opt_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| Error::Internal(format!("Failed to parse stored date '{}': {}", s, e)))
        })
        .transpose()
}

/// Parse a stored enum column through its `FromStr`
pub(crate) fn parse_column<T>(column: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .parse::<T>()
        .map_err(|e| Error::Internal(format!("Corrupt {} column: {}", column, e)))
}
