pub mod commissions;
pub mod deliveries;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod reconciliation;
pub mod wallets;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path or body identifier, naming the field on failure.
pub(crate) fn parse_id<T>(field: &str, raw: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {field}: {e}")))
}
