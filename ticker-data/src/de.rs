//! Serde helpers for exchange wire formats.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

/// Deserialize a `u64` milliseconds value as `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = u64::deserialize(deserializer)?;
    i64::try_from(epoch_ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid epoch ms: {epoch_ms}")))
}

/// Deserialize a nullable `String` as an exact-precision `Option<Decimal>`.
///
/// Prices are never routed through `f64`.
pub fn de_opt_decimal_str<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| Decimal::from_str(&value).map_err(serde::de::Error::custom))
        .transpose()
}
