use serde::{Deserialize, Deserializer};
use std::collections::HashSet;

use crate::services::quote::Pair;

/// Splits a comma-separated pair list
///
/// Items are trimmed, empty items are dropped and duplicates are removed
/// keeping the first occurrence.
pub fn split_pairs(raw: &str) -> Vec<Pair> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(*item))
        .map(Pair::from)
        .collect()
}

/// Deserializer for comma-separated pair lists
/// Accepts either a comma-separated string or None
///
/// # Example
/// ```
/// use serde::Deserialize;
/// use ltp_be::services::quote::Pair;
///
/// #[derive(Deserialize)]
/// struct MyQuery {
///     #[serde(default, deserialize_with = "ltp_be::utils::serde::comma_separated_pairs")]
///     pub pairs: Option<Vec<Pair>>,
/// }
/// ```
pub fn comma_separated_pairs<'de, D>(deserializer: D) -> Result<Option<Vec<Pair>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| split_pairs(&s)))
}

/// Serde adapter for `BigDecimal` amounts as plain decimal strings
///
/// Serializes without exponent notation and keeps the scale as parsed, so
/// "50000.00" stays "50000.00".
pub mod plain_decimal {
    use bigdecimal::BigDecimal;
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::str::FromStr;

    pub fn serialize<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_plain_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BigDecimal::from_str(raw.trim())
            .map_err(|e| de::Error::custom(format!("invalid decimal amount '{}': {}", raw, e)))
    }
}
