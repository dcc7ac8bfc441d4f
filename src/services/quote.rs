//! Price quote model shared by the cache, the providers and the lookup service

use bigdecimal::{BigDecimal, ParseBigDecimalError, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Currency-pair symbol in the caller's syntax (e.g. "BTC/USD")
///
/// Equality is an exact string match. No case or whitespace normalization
/// happens here; trimming is done by the HTTP and config boundaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(String);

impl Pair {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pair {
    fn from(symbol: &str) -> Self {
        Self(symbol.to_string())
    }
}

impl From<String> for Pair {
    fn from(symbol: String) -> Self {
        Self(symbol)
    }
}

/// Last traded price for a pair
///
/// A quote carrying an `error` is a degraded result: the provider could not
/// produce a price and `amount` is zero. Degraded quotes flow through the same
/// paths as real ones so callers can render partial results.
///
/// The `amount` is serialized as a plain decimal string (never exponent
/// notation) so the precision received from the provider survives storage
/// and JSON round-trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub pair: Pair,
    #[serde(with = "crate::utils::serde::plain_decimal")]
    pub amount: BigDecimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PriceQuote {
    pub fn new(pair: Pair, amount: BigDecimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            pair,
            amount,
            error: None,
            timestamp: Some(timestamp),
        }
    }

    /// Builds a quote from the provider's textual price without going through
    /// a binary float
    pub fn from_price_str(
        pair: Pair,
        price: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ParseBigDecimalError> {
        let amount = BigDecimal::from_str(price.trim())?;
        Ok(Self::new(pair, amount, timestamp))
    }

    /// Degraded quote: zero amount, the failure reason, stamped now
    pub fn degraded(pair: Pair, reason: impl Into<String>) -> Self {
        Self {
            pair,
            amount: BigDecimal::zero(),
            error: Some(reason.into()),
            timestamp: Some(Utc::now()),
        }
    }

    /// The failure reason, if this quote is degraded
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|reason| !reason.is_empty())
    }

    pub fn is_degraded(&self) -> bool {
        self.error().is_some()
    }

    /// True for the zero-valued quote (no pair, zero amount, no timestamp).
    ///
    /// A conforming provider always sets the pair, so a real zero-priced
    /// quote is never empty.
    pub fn is_empty(&self) -> bool {
        self.pair.is_empty() && self.amount.is_zero() && self.timestamp.is_none()
    }

    /// Returns the quote with its timestamp set to now when it has none
    pub fn with_default_timestamp(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
        self
    }
}
