//! Market data provider trait for fetching last traded prices
//!
//! This module defines the interface for remote price sources.
//! Implementations fetch a single pair's current price from an exchange API.

use async_trait::async_trait;

use super::quote::{Pair, PriceQuote};

/// Trait for market data providers
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Returns the name of the price source (e.g., "kraken")
    fn source_name(&self) -> &'static str;

    /// Translates a pair in the caller's syntax into the provider's native symbol
    ///
    /// Returns `None` when the provider does not support the pair.
    fn translate_pair(&self, pair: &Pair) -> Option<String>;

    /// Fetches the last traded price for a pair
    ///
    /// Never fails: on any error (unsupported pair, network failure, malformed
    /// response, unparsable price) the returned quote has `error` set, a zero
    /// amount, the requested pair and the current time as timestamp.
    async fn fetch(&self, pair: &Pair) -> PriceQuote;

    /// Best-effort reachability check of the remote API
    async fn check_connectivity(&self) -> bool;
}
