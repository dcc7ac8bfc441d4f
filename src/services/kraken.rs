//! Kraken API client for fetching last traded prices
//!
//! This module provides a client for the public Kraken Ticker endpoint. Requests
//! are bounded by a per-request timeout, transient failures are retried with
//! exponential backoff, and every failure ends up as a degraded quote.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use super::price_provider::MarketDataProvider;
use super::quote::{Pair, PriceQuote};
use crate::utils::retry::{MAX_ATTEMPTS, with_retry};

/// Default Kraken API base URL
pub const DEFAULT_KRAKEN_API_BASE: &str = "https://api.kraken.com";

/// Default per-request timeout for ticker calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);

/// Static mapping from currency codes to Kraken asset codes
static KRAKEN_ASSET_CODES: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();

/// Get the mapping from currency codes to Kraken asset codes
///
/// Kraken prefixes legacy crypto assets with X and fiat currencies with Z;
/// newer listings such as ADA keep their plain code.
fn get_kraken_asset_map() -> &'static HashMap<&'static str, &'static str> {
    KRAKEN_ASSET_CODES.get_or_init(|| {
        let mut map = HashMap::new();

        // Crypto
        map.insert("BTC", "XXBT");
        map.insert("ETH", "XETH");
        map.insert("LTC", "XLTC");
        map.insert("XRP", "XXRP");
        map.insert("ADA", "ADA");

        // Fiat
        map.insert("CHF", "ZCHF");
        map.insert("USD", "ZUSD");
        map.insert("EUR", "ZEUR");
        map.insert("GBP", "ZGBP");
        map.insert("JPY", "ZJPY");

        map
    })
}

/// Convert a "BASE/QUOTE" pair into the Kraken ticker symbol
///
/// "BTC/USD" -> "XXBTZUSD". Returns `None` when the pair is malformed or
/// either side has no Kraken asset code.
pub fn pair_to_kraken_symbol(pair: &str) -> Option<String> {
    let (base, quote) = pair.split_once('/')?;
    if quote.contains('/') {
        return None;
    }

    let map = get_kraken_asset_map();
    Some(format!("{}{}", map.get(base)?, map.get(quote)?))
}

/// Errors from a single Kraken ticker call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    UnsupportedPair(String),
    Transport(String),
    RemoteStatus { status: u16, body: String },
    Remote(Vec<String>),
    MissingPrice(String),
    InvalidPrice(String),
    Decode(String),
}

impl ProviderError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::RemoteStatus { status, .. } => *status >= 500,
            ProviderError::Remote(messages) => messages.iter().any(|m| m.starts_with("EService:")),
            _ => false,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::UnsupportedPair(pair) => write!(f, "Unsupported pair: {}", pair),
            ProviderError::Transport(msg) => {
                write!(f, "Error contacting external provider: {}", msg)
            }
            ProviderError::RemoteStatus { status, body } => {
                write!(f, "Kraken API error: {} - {}", status, body)
            }
            ProviderError::Remote(messages) => {
                write!(f, "Kraken error: {}", messages.join(", "))
            }
            ProviderError::MissingPrice(symbol) => write!(f, "No price data for {}", symbol),
            ProviderError::InvalidPrice(raw) => write!(f, "Invalid price value: {}", raw),
            ProviderError::Decode(msg) => write!(f, "Malformed Kraken response: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Response from /0/public/Ticker endpoint
#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerEntry>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    /// Last trade closed: [price, lot volume]
    #[serde(default)]
    c: Vec<String>,
}

/// Kraken API client
pub struct KrakenClient {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl KrakenClient {
    /// Creates a new Kraken client with the default API base URL
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, DEFAULT_KRAKEN_API_BASE.to_string())
    }

    /// Creates a new Kraken client with a custom API base URL
    ///
    /// This is useful for testing with a mock server.
    pub fn with_base_url(http_client: Client, base_url: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query_ticker(&self, symbol: &str) -> Result<BigDecimal, ProviderError> {
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, symbol);

        log::debug!("Fetching ticker from Kraken: {}", symbol);

        let response = self
            .http_client
            .get(&url)
            .header("accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::warn!(
                "Kraken API error for {}: {} - {}",
                symbol,
                status,
                error_text
            );
            return Err(ProviderError::RemoteStatus {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let data: TickerResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::Decode(e.to_string())
            } else {
                ProviderError::Transport(e.to_string())
            }
        })?;

        if !data.error.is_empty() {
            return Err(ProviderError::Remote(data.error));
        }

        let raw_price = data
            .result
            .values()
            .find_map(|entry| entry.c.first())
            .ok_or_else(|| ProviderError::MissingPrice(symbol.to_string()))?;

        let price = BigDecimal::from_str(raw_price.trim())
            .map_err(|_| ProviderError::InvalidPrice(raw_price.clone()))?;

        log::debug!("Kraken: {} last trade = {}", symbol, price);

        Ok(price)
    }
}

#[async_trait]
impl MarketDataProvider for KrakenClient {
    fn source_name(&self) -> &'static str {
        "kraken"
    }

    fn translate_pair(&self, pair: &Pair) -> Option<String> {
        pair_to_kraken_symbol(pair.as_str())
    }

    async fn fetch(&self, pair: &Pair) -> PriceQuote {
        let Some(symbol) = self.translate_pair(pair) else {
            let err = ProviderError::UnsupportedPair(pair.to_string());
            log::warn!("Kraken: {}", err);
            return PriceQuote::degraded(pair.clone(), err.to_string());
        };

        let label = format!("kraken ticker {}", symbol);
        let symbol = symbol.as_str();
        let result = with_retry(
            &label,
            MAX_ATTEMPTS,
            move || self.query_ticker(symbol),
            ProviderError::is_retryable,
        )
        .await;

        match result {
            Ok(amount) => PriceQuote::new(pair.clone(), amount, Utc::now()),
            Err(e) => {
                log::warn!("Kraken: failed to fetch {} ({}): {}", pair, symbol, e);
                PriceQuote::degraded(pair.clone(), e.to_string())
            }
        }
    }

    async fn check_connectivity(&self) -> bool {
        let url = format!("{}/0/public/Time", self.base_url);

        match self
            .http_client
            .get(&url)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("Kraken connectivity check failed: {}", e);
                false
            }
        }
    }
}
