//! Services module for the price source, the lookup service and background refresh

pub mod kraken;
pub mod price_lookup;
pub mod price_provider;
pub mod price_sync;
pub mod quote;

pub use kraken::KrakenClient;
pub use price_lookup::LtpService;
pub use price_provider::MarketDataProvider;
pub use price_sync::PriceRefresher;
pub use quote::{Pair, PriceQuote};
