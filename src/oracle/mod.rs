//! Price oracle: ticker resolution and spot price lookup against the
//! external market-data provider.

mod cache;
mod coingecko;
mod latency;
mod resolver;

pub use cache::PriceCache;
pub use coingecko::CoinGeckoClient;
pub use latency::LatencyStats;
pub use resolver::{AliasTable, TickerResolver};

use async_trait::async_trait;

/// Source of current USD spot prices.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Provider id for a trading symbol. Never fails.
    fn resolve(&self, ticker: &str) -> String;

    /// Current USD price, or `None` on any failure (network, timeout,
    /// provider error, malformed body, unknown id). Must return within the
    /// client's timeout.
    async fn fetch_price(&self, canonical_id: &str) -> Option<f64>;
}
