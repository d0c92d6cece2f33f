use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::oracle::{AliasTable, LatencyStats, PriceOracle, TickerResolver};

/// CoinGecko `/simple/price` client. One bounded-timeout request per call.
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    resolver: Box<dyn TickerResolver>,
    latency: Arc<LatencyStats>,
}

impl CoinGeckoClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        resolver: Box<dyn TickerResolver>,
        latency: Arc<LatencyStats>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            resolver,
            latency,
        })
    }

    pub fn from_config(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        let table = AliasTable::load(cfg.ticker_aliases_path.as_deref())?;
        debug!("Ticker resolver has {} aliases", table.len());
        Self::new(
            cfg.price_api_url.clone(),
            cfg.price_api_key.clone(),
            cfg.price_timeout,
            Box::new(table),
            latency,
        )
    }

    async fn request(&self, canonical_id: &str) -> std::result::Result<serde_json::Value, reqwest::Error> {
        let mut req = self
            .http
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", canonical_id), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-pro-api-key", key);
        }
        req.send().await?.error_for_status()?.json().await
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoClient {
    fn resolve(&self, ticker: &str) -> String {
        self.resolver.resolve(ticker)
    }

    async fn fetch_price(&self, canonical_id: &str) -> Option<f64> {
        let started = Instant::now();
        let result = self.request(canonical_id).await;
        self.latency.record(started.elapsed());

        match result {
            Ok(body) => {
                let price = parse_usd_price(&body, canonical_id);
                if price.is_none() {
                    warn!(canonical_id, "[oracle] no usable USD price in response: {body}");
                }
                price
            }
            Err(e) => {
                warn!(canonical_id, "[oracle] price fetch failed: {e}");
                None
            }
        }
    }
}

/// Extract `body[id].usd`. Zero, negative and non-finite prices are unusable.
pub fn parse_usd_price(body: &serde_json::Value, canonical_id: &str) -> Option<f64> {
    body.get(canonical_id)
        .and_then(|entry| entry.get("usd"))
        .and_then(|p| p.as_f64())
        .filter(|p| p.is_finite() && *p > 0.0)
}
