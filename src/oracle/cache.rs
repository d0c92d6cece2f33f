use std::collections::HashMap;

/// Ticker prices fetched during one backfill run. Failed fetches are cached
/// too, so a bad ticker is tried at most once per run. Dropped with the run.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: HashMap<String, Option<f64>>,
    hits: u64,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the ticker has not been fetched yet this run;
    /// `Some(None)` when it was fetched and failed.
    pub fn get(&mut self, ticker: &str) -> Option<Option<f64>> {
        let cached = self.prices.get(&normalize(ticker)).copied();
        if cached.is_some() {
            self.hits += 1;
        }
        cached
    }

    pub fn insert(&mut self, ticker: &str, price: Option<f64>) {
        self.prices.insert(normalize(ticker), price);
    }

    /// Distinct tickers fetched.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }
}

fn normalize(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_remembered() {
        let mut cache = PriceCache::new();
        assert_eq!(cache.get("BTC"), None);

        cache.insert("BTC", Some(45_000.0));
        cache.insert("XYZ", None);

        assert_eq!(cache.get("BTC"), Some(Some(45_000.0)));
        assert_eq!(cache.get("XYZ"), Some(None));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 2);
    }

    #[test]
    fn keys_ignore_case() {
        let mut cache = PriceCache::new();
        cache.insert("sol", Some(150.0));

        assert_eq!(cache.get("SOL"), Some(Some(150.0)));
        assert_eq!(cache.get(" Sol "), Some(Some(150.0)));
        assert_eq!(cache.len(), 1);
    }
}
