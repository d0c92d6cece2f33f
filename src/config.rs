use std::time::Duration;

use crate::error::{AppError, Result};

pub const PRICE_API_URL: &str = "https://api.coingecko.com/api/v3";

/// Per-request timeout for the price provider (seconds).
pub const PRICE_TIMEOUT_SECS: u64 = 10;

/// Predictions per backfill batch.
pub const BACKFILL_BATCH_SIZE: usize = 10;

/// Pause after every distinct ticker fetch (milliseconds). The free CoinGecko
/// tier allows roughly 30 calls/minute.
pub const BACKFILL_FETCH_DELAY_MS: u64 = 2_000;

/// Pause between batches (milliseconds). Must stay above the fetch delay.
pub const BACKFILL_BATCH_DELAY_MS: u64 = 5_000;

/// Scheduler interval for the backfill task in `serve` mode (seconds).
pub const BACKFILL_INTERVAL_SECS: u64 = 900;

/// Scheduler interval for the accuracy recompute task in `serve` mode (seconds).
pub const RECOMPUTE_INTERVAL_SECS: u64 = 300;

/// Outcomes required per horizon before the downstream calibration step may train.
pub const MIN_TRAINING_SAMPLES: i64 = 50;

/// Scoring dead zone, in percent.
pub mod scoring_thresholds {
    /// BUY/SELL only count as correct beyond this move.
    pub const WIN_THRESHOLD_PCT: f64 = 0.5;
    /// HOLD counts as correct while the absolute move stays under this.
    pub const HOLD_TOLERANCE_PCT: f64 = 2.0;
}

/// How the backfill derives its missing-work set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStrategy {
    /// Load every prediction and outcome, diff in memory.
    Scan,
    /// Let SQLite compute the set difference.
    Query,
}

impl std::str::FromStr for PlanStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "scan" => Ok(PlanStrategy::Scan),
            "query" => Ok(PlanStrategy::Query),
            other => Err(AppError::Config(format!(
                "BACKFILL_PLANNER must be `scan` or `query`, got `{other}`"
            ))),
        }
    }
}

/// Correctness rule parameters handed to the outcome recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRules {
    pub win_threshold_pct: f64,
    pub hold_tolerance_pct: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            win_threshold_pct: scoring_thresholds::WIN_THRESHOLD_PCT,
            hold_tolerance_pct: scoring_thresholds::HOLD_TOLERANCE_PCT,
        }
    }
}

/// Knobs for a single backfill run.
#[derive(Debug, Clone)]
pub struct BackfillSettings {
    pub batch_size: usize,
    pub fetch_delay: Duration,
    pub batch_delay: Duration,
    pub planner: PlanStrategy,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            batch_size: BACKFILL_BATCH_SIZE,
            fetch_delay: Duration::from_millis(BACKFILL_FETCH_DELAY_MS),
            batch_delay: Duration::from_millis(BACKFILL_BATCH_DELAY_MS),
            planner: PlanStrategy::Scan,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Price provider base URL (PRICE_API_URL)
    pub price_api_url: String,
    /// Sent as `x-cg-pro-api-key` when set (COINGECKO_API_KEY)
    pub price_api_key: Option<String>,
    pub price_timeout: Duration,
    /// JSON object of extra `alias -> canonical id` entries (TICKER_ALIASES_PATH)
    pub ticker_aliases_path: Option<String>,
    pub backfill: BackfillSettings,
    pub scoring: ScoringRules,
    /// Outcomes per horizon before training is allowed (MIN_TRAINING_SAMPLES)
    pub min_training_samples: i64,
    pub backfill_interval: Duration,
    pub recompute_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let fetch_delay_ms = env_parse("BACKFILL_FETCH_DELAY_MS", BACKFILL_FETCH_DELAY_MS);
        let batch_delay_ms = env_parse("BACKFILL_BATCH_DELAY_MS", BACKFILL_BATCH_DELAY_MS);
        if batch_delay_ms < fetch_delay_ms {
            return Err(AppError::Config(
                "BACKFILL_BATCH_DELAY_MS must not be shorter than BACKFILL_FETCH_DELAY_MS".to_string(),
            ));
        }

        let batch_size = env_parse("BACKFILL_BATCH_SIZE", BACKFILL_BATCH_SIZE);
        if batch_size == 0 {
            return Err(AppError::Config("BACKFILL_BATCH_SIZE must be at least 1".to_string()));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "predictions.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            price_api_url: std::env::var("PRICE_API_URL")
                .unwrap_or_else(|_| PRICE_API_URL.to_string()),
            price_api_key: std::env::var("COINGECKO_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            price_timeout: Duration::from_secs(env_parse("PRICE_TIMEOUT_SECS", PRICE_TIMEOUT_SECS)),
            ticker_aliases_path: std::env::var("TICKER_ALIASES_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),
            backfill: BackfillSettings {
                batch_size,
                fetch_delay: Duration::from_millis(fetch_delay_ms),
                batch_delay: Duration::from_millis(batch_delay_ms),
                planner: std::env::var("BACKFILL_PLANNER")
                    .unwrap_or_else(|_| "scan".to_string())
                    .parse()?,
            },
            min_training_samples: env_parse("MIN_TRAINING_SAMPLES", MIN_TRAINING_SAMPLES),
            scoring: ScoringRules {
                win_threshold_pct: env_parse(
                    "WIN_THRESHOLD_PCT",
                    scoring_thresholds::WIN_THRESHOLD_PCT,
                ),
                hold_tolerance_pct: env_parse(
                    "HOLD_TOLERANCE_PCT",
                    scoring_thresholds::HOLD_TOLERANCE_PCT,
                ),
            },
            backfill_interval: Duration::from_secs(env_parse(
                "BACKFILL_INTERVAL_SECS",
                BACKFILL_INTERVAL_SECS,
            )),
            recompute_interval: Duration::from_secs(env_parse(
                "RECOMPUTE_INTERVAL_SECS",
                RECOMPUTE_INTERVAL_SECS,
            )),
        })
    }
}

/// Parse an env var, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
