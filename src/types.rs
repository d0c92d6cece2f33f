use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

/// Price direction a signal calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Signal {
    pub fn direction(self) -> Direction {
        match self {
            Signal::StrongBuy | Signal::Buy => Direction::Up,
            Signal::StrongSell | Signal::Sell => Direction::Down,
            Signal::Hold => Direction::Flat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Signal::StrongBuy => "STRONG_BUY",
            Signal::Buy => "BUY",
            Signal::Hold => "HOLD",
            Signal::Sell => "SELL",
            Signal::StrongSell => "STRONG_SELL",
        }
    }
}

impl std::str::FromStr for Signal {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STRONG_BUY" => Ok(Signal::StrongBuy),
            "BUY" => Ok(Signal::Buy),
            "HOLD" => Ok(Signal::Hold),
            "SELL" => Ok(Signal::Sell),
            "STRONG_SELL" => Ok(Signal::StrongSell),
            other => Err(AppError::InvalidData(format!("unknown signal `{other}`"))),
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Horizon
// ---------------------------------------------------------------------------

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Fixed evaluation checkpoints. Global constants so accuracy stays comparable
/// across every prediction and ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl Horizon {
    /// Shortest first.
    pub const ALL: [Horizon; 4] = [
        Horizon::OneHour,
        Horizon::FourHours,
        Horizon::OneDay,
        Horizon::SevenDays,
    ];

    pub fn duration_ms(self) -> i64 {
        match self {
            Horizon::OneHour => HOUR_MS,
            Horizon::FourHours => 4 * HOUR_MS,
            Horizon::OneDay => 24 * HOUR_MS,
            Horizon::SevenDays => 7 * 24 * HOUR_MS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::OneHour => "1h",
            Horizon::FourHours => "4h",
            Horizon::OneDay => "24h",
            Horizon::SevenDays => "7d",
        }
    }
}

impl std::str::FromStr for Horizon {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Horizon::OneHour),
            "4h" => Ok(Horizon::FourHours),
            "24h" => Ok(Horizon::OneDay),
            "7d" => Ok(Horizon::SevenDays),
            other => Err(AppError::InvalidData(format!("unknown horizon `{other}`"))),
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of one (prediction, horizon) pair. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonState {
    /// Horizon has not elapsed yet.
    Pending,
    /// Elapsed, no outcome stored.
    Eligible,
    /// Outcome stored.
    Resolved,
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Win,
    Loss,
    /// Directional call where the price barely moved.
    Neutral,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Win => "win",
            Verdict::Loss => "loss",
            Verdict::Neutral => "neutral",
        }
    }
}

impl std::str::FromStr for Verdict {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(Verdict::Win),
            "loss" => Ok(Verdict::Loss),
            "neutral" => Ok(Verdict::Neutral),
            other => Err(AppError::InvalidData(format!("unknown verdict `{other}`"))),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A directional call written by the external signal producer. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionEvent {
    pub id: String,
    /// Trading symbol, trimmed and upper-cased on load.
    pub ticker: String,
    pub signal: Signal,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub price_at_prediction: f64,
    /// Unix epoch milliseconds.
    pub created_at_ms: i64,
    pub agent_id: String,
}

/// Realized result of one prediction at one horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutcome {
    pub id: String,
    pub prediction_id: String,
    pub horizon: Horizon,
    pub price_at_check: f64,
    pub price_change: f64,
    pub computed_return_pct: f64,
    pub correct: bool,
    pub verdict: Verdict,
    pub recorded_at_ms: i64,
}

/// An outcome joined to its prediction's ticker and signal; the aggregator's input.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredOutcome {
    pub ticker: String,
    pub signal: Signal,
    pub horizon: Horizon,
    /// Creation time of the prediction; streaks run in this order.
    pub created_at_ms: i64,
    pub correct: bool,
    pub return_pct: f64,
    pub recorded_at_ms: i64,
}

/// Derived accuracy for one (ticker, signal, horizon). Always rebuildable from outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyStat {
    pub ticker: String,
    pub signal: Signal,
    pub horizon: Horizon,
    /// correct_count / sample_count
    pub accuracy: f64,
    pub sample_count: i64,
    pub correct_count: i64,
    pub avg_return_pct: f64,
    /// Positive = consecutive correct, negative = consecutive incorrect.
    pub current_streak: i64,
    pub longest_win_streak: i64,
    pub longest_loss_streak: i64,
    pub updated_at_ms: i64,
}

/// Accuracy over every stored outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub total_outcomes: i64,
    pub correct_outcomes: i64,
    pub win_rate: f64,
    pub avg_return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonReadiness {
    pub horizon: Horizon,
    pub sample_count: i64,
    pub ready: bool,
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
