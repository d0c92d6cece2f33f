//! Database row types matching `migrations/0001_init.sql`, plus their
//! conversions into domain types. Enum columns are stored as text.

use crate::error::AppError;
use crate::types::{AccuracyStat, PredictionEvent, PredictionOutcome, ScoredOutcome};

#[derive(Debug, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: String,
    pub ticker: String,
    pub signal: String,
    pub confidence: f64,
    pub price_at_prediction: f64,
    pub created_at: i64,
    pub agent_id: String,
}

impl TryFrom<PredictionRow> for PredictionEvent {
    type Error = AppError;

    fn try_from(r: PredictionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            signal: r.signal.parse()?,
            id: r.id,
            ticker: r.ticker.trim().to_uppercase(),
            confidence: r.confidence,
            price_at_prediction: r.price_at_prediction,
            created_at_ms: r.created_at,
            agent_id: r.agent_id,
        })
    }
}

/// A prediction joined with one horizon it still lacks an outcome for.
#[derive(Debug, sqlx::FromRow)]
pub struct PendingRow {
    #[sqlx(flatten)]
    pub prediction: PredictionRow,
    pub horizon: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OutcomeRow {
    pub id: String,
    pub prediction_id: String,
    pub horizon: String,
    pub price_at_check: f64,
    pub price_change: f64,
    pub computed_return_pct: f64,
    pub correct: bool,
    pub verdict: String,
    pub recorded_at: i64,
}

impl TryFrom<OutcomeRow> for PredictionOutcome {
    type Error = AppError;

    fn try_from(r: OutcomeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            horizon: r.horizon.parse()?,
            verdict: r.verdict.parse()?,
            id: r.id,
            prediction_id: r.prediction_id,
            price_at_check: r.price_at_check,
            price_change: r.price_change,
            computed_return_pct: r.computed_return_pct,
            correct: r.correct,
            recorded_at_ms: r.recorded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoredOutcomeRow {
    pub ticker: String,
    pub signal: String,
    pub created_at: i64,
    pub horizon: String,
    pub correct: bool,
    pub computed_return_pct: f64,
    pub recorded_at: i64,
}

impl TryFrom<ScoredOutcomeRow> for ScoredOutcome {
    type Error = AppError;

    fn try_from(r: ScoredOutcomeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            signal: r.signal.parse()?,
            horizon: r.horizon.parse()?,
            ticker: r.ticker,
            created_at_ms: r.created_at,
            correct: r.correct,
            return_pct: r.computed_return_pct,
            recorded_at_ms: r.recorded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct AccuracyStatRow {
    pub ticker: String,
    pub signal_type: String,
    pub horizon: String,
    pub accuracy: f64,
    pub sample_count: i64,
    pub correct_count: i64,
    pub avg_return_pct: f64,
    pub current_streak: i64,
    pub longest_win_streak: i64,
    pub longest_loss_streak: i64,
    pub updated_at: i64,
}

impl TryFrom<AccuracyStatRow> for AccuracyStat {
    type Error = AppError;

    fn try_from(r: AccuracyStatRow) -> Result<Self, Self::Error> {
        Ok(Self {
            signal: r.signal_type.parse()?,
            horizon: r.horizon.parse()?,
            ticker: r.ticker,
            accuracy: r.accuracy,
            sample_count: r.sample_count,
            correct_count: r.correct_count,
            avg_return_pct: r.avg_return_pct,
            current_streak: r.current_streak,
            longest_win_streak: r.longest_win_streak,
            longest_loss_streak: r.longest_loss_streak,
            updated_at_ms: r.updated_at,
        })
    }
}
