use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ScoringRules;
use crate::db::Store;
use crate::types::{Direction, Horizon, PredictionEvent, PredictionOutcome, Signal, Verdict};

/// Result of one record attempt. Duplicates count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Inserted,
    /// Another run already stored this (prediction, horizon).
    AlreadyRecorded,
    Failed,
}

/// Realized move of a prediction and its verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub price_change: f64,
    pub return_pct: f64,
    pub correct: bool,
    pub verdict: Verdict,
}

/// Score a signal against the observed price.
///
/// Directional signals need the move to clear `win_threshold_pct` in their
/// direction; a smaller move is `Neutral` and a move of exactly the
/// threshold is a `Loss`. Neither is correct.
/// HOLD is correct while the absolute move stays under `hold_tolerance_pct`.
/// Returns `None` when no return can be computed (non-positive entry price).
pub fn score(
    signal: Signal,
    price_at_prediction: f64,
    price_at_check: f64,
    rules: &ScoringRules,
) -> Option<Score> {
    if !(price_at_prediction.is_finite() && price_at_prediction > 0.0 && price_at_check.is_finite()) {
        return None;
    }

    let price_change = price_at_check - price_at_prediction;
    let return_pct = price_change / price_at_prediction * 100.0;

    let (correct, verdict) = match signal.direction() {
        Direction::Flat => {
            let correct = return_pct.abs() < rules.hold_tolerance_pct;
            (correct, if correct { Verdict::Win } else { Verdict::Loss })
        }
        _ if return_pct.abs() < rules.win_threshold_pct => (false, Verdict::Neutral),
        Direction::Up => win_or_loss(return_pct > rules.win_threshold_pct),
        Direction::Down => win_or_loss(return_pct < -rules.win_threshold_pct),
    };

    Some(Score {
        price_change,
        return_pct,
        correct,
        verdict,
    })
}

fn win_or_loss(correct: bool) -> (bool, Verdict) {
    if correct {
        (true, Verdict::Win)
    } else {
        (false, Verdict::Loss)
    }
}

/// Computes and persists outcomes, at most one per (prediction, horizon).
#[derive(Clone)]
pub struct OutcomeRecorder {
    store: Store,
    rules: ScoringRules,
}

impl OutcomeRecorder {
    pub fn new(store: Store, rules: ScoringRules) -> Self {
        Self { store, rules }
    }

    /// Record `prediction` at `horizon` using the price observed at `now_ms`.
    /// Idempotent: a second call for the same pair is `AlreadyRecorded`.
    pub async fn record_outcome(
        &self,
        prediction: &PredictionEvent,
        horizon: Horizon,
        price_at_check: f64,
        now_ms: i64,
    ) -> RecordStatus {
        if prediction.created_at_ms.saturating_add(horizon.duration_ms()) > now_ms {
            warn!(
                prediction_id = %prediction.id,
                horizon = %horizon,
                "Refusing to record outcome before horizon has elapsed"
            );
            return RecordStatus::Failed;
        }

        let Some(s) = score(prediction.signal, prediction.price_at_prediction, price_at_check, &self.rules) else {
            error!(
                prediction_id = %prediction.id,
                horizon = %horizon,
                price_at_prediction = prediction.price_at_prediction,
                price_at_check,
                "Cannot compute return for prediction"
            );
            return RecordStatus::Failed;
        };

        let outcome = PredictionOutcome {
            id: Uuid::new_v4().to_string(),
            prediction_id: prediction.id.clone(),
            horizon,
            price_at_check,
            price_change: s.price_change,
            computed_return_pct: s.return_pct,
            correct: s.correct,
            verdict: s.verdict,
            recorded_at_ms: now_ms,
        };

        match self.store.insert_outcome(&outcome).await {
            Ok(true) => {
                info!(
                    prediction_id = %prediction.id,
                    ticker = %prediction.ticker,
                    horizon = %horizon,
                    verdict = %s.verdict,
                    "Outcome recorded: {} {} @ {horizon}: {:+.2}%",
                    prediction.signal,
                    prediction.ticker,
                    s.return_pct,
                );
                RecordStatus::Inserted
            }
            Ok(false) => {
                debug!(
                    prediction_id = %prediction.id,
                    horizon = %horizon,
                    "Outcome already recorded, skipping"
                );
                RecordStatus::AlreadyRecorded
            }
            Err(e) => {
                error!(
                    prediction_id = %prediction.id,
                    horizon = %horizon,
                    "Failed to persist outcome: {e}"
                );
                RecordStatus::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    fn rules() -> ScoringRules {
        ScoringRules::default()
    }

    fn prediction(id: &str, signal: Signal, price: f64) -> PredictionEvent {
        PredictionEvent {
            id: id.to_string(),
            ticker: "BTC".to_string(),
            signal,
            confidence: 0.8,
            price_at_prediction: price,
            created_at_ms: 0,
            agent_id: "agent".to_string(),
        }
    }

    #[test]
    fn buy_scored_by_direction() {
        let up = score(Signal::Buy, 100.0, 110.0, &rules()).unwrap();
        assert!(up.correct);
        assert!((up.return_pct - 10.0).abs() < 1e-9);
        assert_eq!(up.verdict, Verdict::Win);

        let down = score(Signal::Buy, 100.0, 90.0, &rules()).unwrap();
        assert!(!down.correct);
        assert!((down.return_pct + 10.0).abs() < 1e-9);
        assert!((down.price_change + 10.0).abs() < 1e-9);
        assert_eq!(down.verdict, Verdict::Loss);
    }

    #[test]
    fn sell_signals_win_on_drops() {
        assert!(score(Signal::StrongSell, 100.0, 95.0, &rules()).unwrap().correct);
        assert!(!score(Signal::Sell, 100.0, 105.0, &rules()).unwrap().correct);
    }

    #[test]
    fn flat_move_is_neutral_for_directional_signals() {
        let s = score(Signal::StrongBuy, 100.0, 100.3, &rules()).unwrap();
        assert!(!s.correct);
        assert_eq!(s.verdict, Verdict::Neutral);

        let s = score(Signal::Sell, 100.0, 99.7, &rules()).unwrap();
        assert_eq!(s.verdict, Verdict::Neutral);
    }

    #[test]
    fn move_of_exactly_the_threshold_is_a_loss() {
        let wide = ScoringRules {
            win_threshold_pct: 25.0,
            hold_tolerance_pct: 2.0,
        };
        let up = score(Signal::Buy, 100.0, 125.0, &wide).unwrap();
        assert_eq!(up.return_pct, 25.0);
        assert!(!up.correct);
        assert_eq!(up.verdict, Verdict::Loss);

        let down = score(Signal::Sell, 100.0, 75.0, &wide).unwrap();
        assert!(!down.correct);
        assert_eq!(down.verdict, Verdict::Loss);

        let clear = score(Signal::Buy, 100.0, 130.0, &wide).unwrap();
        assert!(clear.correct);
        assert_eq!(clear.verdict, Verdict::Win);
    }

    #[test]
    fn hold_uses_tolerance_band() {
        assert!(score(Signal::Hold, 100.0, 101.5, &rules()).unwrap().correct);
        assert!(score(Signal::Hold, 100.0, 98.1, &rules()).unwrap().correct);
        let miss = score(Signal::Hold, 100.0, 103.0, &rules()).unwrap();
        assert!(!miss.correct);
        assert_eq!(miss.verdict, Verdict::Loss);
    }

    #[test]
    fn thresholds_come_from_rules() {
        let strict = ScoringRules {
            win_threshold_pct: 5.0,
            hold_tolerance_pct: 0.1,
        };
        assert_eq!(score(Signal::Buy, 100.0, 104.0, &strict).unwrap().verdict, Verdict::Neutral);
        assert!(!score(Signal::Hold, 100.0, 100.5, &strict).unwrap().correct);
    }

    #[test]
    fn non_positive_entry_price_cannot_be_scored() {
        assert!(score(Signal::Buy, 0.0, 10.0, &rules()).is_none());
        assert!(score(Signal::Buy, -1.0, 10.0, &rules()).is_none());
        assert!(score(Signal::Buy, 1.0, f64::NAN, &rules()).is_none());
    }

    #[tokio::test]
    async fn second_record_is_a_successful_noop() {
        let store = Store::in_memory().await.unwrap();
        let p = prediction("p1", Signal::Buy, 100.0);
        store.insert_prediction(&p).await.unwrap();
        let recorder = OutcomeRecorder::new(store.clone(), rules());

        let first = recorder.record_outcome(&p, Horizon::OneHour, 110.0, HOUR).await;
        let second = recorder.record_outcome(&p, Horizon::OneHour, 120.0, 2 * HOUR).await;
        assert_eq!(first, RecordStatus::Inserted);
        assert_eq!(second, RecordStatus::AlreadyRecorded);

        let rows = store.outcomes_for("p1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].price_at_check - 110.0).abs() < 1e-9);
        assert!(rows[0].correct);
        assert_eq!(rows[0].recorded_at_ms, HOUR);
    }

    #[tokio::test]
    async fn refuses_before_horizon_elapses() {
        let store = Store::in_memory().await.unwrap();
        let p = prediction("p1", Signal::Buy, 100.0);
        store.insert_prediction(&p).await.unwrap();
        let recorder = OutcomeRecorder::new(store.clone(), rules());

        let status = recorder.record_outcome(&p, Horizon::OneDay, 110.0, 24 * HOUR - 1).await;
        assert_eq!(status, RecordStatus::Failed);
        assert!(store.outcomes_for("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn far_future_prediction_is_never_recorded() {
        let store = Store::in_memory().await.unwrap();
        let mut p = prediction("future", Signal::Buy, 100.0);
        p.created_at_ms = i64::MAX - 10;
        store.insert_prediction(&p).await.unwrap();
        let recorder = OutcomeRecorder::new(store.clone(), rules());

        let status = recorder.record_outcome(&p, Horizon::SevenDays, 110.0, 1_800_000_000_000).await;
        assert_eq!(status, RecordStatus::Failed);
        assert!(store.outcomes_for("future").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_reported() {
        let store = Store::in_memory().await.unwrap();
        // Never inserted: the foreign key rejects the outcome row.
        let orphan = prediction("missing", Signal::Buy, 100.0);
        let recorder = OutcomeRecorder::new(store, rules());

        let status = recorder.record_outcome(&orphan, Horizon::OneHour, 110.0, HOUR).await;
        assert_eq!(status, RecordStatus::Failed);
    }

    #[tokio::test]
    async fn concurrent_records_store_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let store = Store::open(path.to_str().unwrap()).await.unwrap();
        let p = prediction("p1", Signal::Sell, 100.0);
        store.insert_prediction(&p).await.unwrap();

        let a = OutcomeRecorder::new(store.clone(), rules());
        let b = OutcomeRecorder::new(store.clone(), rules());
        let (ra, rb) = tokio::join!(
            a.record_outcome(&p, Horizon::FourHours, 90.0, 5 * HOUR),
            b.record_outcome(&p, Horizon::FourHours, 91.0, 5 * HOUR),
        );

        let mut statuses = [ra, rb];
        statuses.sort_by_key(|s| *s != RecordStatus::Inserted);
        assert_eq!(statuses, [RecordStatus::Inserted, RecordStatus::AlreadyRecorded]);
        assert_eq!(store.outcomes_for("p1").await.unwrap().len(), 1);
    }
}
