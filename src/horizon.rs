use std::collections::{HashMap, HashSet};

use crate::types::{Horizon, HorizonState, PredictionEvent, PredictionOutcome};

/// Horizons that have elapsed for a prediction created at `created_at_ms`
/// and have no recorded outcome yet. Pure; shortest horizon first.
pub fn eligible_horizons(
    created_at_ms: i64,
    now_ms: i64,
    recorded: &HashSet<Horizon>,
) -> Vec<Horizon> {
    Horizon::ALL
        .into_iter()
        .filter(|h| created_at_ms.saturating_add(h.duration_ms()) <= now_ms)
        .filter(|h| !recorded.contains(h))
        .collect()
}

pub fn horizon_state(created_at_ms: i64, now_ms: i64, horizon: Horizon, recorded: bool) -> HorizonState {
    if recorded {
        HorizonState::Resolved
    } else if created_at_ms.saturating_add(horizon.duration_ms()) <= now_ms {
        HorizonState::Eligible
    } else {
        HorizonState::Pending
    }
}

/// One prediction plus the horizons the backfill still owes it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWork {
    pub prediction: PredictionEvent,
    pub missing: Vec<Horizon>,
}

/// In-memory planner: diff every prediction against the recorded outcomes.
/// Predictions with nothing to do are dropped. Input order is preserved.
pub fn plan_missing(
    predictions: Vec<PredictionEvent>,
    outcomes: &[PredictionOutcome],
    now_ms: i64,
) -> Vec<PendingWork> {
    let mut recorded: HashMap<&str, HashSet<Horizon>> = HashMap::new();
    for o in outcomes {
        recorded
            .entry(o.prediction_id.as_str())
            .or_default()
            .insert(o.horizon);
    }

    let empty = HashSet::new();
    predictions
        .into_iter()
        .filter_map(|prediction| {
            let done = recorded.get(prediction.id.as_str()).unwrap_or(&empty);
            let missing = eligible_horizons(prediction.created_at_ms, now_ms, done);
            (!missing.is_empty()).then_some(PendingWork { prediction, missing })
        })
        .collect()
}

/// Fold `(prediction, horizon)` rows, already sorted by prediction, into
/// per-prediction work items.
pub fn group_pending(rows: Vec<(PredictionEvent, Horizon)>) -> Vec<PendingWork> {
    let mut work: Vec<PendingWork> = Vec::new();
    for (prediction, horizon) in rows {
        match work.last_mut() {
            Some(last) if last.prediction.id == prediction.id => last.missing.push(horizon),
            _ => work.push(PendingWork {
                prediction,
                missing: vec![horizon],
            }),
        }
    }
    work
}

/// Per-horizon count of missing outcomes across a plan.
pub fn missing_by_horizon(work: &[PendingWork]) -> Vec<(Horizon, usize)> {
    Horizon::ALL
        .into_iter()
        .map(|h| {
            let n = work.iter().filter(|w| w.missing.contains(&h)).count();
            (h, n)
        })
        .collect()
}
