use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{error, info};

use crate::db::Store;
use crate::error::Result;
use crate::types::{now_ms, AccuracyStat, Horizon, HorizonReadiness, ScoredOutcome, Signal};

/// Rebuilds per-(ticker, signal, horizon) accuracy from the outcome table.
/// Reads outcomes, writes accuracy_stats, nothing else.
#[derive(Clone)]
pub struct AccuracyAggregator {
    store: Store,
    min_training_samples: i64,
}

impl AccuracyAggregator {
    pub fn new(store: Store, min_training_samples: i64) -> Self {
        Self {
            store,
            min_training_samples,
        }
    }

    pub fn min_training_samples(&self) -> i64 {
        self.min_training_samples
    }

    /// Recompute on a fixed interval. Independent of the backfill schedule.
    pub async fn run(self, every: Duration) {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            if let Err(e) = self.recompute_stats().await {
                error!("Accuracy recompute error: {e}");
            }
        }
    }

    /// Full rebuild: the previous stat rows are discarded, not patched.
    pub async fn recompute_stats(&self) -> Result<Vec<AccuracyStat>> {
        let outcomes = self.store.scored_outcomes().await?;
        let stats = aggregate(&outcomes, now_ms());
        self.store.replace_accuracy_stats(&stats).await?;

        info!(
            groups = stats.len(),
            outcomes = outcomes.len(),
            "Accuracy stats rebuilt for {} groups from {} outcomes",
            stats.len(),
            outcomes.len(),
        );
        Ok(stats)
    }

    /// True once `horizon` has at least the configured number of outcomes
    /// across every ticker and signal.
    pub async fn is_ready_to_train(&self, horizon: Horizon) -> Result<bool> {
        let count = self.store.outcome_count(horizon).await?;
        Ok(count >= self.min_training_samples)
    }

    pub async fn readiness(&self) -> Result<Vec<HorizonReadiness>> {
        let mut report = Vec::with_capacity(Horizon::ALL.len());
        for horizon in Horizon::ALL {
            let sample_count = self.store.outcome_count(horizon).await?;
            report.push(HorizonReadiness {
                horizon,
                sample_count,
                ready: sample_count >= self.min_training_samples,
            });
        }
        Ok(report)
    }
}

/// Group outcomes by (ticker, signal, horizon) and compute accuracy, mean
/// return and streaks. Streaks follow prediction creation order within a
/// group, since one backfill run stamps all its outcomes with the same time.
pub fn aggregate(outcomes: &[ScoredOutcome], now_ms: i64) -> Vec<AccuracyStat> {
    let mut groups: BTreeMap<(&str, Signal, Horizon), Vec<&ScoredOutcome>> = BTreeMap::new();
    for o in outcomes {
        groups
            .entry((o.ticker.as_str(), o.signal, o.horizon))
            .or_default()
            .push(o);
    }

    groups
        .into_iter()
        .map(|((ticker, signal, horizon), mut rows)| {
            rows.sort_by_key(|o| (o.created_at_ms, o.recorded_at_ms));

            let sample_count = rows.len() as i64;
            let correct_count = rows.iter().filter(|o| o.correct).count() as i64;
            let return_sum: f64 = rows.iter().map(|o| o.return_pct).sum();

            let mut streak = 0i64;
            let mut longest_win = 0i64;
            let mut longest_loss = 0i64;
            for o in &rows {
                if o.correct {
                    streak = if streak >= 0 { streak + 1 } else { 1 };
                    longest_win = longest_win.max(streak);
                } else {
                    streak = if streak <= 0 { streak - 1 } else { -1 };
                    longest_loss = longest_loss.max(-streak);
                }
            }

            AccuracyStat {
                ticker: ticker.to_string(),
                signal,
                horizon,
                accuracy: correct_count as f64 / sample_count as f64,
                sample_count,
                correct_count,
                avg_return_pct: return_sum / sample_count as f64,
                current_streak: streak,
                longest_win_streak: longest_win,
                longest_loss_streak: longest_loss,
                updated_at_ms: now_ms,
            }
        })
        .collect()
}
