use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, sleep};
use tracing::{error, info, warn};

use crate::accuracy::AccuracyAggregator;
use crate::api::health::HealthState;
use crate::config::{BackfillSettings, PlanStrategy};
use crate::db::Store;
use crate::error::Result;
use crate::horizon::{group_pending, missing_by_horizon, plan_missing, PendingWork};
use crate::oracle::{PriceCache, PriceOracle};
use crate::recorder::{OutcomeRecorder, RecordStatus};
use crate::types::now_ms;

/// Counters for one backfill run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    /// Predictions that had at least one eligible, unrecorded horizon.
    pub predictions_pending: usize,
    /// Predictions whose outcomes were attempted (a price was available).
    pub predictions_processed: usize,
    /// Predictions skipped because their ticker had no price this run.
    pub predictions_skipped: usize,
    pub outcomes_recorded: usize,
    /// Rows another run wrote first.
    pub outcomes_already_present: usize,
    /// Skipped horizons plus failed writes.
    pub errors: usize,
    pub price_fetches: usize,
    pub batches: usize,
}

/// Fills in missing outcomes for every prediction whose horizons have
/// elapsed. Sequential by design: batches, predictions within a batch, and
/// horizons within a prediction all run one after another so the price
/// provider's rate limit is never exceeded.
///
/// No cursor is kept. Each run recomputes the missing set from storage, so
/// re-running after a crash or a partial run picks up where it stopped.
pub struct Backfill {
    store: Store,
    oracle: Arc<dyn PriceOracle>,
    recorder: OutcomeRecorder,
    settings: BackfillSettings,
    health: Arc<HealthState>,
}

impl Backfill {
    pub fn new(
        store: Store,
        oracle: Arc<dyn PriceOracle>,
        recorder: OutcomeRecorder,
        settings: BackfillSettings,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            store,
            oracle,
            recorder,
            settings,
            health,
        }
    }

    pub async fn run(&self) -> Result<BackfillStats> {
        self.run_at(now_ms()).await
    }

    /// One full pass with `now_ms` as the horizon cutoff.
    pub async fn run_at(&self, now_ms: i64) -> Result<BackfillStats> {
        self.health.run_started();
        match self.process(now_ms).await {
            Ok(stats) => {
                self.health
                    .run_finished(now_ms, stats.outcomes_recorded as u64, stats.errors as u64);
                Ok(stats)
            }
            Err(e) => {
                self.health.run_failed();
                Err(e)
            }
        }
    }

    async fn plan(&self, now_ms: i64) -> Result<Vec<PendingWork>> {
        match self.settings.planner {
            PlanStrategy::Scan => {
                let predictions = self.store.load_predictions().await?;
                let outcomes = self.store.load_outcomes().await?;
                info!(
                    "[backfill] loaded {} predictions and {} outcomes",
                    predictions.len(),
                    outcomes.len()
                );
                Ok(plan_missing(predictions, &outcomes, now_ms))
            }
            PlanStrategy::Query => Ok(group_pending(self.store.pending_work(now_ms).await?)),
        }
    }

    async fn process(&self, now_ms: i64) -> Result<BackfillStats> {
        let work = self.plan(now_ms).await?;
        let mut stats = BackfillStats {
            predictions_pending: work.len(),
            ..Default::default()
        };

        if work.is_empty() {
            info!("[backfill] no missing outcomes");
            return Ok(stats);
        }

        info!("[backfill] {} predictions with missing outcomes", work.len());
        for (horizon, count) in missing_by_horizon(&work) {
            info!(horizon = %horizon, missing = count, "[backfill]   {horizon}: {count}");
        }

        let mut cache = PriceCache::new();
        let batch_size = self.settings.batch_size.max(1);
        let total_batches = work.len().div_ceil(batch_size);

        for (i, batch) in work.chunks(batch_size).enumerate() {
            info!(
                "[backfill] batch {}/{} ({} predictions)",
                i + 1,
                total_batches,
                batch.len()
            );

            for item in batch {
                self.process_prediction(item, now_ms, &mut cache, &mut stats).await;
            }
            stats.batches += 1;

            info!(
                processed = stats.predictions_processed,
                recorded = stats.outcomes_recorded,
                errors = stats.errors,
                "[backfill] progress: {}/{} predictions, {} outcomes recorded, {} errors",
                stats.predictions_processed + stats.predictions_skipped,
                stats.predictions_pending,
                stats.outcomes_recorded,
                stats.errors,
            );

            if i + 1 < total_batches {
                sleep(self.settings.batch_delay).await;
            }
        }

        info!(
            processed = stats.predictions_processed,
            skipped = stats.predictions_skipped,
            recorded = stats.outcomes_recorded,
            already_present = stats.outcomes_already_present,
            errors = stats.errors,
            price_fetches = stats.price_fetches,
            cached_tickers = cache.len(),
            cache_hits = cache.hits(),
            "[backfill] complete"
        );
        Ok(stats)
    }

    async fn process_prediction(
        &self,
        item: &PendingWork,
        now_ms: i64,
        cache: &mut PriceCache,
        stats: &mut BackfillStats,
    ) {
        let prediction = &item.prediction;
        let Some(price) = self.price_for(&prediction.ticker, cache, stats).await else {
            warn!(
                ticker = %prediction.ticker,
                prediction_id = %prediction.id,
                missing = item.missing.len(),
                "[backfill] skipping {} - no price this run",
                prediction.ticker,
            );
            stats.predictions_skipped += 1;
            stats.errors += item.missing.len();
            return;
        };

        for &horizon in &item.missing {
            match self.recorder.record_outcome(prediction, horizon, price, now_ms).await {
                RecordStatus::Inserted => stats.outcomes_recorded += 1,
                RecordStatus::AlreadyRecorded => stats.outcomes_already_present += 1,
                RecordStatus::Failed => stats.errors += 1,
            }
        }
        stats.predictions_processed += 1;
    }

    /// Cached per run. Every distinct ticker is fetched once, followed by the
    /// fetch delay.
    async fn price_for(
        &self,
        ticker: &str,
        cache: &mut PriceCache,
        stats: &mut BackfillStats,
    ) -> Option<f64> {
        if let Some(cached) = cache.get(ticker) {
            return cached;
        }

        let canonical_id = self.oracle.resolve(ticker);
        let price = self.oracle.fetch_price(&canonical_id).await;
        stats.price_fetches += 1;
        cache.insert(ticker, price);
        sleep(self.settings.fetch_delay).await;
        price
    }
}

/// One backfill run followed by an accuracy rebuild and a readiness report.
pub async fn backfill_and_recompute(
    backfill: &Backfill,
    aggregator: &AccuracyAggregator,
) -> Result<BackfillStats> {
    let stats = backfill.run().await?;
    aggregator.recompute_stats().await?;
    for r in aggregator.readiness().await? {
        info!(
            horizon = %r.horizon,
            samples = r.sample_count,
            ready = r.ready,
            "[backfill] {} ready to train: {} ({} samples)",
            r.horizon,
            r.ready,
            r.sample_count,
        );
    }
    Ok(stats)
}

/// Scheduler loop for `serve` mode.
pub async fn run_scheduled(backfill: Backfill, aggregator: AccuracyAggregator, every: Duration) {
    let mut ticker = interval(every);

    loop {
        ticker.tick().await;
        if let Err(e) = backfill_and_recompute(&backfill, &aggregator).await {
            error!("Backfill run failed: {e}");
        }
    }
}
