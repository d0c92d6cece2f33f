use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{
    AccuracyStatRow, OutcomeRow, PendingRow, PredictionRow, ScoredOutcomeRow,
};
use crate::error::Result;
use crate::types::{
    AccuracyStat, AccuracySummary, Horizon, PredictionEvent, PredictionOutcome, ScoredOutcome,
};

const PREDICTION_COLUMNS: &str =
    "id, ticker, signal, confidence, price_at_prediction, created_at, agent_id";

const OUTCOME_COLUMNS: &str = "id, prediction_id, horizon, price_at_check, price_change, \
     computed_return_pct, correct, verdict, recorded_at";

/// Optional equality filters for accuracy queries.
#[derive(Debug, Default, Clone)]
pub struct StatsFilter {
    pub ticker: Option<String>,
    pub signal: Option<String>,
    pub horizon: Option<String>,
}

/// SQLite-backed access to predictions, outcomes and accuracy stats.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database file and apply migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` is a separate database, so the pool must never recycle.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn insert_prediction(&self, p: &PredictionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions (id, ticker, signal, confidence, price_at_prediction, created_at, agent_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&p.id)
        .bind(&p.ticker)
        .bind(p.signal.as_str())
        .bind(p.confidence)
        .bind(p.price_at_prediction)
        .bind(p.created_at_ms)
        .bind(&p.agent_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Predictions
    // -----------------------------------------------------------------------

    /// Every prediction, oldest first.
    pub async fn load_predictions(&self) -> Result<Vec<PredictionEvent>> {
        let sql = format!("SELECT {PREDICTION_COLUMNS} FROM predictions ORDER BY created_at ASC, id ASC");
        let rows: Vec<PredictionRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(PredictionEvent::try_from).collect()
    }

    pub async fn get_prediction(&self, id: &str) -> Result<Option<PredictionEvent>> {
        let sql = format!("SELECT {PREDICTION_COLUMNS} FROM predictions WHERE id = ?");
        let row: Option<PredictionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(PredictionEvent::try_from).transpose()
    }

    /// Set difference computed by SQLite: every (prediction, horizon) whose
    /// horizon has elapsed at `now_ms` and that has no outcome row. Sorted by
    /// prediction age, then horizon length.
    pub async fn pending_work(&self, now_ms: i64) -> Result<Vec<(PredictionEvent, Horizon)>> {
        let mut query = sqlx::query_as::<_, PendingRow>(
            r#"
            WITH horizons(horizon, duration_ms) AS (
                VALUES (?, ?), (?, ?), (?, ?), (?, ?)
            )
            SELECT p.id, p.ticker, p.signal, p.confidence, p.price_at_prediction,
                   p.created_at, p.agent_id, h.horizon
            FROM predictions p
            CROSS JOIN horizons h
            WHERE p.created_at + h.duration_ms <= ?
              AND NOT EXISTS (
                  SELECT 1 FROM outcomes o
                  WHERE o.prediction_id = p.id AND o.horizon = h.horizon
              )
            ORDER BY p.created_at ASC, p.id ASC, h.duration_ms ASC
            "#,
        );
        for h in Horizon::ALL {
            query = query.bind(h.as_str()).bind(h.duration_ms());
        }
        let rows = query.bind(now_ms).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|r| -> Result<(PredictionEvent, Horizon)> {
                let horizon: Horizon = r.horizon.parse()?;
                Ok((PredictionEvent::try_from(r.prediction)?, horizon))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    pub async fn load_outcomes(&self) -> Result<Vec<PredictionOutcome>> {
        let sql = format!("SELECT {OUTCOME_COLUMNS} FROM outcomes");
        let rows: Vec<OutcomeRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(PredictionOutcome::try_from).collect()
    }

    pub async fn outcomes_for(&self, prediction_id: &str) -> Result<Vec<PredictionOutcome>> {
        let sql = format!(
            "SELECT {OUTCOME_COLUMNS} FROM outcomes WHERE prediction_id = ? ORDER BY recorded_at ASC"
        );
        let rows: Vec<OutcomeRow> = sqlx::query_as(&sql)
            .bind(prediction_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(PredictionOutcome::try_from).collect()
    }

    /// Insert an outcome unless one already exists for its (prediction, horizon).
    /// Returns `true` when a row was written, `false` when the pair was already taken.
    pub async fn insert_outcome(&self, o: &PredictionOutcome) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO outcomes (
                id, prediction_id, horizon, price_at_check, price_change,
                computed_return_pct, correct, verdict, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (prediction_id, horizon) DO NOTHING
            "#,
        )
        .bind(&o.id)
        .bind(&o.prediction_id)
        .bind(o.horizon.as_str())
        .bind(o.price_at_check)
        .bind(o.price_change)
        .bind(o.computed_return_pct)
        .bind(o.correct)
        .bind(o.verdict.as_str())
        .bind(o.recorded_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn outcome_count(&self, horizon: Horizon) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outcomes WHERE horizon = ?")
            .bind(horizon.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Outcomes joined to ticker and signal. Tickers are upper-cased so
    /// `sol` and `SOL` land in the same group. Within a group, oldest
    /// prediction first.
    pub async fn scored_outcomes(&self) -> Result<Vec<ScoredOutcome>> {
        let rows: Vec<ScoredOutcomeRow> = sqlx::query_as(
            r#"
            SELECT UPPER(TRIM(p.ticker)) AS ticker, p.signal, p.created_at,
                   o.horizon, o.correct, o.computed_return_pct, o.recorded_at
            FROM outcomes o
            JOIN predictions p ON p.id = o.prediction_id
            ORDER BY 1, p.signal, o.horizon, p.created_at ASC, p.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScoredOutcome::try_from).collect()
    }

    pub async fn accuracy_summary(&self) -> Result<AccuracySummary> {
        let (total, correct, avg_return): (i64, i64, Option<f64>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(correct), 0), AVG(computed_return_pct)
            FROM outcomes
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let win_rate = if total > 0 { correct as f64 / total as f64 } else { 0.0 };
        Ok(AccuracySummary {
            total_outcomes: total,
            correct_outcomes: correct,
            win_rate,
            avg_return_pct: avg_return.unwrap_or(0.0),
        })
    }

    // -----------------------------------------------------------------------
    // Accuracy stats
    // -----------------------------------------------------------------------

    /// Throw away every stat row and write `stats` in one transaction.
    pub async fn replace_accuracy_stats(&self, stats: &[AccuracyStat]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM accuracy_stats").execute(&mut *tx).await?;

        for s in stats {
            sqlx::query(
                r#"
                INSERT INTO accuracy_stats (
                    ticker, signal_type, horizon, accuracy, sample_count, correct_count,
                    avg_return_pct, current_streak, longest_win_streak, longest_loss_streak,
                    updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&s.ticker)
            .bind(s.signal.as_str())
            .bind(s.horizon.as_str())
            .bind(s.accuracy)
            .bind(s.sample_count)
            .bind(s.correct_count)
            .bind(s.avg_return_pct)
            .bind(s.current_streak)
            .bind(s.longest_win_streak)
            .bind(s.longest_loss_streak)
            .bind(s.updated_at_ms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn accuracy_stats(&self, filter: &StatsFilter) -> Result<Vec<AccuracyStat>> {
        let rows: Vec<AccuracyStatRow> = sqlx::query_as(
            r#"
            SELECT ticker, signal_type, horizon, accuracy, sample_count, correct_count,
                   avg_return_pct, current_streak, longest_win_streak, longest_loss_streak,
                   updated_at
            FROM accuracy_stats
            WHERE (?1 IS NULL OR ticker = ?1)
              AND (?2 IS NULL OR signal_type = ?2)
              AND (?3 IS NULL OR horizon = ?3)
            ORDER BY ticker, signal_type, horizon
            "#,
        )
        .bind(filter.ticker.as_deref())
        .bind(filter.signal.as_deref())
        .bind(filter.horizon.as_deref())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AccuracyStat::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Signal, Verdict};

    const HOUR: i64 = 3_600_000;

    fn prediction(id: &str, created_at_ms: i64) -> PredictionEvent {
        PredictionEvent {
            id: id.to_string(),
            ticker: "ETH".to_string(),
            signal: Signal::Sell,
            confidence: 0.6,
            price_at_prediction: 2_500.0,
            created_at_ms,
            agent_id: "agent".to_string(),
        }
    }

    fn outcome(id: &str, prediction_id: &str, horizon: Horizon) -> PredictionOutcome {
        PredictionOutcome {
            id: id.to_string(),
            prediction_id: prediction_id.to_string(),
            horizon,
            price_at_check: 2_400.0,
            price_change: -100.0,
            computed_return_pct: -4.0,
            correct: true,
            verdict: Verdict::Win,
            recorded_at_ms: 10 * HOUR,
        }
    }

    #[tokio::test]
    async fn duplicate_outcome_is_ignored() {
        let store = Store::in_memory().await.unwrap();
        store.insert_prediction(&prediction("p1", 0)).await.unwrap();

        assert!(store.insert_outcome(&outcome("o1", "p1", Horizon::OneHour)).await.unwrap());
        assert!(!store.insert_outcome(&outcome("o2", "p1", Horizon::OneHour)).await.unwrap());

        let rows = store.outcomes_for("p1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "o1");
        assert_eq!(rows[0].verdict, Verdict::Win);
    }

    #[tokio::test]
    async fn loaded_tickers_are_upper_cased() {
        let store = Store::in_memory().await.unwrap();
        let mut p = prediction("p1", 0);
        p.ticker = " eth ".to_string();
        store.insert_prediction(&p).await.unwrap();

        let loaded = store.get_prediction("p1").await.unwrap().unwrap();
        assert_eq!(loaded.ticker, "ETH");
        assert_eq!(store.load_predictions().await.unwrap()[0].ticker, "ETH");
        assert_eq!(store.pending_work(HOUR).await.unwrap()[0].0.ticker, "ETH");
    }

    #[tokio::test]
    async fn overflowing_creation_time_is_not_pending() {
        let store = Store::in_memory().await.unwrap();
        store.insert_prediction(&prediction("future", i64::MAX - 10)).await.unwrap();

        assert!(store.pending_work(1_800_000_000_000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_work_is_the_set_difference() {
        let store = Store::in_memory().await.unwrap();
        store.insert_prediction(&prediction("old", 0)).await.unwrap();
        store.insert_prediction(&prediction("new", 5 * HOUR)).await.unwrap();
        store.insert_outcome(&outcome("o1", "old", Horizon::OneHour)).await.unwrap();

        let pending = store.pending_work(6 * HOUR).await.unwrap();
        let pairs: Vec<(String, Horizon)> =
            pending.into_iter().map(|(p, h)| (p.id, h)).collect();
        assert_eq!(
            pairs,
            vec![
                ("old".to_string(), Horizon::FourHours),
                ("new".to_string(), Horizon::OneHour),
            ]
        );
    }

    #[tokio::test]
    async fn accuracy_filter_matches_columns() {
        let store = Store::in_memory().await.unwrap();
        let stat = |ticker: &str, horizon: Horizon| AccuracyStat {
            ticker: ticker.to_string(),
            signal: Signal::Buy,
            horizon,
            accuracy: 0.5,
            sample_count: 2,
            correct_count: 1,
            avg_return_pct: 0.1,
            current_streak: 1,
            longest_win_streak: 1,
            longest_loss_streak: 1,
            updated_at_ms: 0,
        };
        store
            .replace_accuracy_stats(&[stat("BTC", Horizon::OneHour), stat("SOL", Horizon::OneDay)])
            .await
            .unwrap();

        let all = store.accuracy_stats(&StatsFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let sol = store
            .accuracy_stats(&StatsFilter {
                ticker: Some("SOL".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sol.len(), 1);
        assert_eq!(sol[0].horizon, Horizon::OneDay);

        store.replace_accuracy_stats(&[]).await.unwrap();
        assert!(store.accuracy_stats(&StatsFilter::default()).await.unwrap().is_empty());
    }
}
