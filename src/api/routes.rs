use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::accuracy::AccuracyAggregator;
use crate::api::health::{HealthSnapshot, HealthState};
use crate::db::{StatsFilter, Store};
use crate::error::AppError;
use crate::horizon::horizon_state;
use crate::oracle::LatencyStats;
use crate::types::{
    now_ms, AccuracyStat, AccuracySummary, Horizon, HorizonReadiness, HorizonState,
    PredictionEvent, PredictionOutcome, Signal,
};

#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub aggregator: AccuracyAggregator,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/accuracy", get(get_accuracy))
        .route("/accuracy/summary", get(get_accuracy_summary))
        .route("/predictions/:id/outcomes", get(get_prediction_outcomes))
        .route("/training/readiness", get(get_training_readiness))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AccuracyQuery {
    pub ticker: Option<String>,
    pub signal: Option<String>,
    pub horizon: Option<String>,
}

impl AccuracyQuery {
    /// Normalize and validate into a store filter. Unknown signals or
    /// horizons are rejected rather than silently matching nothing.
    fn into_filter(self) -> Result<StatsFilter, AppError> {
        let signal = self
            .signal
            .map(|s| {
                s.parse::<Signal>()
                    .map_err(|_| AppError::BadRequest(format!("unknown signal `{s}`")))
            })
            .transpose()?;
        let horizon = self
            .horizon
            .map(|h| {
                h.parse::<Horizon>()
                    .map_err(|_| AppError::BadRequest(format!("unknown horizon `{h}`")))
            })
            .transpose()?;

        Ok(StatsFilter {
            ticker: self.ticker.map(|t| t.trim().to_uppercase()),
            signal: signal.map(|s| s.as_str().to_string()),
            horizon: horizon.map(|h| h.as_str().to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HorizonStatus {
    pub horizon: Horizon,
    pub state: HorizonState,
}

#[derive(Serialize)]
pub struct PredictionOutcomesResponse {
    pub prediction: PredictionEvent,
    pub horizons: Vec<HorizonStatus>,
    pub outcomes: Vec<PredictionOutcome>,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub min_samples: i64,
    pub horizons: Vec<HorizonReadiness>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_accuracy(
    State(state): State<ApiState>,
    Query(params): Query<AccuracyQuery>,
) -> Result<Json<Vec<AccuracyStat>>, AppError> {
    let filter = params.into_filter()?;
    Ok(Json(state.store.accuracy_stats(&filter).await?))
}

async fn get_accuracy_summary(
    State(state): State<ApiState>,
) -> Result<Json<AccuracySummary>, AppError> {
    Ok(Json(state.store.accuracy_summary().await?))
}

async fn get_prediction_outcomes(
    State(state): State<ApiState>,
    Path(prediction_id): Path<String>,
) -> Result<Json<PredictionOutcomesResponse>, AppError> {
    let prediction = state
        .store
        .get_prediction(&prediction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("prediction `{prediction_id}`")))?;
    let outcomes = state.store.outcomes_for(&prediction_id).await?;

    let now = now_ms();
    let horizons = Horizon::ALL
        .into_iter()
        .map(|horizon| {
            let recorded = outcomes.iter().any(|o| o.horizon == horizon);
            HorizonStatus {
                horizon,
                state: horizon_state(prediction.created_at_ms, now, horizon, recorded),
            }
        })
        .collect();

    Ok(Json(PredictionOutcomesResponse {
        prediction,
        horizons,
        outcomes,
    }))
}

async fn get_training_readiness(
    State(state): State<ApiState>,
) -> Result<Json<ReadinessResponse>, AppError> {
    Ok(Json(ReadinessResponse {
        min_samples: state.aggregator.min_training_samples(),
        horizons: state.aggregator.readiness().await?,
    }))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reqwest::StatusCode;
    use serde_json::Value;

    use crate::config::ScoringRules;
    use crate::recorder::OutcomeRecorder;

    const HOUR: i64 = 3_600_000;

    async fn serve(state: ApiState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn seeded_state() -> ApiState {
        let store = Store::in_memory().await.unwrap();
        let prediction = PredictionEvent {
            id: "p-1".to_string(),
            ticker: "BTC".to_string(),
            signal: Signal::Buy,
            confidence: 0.9,
            price_at_prediction: 100.0,
            created_at_ms: now_ms() - 5 * HOUR,
            agent_id: "agent".to_string(),
        };
        store.insert_prediction(&prediction).await.unwrap();

        let recorder = OutcomeRecorder::new(store.clone(), ScoringRules::default());
        recorder
            .record_outcome(&prediction, Horizon::OneHour, 110.0, now_ms())
            .await;

        let aggregator = AccuracyAggregator::new(store.clone(), 1);
        aggregator.recompute_stats().await.unwrap();

        let latency = Arc::new(LatencyStats::new());
        latency.record(Duration::from_millis(120));

        ApiState {
            store,
            aggregator,
            health: Arc::new(HealthState::new()),
            latency,
        }
    }

    #[tokio::test]
    async fn accuracy_filters_and_validates() {
        let base = serve(seeded_state().await).await;
        let client = reqwest::Client::new();

        let all: Value = client
            .get(format!("{base}/accuracy?ticker=btc&signal=buy&horizon=1h"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.as_array().unwrap().len(), 1);
        assert_eq!(all[0]["ticker"], "BTC");
        assert_eq!(all[0]["sample_count"], 1);

        let none: Value = client
            .get(format!("{base}/accuracy?horizon=7d"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(none.as_array().unwrap().is_empty());

        let bad = client
            .get(format!("{base}/accuracy?horizon=2w"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn prediction_outcomes_report_horizon_states() {
        let base = serve(seeded_state().await).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .get(format!("{base}/predictions/p-1/outcomes"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["outcomes"].as_array().unwrap().len(), 1);
        let states: Vec<&str> = body["horizons"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["state"].as_str().unwrap())
            .collect();
        assert_eq!(states, vec!["resolved", "eligible", "pending", "pending"]);

        let missing = client
            .get(format!("{base}/predictions/nope/outcomes"))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn summary_readiness_health_and_latency() {
        let base = serve(seeded_state().await).await;
        let client = reqwest::Client::new();
        let get = |path: &str| {
            let url = format!("{base}{path}");
            let client = client.clone();
            async move { client.get(url).send().await.unwrap().json::<Value>().await.unwrap() }
        };

        let summary = get("/accuracy/summary").await;
        assert_eq!(summary["total_outcomes"], 1);
        assert_eq!(summary["correct_outcomes"], 1);

        let readiness = get("/training/readiness").await;
        assert_eq!(readiness["min_samples"], 1);
        assert_eq!(readiness["horizons"][0]["horizon"], "1h");
        assert_eq!(readiness["horizons"][0]["ready"], true);
        assert_eq!(readiness["horizons"][1]["ready"], false);

        let health = get("/health").await;
        assert_eq!(health["runs_completed"], 0);
        assert!(health["last_run_finished_ms"].is_null());

        let latency = get("/stats/latency").await;
        assert_eq!(latency["samples"], 1);
        assert!(latency["p50_ms"].as_u64().unwrap() >= 119);
    }
}
