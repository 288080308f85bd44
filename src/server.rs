use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::aggregate::{
    build_agent_predictions, build_group_predictions, summarize_agents, summarize_groups,
    AgentSummary, GroupSummary, TargetBook,
};
use crate::db;
use crate::forecast::resolve_window;
use crate::models::{AgentPrediction, GroupPrediction, TargetConfig};
use crate::probability::ProbabilityModel;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub targets: TargetConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predictions", get(group_predictions_handler))
        .route("/predictions/agents", get(agent_predictions_handler))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "prediction API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct PredictionParams {
    month: Option<String>,
    center: Option<String>,
    strategy: Option<String>,
}

impl PredictionParams {
    /// Unknown strategy names degrade to the default model, mirroring how a
    /// malformed month degrades to the current one.
    fn model(&self) -> ProbabilityModel {
        self.strategy
            .as_deref()
            .and_then(ProbabilityModel::parse)
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupPredictionsData {
    month: String,
    predictions: Vec<GroupPrediction>,
    summary: GroupSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentPredictionsData {
    month: String,
    agents: Vec<AgentPrediction>,
    summary: AgentSummary,
}

async fn group_predictions_handler(
    State(state): State<AppState>,
    Query(params): Query<PredictionParams>,
) -> Response {
    match group_predictions(&state, &params).await {
        Ok(data) => Json(json!({ "success": true, "data": data })).into_response(),
        Err(error) => error_response("group prediction request failed", error),
    }
}

async fn agent_predictions_handler(
    State(state): State<AppState>,
    Query(params): Query<PredictionParams>,
) -> Response {
    match agent_predictions(&state, &params).await {
        Ok(data) => Json(json!({ "success": true, "data": data })).into_response(),
        Err(error) => error_response("agent prediction request failed", error),
    }
}

fn error_response(label: &str, error: anyhow::Error) -> Response {
    tracing::error!(%error, "{label}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

async fn group_predictions(
    state: &AppState,
    params: &PredictionParams,
) -> anyhow::Result<GroupPredictionsData> {
    let today = Utc::now().date_naive();
    let window = resolve_window(params.month.as_deref(), today)
        .ok_or_else(|| anyhow::anyhow!("could not derive a calendar month window"))?;

    let (target_rows, rows) = tokio::join!(
        db::fetch_targets(&state.pool),
        db::fetch_group_day_rows(&state.pool, &window, params.center.as_deref()),
    );
    let book = TargetBook::new(target_rows, &state.targets);

    let predictions = build_group_predictions(&rows, &book, &window, params.model());
    let summary = summarize_groups(&predictions);

    Ok(GroupPredictionsData {
        month: window.label(),
        predictions,
        summary,
    })
}

async fn agent_predictions(
    state: &AppState,
    params: &PredictionParams,
) -> anyhow::Result<AgentPredictionsData> {
    let today = Utc::now().date_naive();
    let window = resolve_window(params.month.as_deref(), today)
        .ok_or_else(|| anyhow::anyhow!("could not derive a calendar month window"))?;

    let (target_rows, rows, top_errors) = tokio::join!(
        db::fetch_targets(&state.pool),
        db::fetch_agent_day_rows(&state.pool, &window, params.center.as_deref(), None),
        db::fetch_agent_top_errors(&state.pool, &window),
    );
    let book = TargetBook::new(target_rows, &state.targets);

    let agents = build_agent_predictions(&rows, &top_errors, &book, &window, params.model());
    let summary = summarize_agents(&agents);

    Ok(AgentPredictionsData {
        month: window.label(),
        agents,
        summary,
    })
}
