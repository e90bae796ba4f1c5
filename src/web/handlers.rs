//! API handlers for the runtime control surface.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{display_status_label, summarize_instance, AppState, InstanceSummary, TargetStateView};
use crate::runtime::WorkerStatus;

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn internal_error(context: &str, err: anyhow::Error) -> (StatusCode, Json<ApiResponse<()>>) {
    error!("{}: {}", context, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(format!("{context}: {err}"))),
    )
}

fn not_found(what: &str) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("{what} not found"))),
    )
}

// === Runtime control ===

pub async fn get_all_workers(State(state): State<AppState>) -> ApiResult<Vec<WorkerStatus>> {
    Ok(Json(ApiResponse::success(state.runtime.get_all().await)))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<WorkerStatus> {
    match state.runtime.try_get(&instance_id).await {
        Some(status) => Ok(Json(ApiResponse::success(status))),
        None => Err(not_found("worker")),
    }
}

pub async fn start_worker(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<String> {
    let exists = state
        .db
        .get_instance(&instance_id)
        .await
        .map_err(|e| internal_error("Instance lookup failed", e))?
        .is_some();
    if !exists {
        return Err(not_found("instance"));
    }

    state
        .runtime
        .start(&instance_id)
        .await
        .map_err(|e| internal_error("Start failed", e))?;
    Ok(Json(ApiResponse::success(format!("{instance_id} started"))))
}

pub async fn stop_worker(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<String> {
    state
        .runtime
        .stop(&instance_id)
        .await
        .map_err(|e| internal_error("Stop failed", e))?;
    Ok(Json(ApiResponse::success(format!("{instance_id} stopped"))))
}

pub async fn restart_worker(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<String> {
    let exists = state
        .db
        .get_instance(&instance_id)
        .await
        .map_err(|e| internal_error("Instance lookup failed", e))?
        .is_some();
    if !exists {
        return Err(not_found("instance"));
    }

    state
        .runtime
        .restart(&instance_id)
        .await
        .map_err(|e| internal_error("Restart failed", e))?;
    Ok(Json(ApiResponse::success(format!(
        "{instance_id} restarted"
    ))))
}

// === Read-only views ===

pub async fn get_instances(State(state): State<AppState>) -> ApiResult<Vec<InstanceSummary>> {
    let instances = state
        .db
        .list_instances()
        .await
        .map_err(|e| internal_error("Instance listing failed", e))?;

    let mut summaries = Vec::with_capacity(instances.len());
    for instance in &instances {
        let states = state
            .db
            .states_with_targets(&instance.instance_id)
            .await
            .map_err(|e| internal_error("State lookup failed", e))?;
        let worker = state.runtime.try_get(&instance.instance_id).await;
        summaries.push(summarize_instance(instance, worker, &states));
    }
    Ok(Json(ApiResponse::success(summaries)))
}

pub async fn get_instance_targets(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
) -> ApiResult<Vec<TargetStateView>> {
    let exists = state
        .db
        .get_instance(&instance_id)
        .await
        .map_err(|e| internal_error("Instance lookup failed", e))?
        .is_some();
    if !exists {
        return Err(not_found("instance"));
    }

    let states = state
        .db
        .states_with_targets(&instance_id)
        .await
        .map_err(|e| internal_error("State lookup failed", e))?;

    let views = states
        .into_iter()
        .map(|(target, target_state)| TargetStateView {
            target_id: target.target_id,
            url: target.url,
            enabled: target.enabled,
            status: display_status_label(target_state.display_status()).to_string(),
            state: target_state,
        })
        .collect();
    Ok(Json(ApiResponse::success(views)))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_event_limit")]
    pub limit: i64,
}

fn default_event_limit() -> i64 {
    50
}

pub async fn get_instance_events(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<crate::database::EventRecord>> {
    let limit = query.limit.clamp(1, 500);
    let events = state
        .db
        .recent_events(&instance_id, limit)
        .await
        .map_err(|e| internal_error("Event listing failed", e))?;
    Ok(Json(ApiResponse::success(events)))
}
