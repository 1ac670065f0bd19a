//! Alert Routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use alerting::AlertError;
use monitor_scheduler::CommandError;
use threat_model::{Alert, AlertStatus, Fingerprint, Severity};

/// Query parameters for the alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by lifecycle status; `resolved` selects from history
    pub status: Option<AlertStatus>,
    /// Filter by severity
    pub severity: Option<Severity>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for the alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<Alert>,
    pub count: usize,
    pub unacknowledged_count: usize,
}

/// Outcome of an acknowledge/resolve action
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// List alerts from the current snapshot
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Json<AlertResponse> {
    let limit = params.limit.min(500);
    let alerts = state.handle.alerts(params.status, params.severity);
    let unacknowledged = alerts
        .iter()
        .filter(|a| matches!(a.status, AlertStatus::Open | AlertStatus::Escalated))
        .count();
    let data: Vec<Alert> = alerts.into_iter().take(limit).collect();

    Json(AlertResponse {
        count: data.len(),
        unacknowledged_count: unacknowledged,
        data,
    })
}

/// Single alert by fingerprint
pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path((pattern, source)): Path<(String, String)>,
) -> Response {
    let fingerprint = Fingerprint::new(pattern, source);
    match state.handle.alert(&fingerprint) {
        Some(alert) => Json(alert).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ActionResponse {
                success: false,
                message: format!("No alert for {}", fingerprint),
            }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub user: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Acknowledge an open alert
pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path((pattern, source)): Path<(String, String)>,
    Json(body): Json<AcknowledgeRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let fingerprint = Fingerprint::new(pattern, source);
    match state.handle.acknowledge(fingerprint, body.user).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ActionResponse {
                success: true,
                message: "Alert acknowledged".to_string(),
            }),
        ),
        Err(error) => action_error(error),
    }
}

/// Resolve an active alert
pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path((pattern, source)): Path<(String, String)>,
    Json(body): Json<ResolveRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let fingerprint = Fingerprint::new(pattern, source);
    match state.handle.resolve(fingerprint, body.user, body.notes).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ActionResponse {
                success: true,
                message: "Alert resolved".to_string(),
            }),
        ),
        Err(error) => action_error(error),
    }
}

fn action_error(error: CommandError) -> (StatusCode, Json<ActionResponse>) {
    let status = match &error {
        CommandError::Alert(AlertError::NotFound(_)) => StatusCode::NOT_FOUND,
        CommandError::Alert(AlertError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        CommandError::EngineDown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        status,
        Json(ActionResponse {
            success: false,
            message: error.to_string(),
        }),
    )
}
