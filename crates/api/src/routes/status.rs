//! Security Status Routes

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;
use alerting::AlertStats;
use rule_registry::AlertThresholds;

/// Security status overview for the dashboard header
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub last_update: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_active: usize,
    pub escalated: usize,
    pub stats: AlertStats,
    /// Configured alerting floors
    pub thresholds: AlertThresholds,
}

/// Current security status overview
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let snapshot = state.handle.snapshot();
    let stats = snapshot.stats();

    Json(StatusResponse {
        status: "active".to_string(),
        last_update: snapshot.generated_at,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        total_active: stats.active,
        escalated: stats.escalated,
        thresholds: state.handle.registry().thresholds().clone(),
        stats,
    })
}
