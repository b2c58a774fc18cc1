//! Liveness endpoint. Healthy means the coordination store answers and the
//! queue depth is readable; anything else degrades the report without
//! taking the process down (bot matches keep working regardless).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: u64,
    pub dependencies: Dependencies,
    pub metrics: Metrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependencies {
    pub coord_store_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coord_store_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub waiting_players: usize,
    pub active_games: usize,
}

pub async fn healthcheck(State(app): State<Arc<AppState>>) -> Json<HealthReport> {
    let ping = app.queue.ping().await;
    let depth = app.queue.depth().await;
    let active_games = app.sessions.count().await;

    let (connected, error, waiting_players) = match (ping, depth) {
        (Ok(()), Ok(depth)) => (true, None, depth),
        (Err(err), _) | (_, Err(err)) => (false, Some(err.to_string()), 0),
    };

    Json(HealthReport {
        status: if connected { "Healthy" } else { "Degraded" },
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64,
        dependencies: Dependencies {
            coord_store_connected: connected,
            coord_store_error: error,
        },
        metrics: Metrics {
            waiting_players,
            active_games,
        },
    })
}
