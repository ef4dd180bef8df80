use std::{sync::Arc, time::Instant};

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{config::Config, models::now_rfc3339, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Seconds since the server started.
    pub uptime: f64,
    pub timestamp: String,
    pub environment: String,
    pub version: String,
}

/// Liveness check, served at `/health` and `/api/health`.
#[debug_handler(state = AppState)]
pub async fn health(State(config): State<Arc<Config>>, State(started_at): State<Instant>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_owned(),
        uptime: started_at.elapsed().as_secs_f64(),
        timestamp: now_rfc3339(),
        environment: config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
    })
}
