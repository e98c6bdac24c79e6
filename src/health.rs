use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default, Clone, Serialize)]
pub struct HealthState {
    pub ready: bool,
    pub checks_performed: u64,
    pub holds_issued: u64,
    pub program_pushes: u64,
    pub errors: u64,
    pub consecutive_failures: u32,
    pub expected_temperature: Option<i32>,
    pub last_commanded_temperature: Option<i32>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
}

/// Shared between the reconciliation loop (writer) and the HTTP handlers
/// (readers).
#[derive(Clone)]
pub struct HealthHandle {
    state: Arc<RwLock<HealthState>>,
    unhealthy_threshold: u32,
    started_at: DateTime<Utc>,
}

impl HealthHandle {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            state: Arc::new(RwLock::new(HealthState::default())),
            unhealthy_threshold,
            started_at: Utc::now(),
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.ready = true;
        state.checks_performed += 1;
        state.consecutive_failures = 0;
        state.last_check = Some(Utc::now());
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.checks_performed += 1;
        state.errors += 1;
        state.consecutive_failures += 1;
        state.last_check = Some(Utc::now());
        state.last_error = Some(Utc::now());
    }

    pub async fn record_hold(&self, temperature: i32) {
        let mut state = self.state.write().await;
        state.holds_issued += 1;
        state.last_commanded_temperature = Some(temperature);
    }

    pub async fn record_push(&self) {
        self.state.write().await.program_pushes += 1;
    }

    pub async fn set_expected(&self, temperature: i32) {
        self.state.write().await.expected_temperature = Some(temperature);
    }

    pub async fn set_token_expiry(&self, expires_at: DateTime<Utc>) {
        self.state.write().await.token_expires_at = Some(expires_at);
    }

    pub async fn snapshot(&self) -> HealthState {
        self.state.read().await.clone()
    }

    async fn status_label(&self) -> &'static str {
        let state = self.state.read().await;
        if state.consecutive_failures >= self.unhealthy_threshold {
            "unhealthy"
        } else if state.ready {
            "ready"
        } else {
            "starting"
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: i64,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    start_time: DateTime<Utc>,
    #[serde(flatten)]
    state: HealthState,
}

pub async fn serve(handle: HealthHandle, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health(State(handle): State<HealthHandle>) -> (StatusCode, Json<HealthResponse>) {
    let status = handle.status_label().await;
    let code = if status == "ready" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let response = HealthResponse {
        status,
        uptime_seconds: (Utc::now() - handle.started_at).num_seconds(),
        timestamp: Utc::now(),
    };
    (code, Json(response))
}

async fn status(State(handle): State<HealthHandle>) -> Json<StatusResponse> {
    let status = handle.status_label().await;
    let state = handle.snapshot().await;
    Json(StatusResponse {
        status,
        uptime_seconds: (Utc::now() - handle.started_at).num_seconds(),
        start_time: handle.started_at,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readiness_requires_one_successful_tick() {
        let handle = HealthHandle::new(3);
        assert_eq!(handle.status_label().await, "starting");

        handle.record_success().await;
        assert_eq!(handle.status_label().await, "ready");
    }

    #[tokio::test]
    async fn consecutive_failures_mark_unhealthy_until_a_success() {
        let handle = HealthHandle::new(3);
        handle.record_success().await;
        for _ in 0..3 {
            handle.record_failure().await;
        }
        assert_eq!(handle.status_label().await, "unhealthy");

        handle.record_success().await;
        assert_eq!(handle.status_label().await, "ready");

        let state = handle.snapshot().await;
        assert_eq!(state.checks_performed, 5);
        assert_eq!(state.errors, 3);
        assert_eq!(state.consecutive_failures, 0);
    }
}
