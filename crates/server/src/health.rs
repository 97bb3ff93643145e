use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pitchsim_agent::runtime::BuyerRuntime;
use serde::Serialize;

use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<BuyerRuntime>,
    sessions: Arc<dyn SessionStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub engine: HealthCheck,
    pub generator: HealthCheck,
    pub sessions: HealthCheck,
    pub checked_at: String,
}

pub fn router(runtime: Arc<BuyerRuntime>, sessions: Arc<dyn SessionStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime, sessions })
}

/// Always `200`: an offline generator still serves fallback lines, so it only degrades.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let generator = generator_check(&state.runtime);
    let ready = generator.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "pitchsim-server runtime initialized".to_string(),
        },
        engine: HealthCheck {
            status: "ready",
            detail: format!("{} topic rules compiled", state.runtime.rules().topic_rules().len()),
        },
        generator,
        sessions: HealthCheck {
            status: "ready",
            detail: format!("{} cached sessions", state.sessions.len().await),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

fn generator_check(runtime: &BuyerRuntime) -> HealthCheck {
    match runtime.generator_name() {
        "offline" => HealthCheck {
            status: "degraded",
            detail: "no llm credentials; serving fallback lines".to_string(),
        },
        name => HealthCheck { status: "ready", detail: format!("{name} generator configured") },
    }
}
