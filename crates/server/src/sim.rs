//! Simulation routes.
//!
//! - `POST   /api/sim`                 buyer reply for `{ scenario, messages, session_id? }`
//! - `GET    /api/sessions/{id}`       last snapshot recorded for a session
//! - `DELETE /api/sessions/{id}`       drop a session snapshot
//!
//! `POST /api/sim` always answers `200 { text }`. Bodies that are not a JSON object get
//! the restate line instead of an error status.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use pitchsim_agent::lines::RESTATE_LINE;
use pitchsim_agent::runtime::{BuyerRequest, BuyerRuntime};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::sessions::{SessionSnapshot, SessionStore};

#[derive(Clone)]
pub struct SimState {
    pub runtime: Arc<BuyerRuntime>,
    pub sessions: Arc<dyn SessionStore>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct SimResponse {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SimError {
    pub error: String,
}

pub fn router(state: SimState) -> Router {
    Router::new()
        .route("/api/sim", post(simulate))
        .route("/api/sessions/{session_id}", get(get_session).delete(delete_session))
        .with_state(state)
}

async fn simulate(State(state): State<SimState>, body: Bytes) -> Json<SimResponse> {
    let correlation_id = Uuid::new_v4().simple().to_string();

    let Some(request) = BuyerRequest::from_json(&body) else {
        warn!(
            event_name = "server.sim.unreadable_body",
            correlation_id = %correlation_id,
            body_bytes = body.len(),
            "request body is not a json object; asking the rep to restate"
        );
        return Json(SimResponse { text: RESTATE_LINE.to_string() });
    };

    let reply = state.runtime.reply(&request, &correlation_id).await;

    if let Some(session_id) = &request.session_id {
        state
            .sessions
            .save(SessionSnapshot {
                session_id: session_id.clone(),
                scenario: request.scenario.clone(),
                turn_count: request.conversation.len() + 1,
                last_buyer_line: reply.text.clone(),
                updated_at: Utc::now(),
            })
            .await;
    }

    info!(
        event_name = "server.sim.replied",
        correlation_id = %correlation_id,
        session_id = request.session_id.as_deref().unwrap_or("none"),
        vertical = %request.scenario.vertical,
        difficulty = %request.scenario.difficulty,
        turns = request.conversation.len(),
        source = ?reply.source,
        "buyer reply served"
    );

    Json(SimResponse { text: reply.text })
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<SimState>,
) -> Result<Json<SessionSnapshot>, (StatusCode, Json<SimError>)> {
    state.sessions.get(&session_id).await.map(Json).ok_or_else(|| not_found(&session_id))
}

async fn delete_session(
    Path(session_id): Path<String>,
    State(state): State<SimState>,
) -> Result<StatusCode, (StatusCode, Json<SimError>)> {
    if state.sessions.evict(&session_id).await {
        info!(
            event_name = "server.sessions.evicted",
            correlation_id = %session_id,
            "session evicted on request"
        );
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&session_id))
    }
}

fn not_found(session_id: &str) -> (StatusCode, Json<SimError>) {
    (StatusCode::NOT_FOUND, Json(SimError { error: format!("session `{session_id}` not found") }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use pitchsim_agent::generator::ScriptedGenerator;
    use pitchsim_agent::lines::{RESTATE_LINE, WAITING_LINE};
    use pitchsim_agent::runtime::BuyerRuntime;
    use pitchsim_core::policy::CapTable;
    use pitchsim_core::rules::RuleBook;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, SimState};
    use crate::sessions::InMemorySessionStore;

    fn app(generator: ScriptedGenerator) -> Router {
        let runtime = BuyerRuntime::new(
            RuleBook::builtin().expect("built-in rules"),
            CapTable::default(),
            Arc::new(generator),
        );
        router(SimState {
            runtime: Arc::new(runtime),
            sessions: Arc::new(InMemorySessionStore::new(Duration::from_secs(60))),
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, payload)
    }

    #[tokio::test]
    async fn unparseable_body_gets_restate_line() {
        let app = app(ScriptedGenerator::new());

        for body in ["{not json", "[1, 2, 3]", ""] {
            let (status, payload) = send(&app, Method::POST, "/api/sim", body).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(payload["text"], RESTATE_LINE, "body {body:?}");
        }
    }

    #[tokio::test]
    async fn missing_rep_turn_gets_waiting_line() {
        let app = app(ScriptedGenerator::new().with_draft("should not be used"));
        let (status, payload) = send(
            &app,
            Method::POST,
            "/api/sim",
            r#"{"scenario":{"vertical":"pharma"},"messages":[{"speaker":"buyer","text":"Hi"}]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["text"], WAITING_LINE);
    }

    #[tokio::test]
    async fn reply_records_session_snapshot_until_deleted() {
        let app = app(ScriptedGenerator::new().with_draft("How long does setup usually take?"));
        let body = r#"{
            "scenario": {"vertical": "tech", "difficulty": "easy"},
            "messages": [
                {"speaker": "rep", "text": "Thanks for hopping on."},
                {"speaker": "oops"},
                {"who": "you", "text": "We automate your deploy checks."}
            ],
            "session_id": " demo-1 "
        }"#;

        let (status, payload) = send(&app, Method::POST, "/api/sim", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["text"], "How long does setup usually take?");

        let (status, snapshot) = send(&app, Method::GET, "/api/sessions/demo-1", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["last_buyer_line"], "How long does setup usually take?");
        assert_eq!(snapshot["turn_count"], 3);
        assert_eq!(snapshot["scenario"]["vertical"], "tech");

        let (status, _) = send(&app, Method::DELETE, "/api/sessions/demo-1", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, payload) = send(&app, Method::GET, "/api/sessions/demo-1", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(payload["error"].as_str().unwrap_or_default().contains("demo-1"));
    }

    #[tokio::test]
    async fn deleting_unknown_session_is_not_found() {
        let app = app(ScriptedGenerator::new());
        let (status, _) = send(&app, Method::DELETE, "/api/sessions/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
