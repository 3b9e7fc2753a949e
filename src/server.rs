//! HTTP host for the helpdesk.
//!
//! A thin JSON layer over [`Conversation::answer`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | `{question, session_id?}` → `{answer, transcript, session_id}` |
//! | `POST` | `/llm` | `{text, session_id?}` → `{text, session_id}` |
//! | `GET`  | `/health` | Health check with version and index/session counts |
//!
//! Requests without a `session_id` start a new session; the generated id is
//! returned so the client can continue the conversation.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No text provided" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use helpdesk_rag_core::RagError;

use crate::config::Config;
use crate::conversation::Conversation;
use crate::session::SessionStore;

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    conversation: Arc<Conversation>,
}

impl AppState {
    pub fn new(conversation: Arc<Conversation>) -> Self {
        Self { conversation }
    }
}

/// Build the router with all routes and CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ask", post(handle_ask))
        .route("/llm", post(handle_llm))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on an already bound listener until the process ends.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Bind `[server].bind`, start the session sweeper, and serve.
pub async fn run_server(config: &Config, conversation: Arc<Conversation>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let _sweeper = spawn_session_sweeper(
        Arc::clone(conversation.sessions()),
        Duration::from_secs(config.sessions.sweep_interval_secs),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, chunks = conversation.indexed_chunks(), "helpdesk listening");
    println!("Helpdesk listening on http://{}", bind_addr);

    serve(listener, AppState::new(conversation)).await
}

/// Periodically drop idle sessions. A no-op when no idle TTL is configured.
pub fn spawn_session_sweeper(
    sessions: Arc<SessionStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if sessions.policy().idle_ttl.is_none() {
            return;
        }
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sessions.purge_expired();
        }
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Client mistakes become 400; pipeline failures are logged and reported
/// as a generic 500.
fn classify(err: RagError, session_id: &str) -> AppError {
    match err {
        RagError::EmptyQuestion => bad_request(err.to_string()),
        other => {
            error!(session = session_id, error = %other, "pipeline failure");
            internal("failed to answer the question, please try again")
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        bad_request(rejection.body_text())
    }
}

fn resolve_session_id(requested: Option<String>) -> String {
    requested
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    transcript: Vec<String>,
    session_id: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = payload?;
    let session_id = resolve_session_id(req.session_id);
    let question = req.question.unwrap_or_default();

    let answer = state
        .conversation
        .answer(&question, &session_id)
        .await
        .map_err(|e| classify(e, &session_id))?;

    Ok(Json(AskResponse {
        answer: answer.answer,
        transcript: answer.transcript,
        session_id,
    }))
}

// ============ POST /llm ============

#[derive(Deserialize)]
struct LlmRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Serialize)]
struct LlmResponse {
    text: String,
    session_id: String,
}

async fn handle_llm(
    State(state): State<AppState>,
    payload: Result<Json<LlmRequest>, JsonRejection>,
) -> Result<Json<LlmResponse>, AppError> {
    let Json(req) = payload?;
    let text = match req.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Err(bad_request("No text provided")),
    };
    let session_id = resolve_session_id(req.session_id);

    let answer = state
        .conversation
        .answer(&text, &session_id)
        .await
        .map_err(|e| classify(e, &session_id))?;

    Ok(Json(LlmResponse {
        text: answer.answer,
        session_id,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
    sessions: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.conversation.indexed_chunks(),
        sessions: state.conversation.sessions().len(),
    })
}
