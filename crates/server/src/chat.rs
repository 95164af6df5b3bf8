use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use nexus_agent::llm::{ChatMessage, Role};
use nexus_agent::runtime::{ActionRequired, ChatAgent};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::sessions::SessionResolver;

const SESSION_COOKIE: &str = "session_id";

#[derive(Clone)]
pub struct ChatState {
    pub agent: Arc<ChatAgent>,
    pub sessions: Arc<dyn SessionResolver>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// The caller owns the conversation history and sends it with each turn.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_required: Option<ActionRequired>,
    /// History as mutated by the turn, for the caller to send back next time.
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub detail: String,
}

pub fn router(state: ChatState) -> Router {
    Router::new().route("/api/chat", post(chat)).with_state(state)
}

async fn chat(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ChatError>)> {
    let session_id = cookie_value(&headers, SESSION_COOKIE).ok_or_else(|| {
        (StatusCode::UNAUTHORIZED, Json(ChatError { detail: "Not authenticated".to_string() }))
    })?;

    let token = state.sessions.resolve(&session_id).await.map_err(|error| {
        (StatusCode::UNAUTHORIZED, Json(ChatError { detail: error.to_string() }))
    })?;

    let mut history = payload.history;
    match state.agent.run_chat_turn(&payload.message, &mut history, &token).await {
        Ok(reply) => Ok(Json(ChatResponse {
            role: reply.role,
            content: reply.content,
            trace: reply.trace,
            action_required: reply.action_required,
            history,
        })),
        Err(agent_error) => {
            error!(
                event_name = "server.chat.turn_failed",
                error = %agent_error,
                "chat turn terminated with an error"
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ChatError { detail: agent_error.to_string() }),
            ))
        }
    }
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
