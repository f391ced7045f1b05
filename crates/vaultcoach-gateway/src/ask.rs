//! Ask endpoints: validate the question, compose the prompt, relay to the
//! completion API, and return or stream the reply. The session store records
//! each finished exchange; the composer only ever sees snapshots.

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use vaultcoach_core::{
    compose, vault_summary_context, ChatTurn, CoachMode, CompletionBackend, ComposeRequest,
};

use crate::AppState;

const DEFAULT_SESSION: &str = "default";
const UPSTREAM_ERROR: &str = "The coach is unavailable right now. Please try again.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AskRequest {
    question: Option<String>,
    /// Legacy clients send `message` instead of `question`.
    message: Option<String>,
    #[serde(alias = "coachMode")]
    mode: Option<CoachMode>,
    system_prompt: Option<String>,
    memory: Option<String>,
    vault_type: Option<String>,
    session_id: Option<String>,
    user_id: Option<String>,
    temperature: Option<f32>,
}

impl AskRequest {
    fn question_text(&self) -> Option<String> {
        self.question
            .as_deref()
            .or(self.message.as_deref())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
    }

    fn session_key(&self) -> String {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
            .to_string()
    }
}

fn validation_error(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": msg }))).into_response()
}

fn upstream_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": UPSTREAM_ERROR })),
    )
        .into_response()
}

/// Vault context for the system directive: an explicit vault type wins;
/// otherwise a status summary is pulled from the store when one is configured.
/// Store failures degrade to no context rather than failing the ask.
async fn resolve_vault_context(state: &AppState, req: &AskRequest) -> Option<String> {
    if let Some(vt) = req.vault_type.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(format!("The member is currently focused on their {vt} vault."));
    }
    let user_id = req.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let store = state.store.as_ref()?;
    match store.fetch_active_vaults(user_id).await {
        Ok(vaults) => vault_summary_context(&vaults),
        Err(e) => {
            tracing::warn!(target: "coach::ask", error = %e, "vault summary unavailable");
            None
        }
    }
}

/// Shared front half of every ask variant: validation, history snapshot,
/// composition. Returns the composed messages, the effective mode, the
/// question, and the session key.
async fn prepare(
    state: &AppState,
    req: &AskRequest,
) -> Result<(Vec<ChatTurn>, CoachMode, String, String), Response> {
    let question = req
        .question_text()
        .ok_or_else(|| validation_error("question is required"))?;
    let session_key = req.session_key();
    let history = state.sessions.snapshot(&session_key);
    let vault_context = resolve_vault_context(state, req).await;

    let (messages, final_mode) = compose(&ComposeRequest {
        question: &question,
        requested_mode: req.mode,
        system_prompt: req.system_prompt.as_deref(),
        memory: req.memory.as_deref(),
        history: &history,
        vault_context: vault_context.as_deref(),
    });
    Ok((messages, final_mode, question, session_key))
}

/// POST /api/v1/ask — non-streaming reply.
pub(crate) async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Response {
    let (messages, final_mode, question, session_key) = match prepare(&state, &req).await {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };
    tracing::info!(target: "coach::ask", mode = final_mode.label(), chars = question.len(), "ask");

    match state.relay.complete(&messages, req.temperature).await {
        Ok(reply) => {
            state.sessions.record_exchange(&session_key, &question, &reply);
            Json(serde_json::json!({ "reply": reply, "finalMode": final_mode.label() }))
                .into_response()
        }
        Err(e) => {
            tracing::error!(target: "coach::ask", error = %e, "completion failed");
            upstream_error()
        }
    }
}

/// POST /api/v1/ask/stream — raw chunked reply text (`text/plain`).
/// Fragments are forwarded as they arrive; a mid-stream failure aborts the
/// body without a termination marker, so an abrupt close means failure.
pub(crate) async fn ask_stream(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Response {
    let (messages, final_mode, question, session_key) = match prepare(&state, &req).await {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };
    tracing::info!(target: "coach::ask", mode = final_mode.label(), "ask stream");

    let mut rx = match state.relay.stream(&messages, req.temperature).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(target: "coach::ask", error = %e, "stream setup failed");
            return upstream_error();
        }
    };

    let sessions = state.sessions.clone();
    let body = async_stream::stream! {
        let mut full = String::new();
        while let Some(frame) = rx.recv().await {
            match frame {
                Ok(frag) => {
                    full.push_str(&frag);
                    yield Ok::<Bytes, std::io::Error>(Bytes::from(frag));
                }
                Err(e) => {
                    tracing::error!(target: "coach::ask", error = %e, "stream failed mid-transfer");
                    yield Err(std::io::Error::other(e));
                    return;
                }
            }
        }
        if !full.is_empty() {
            sessions.record_exchange(&session_key, &question, &full);
        }
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| upstream_error())
}

/// POST /api/v1/ask/events — SSE rendition with explicit framing: `token`
/// events carry fragments, `done` marks a clean end, `error` a failed one.
pub(crate) async fn ask_events(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Response {
    let (messages, final_mode, question, session_key) = match prepare(&state, &req).await {
        Ok(parts) => parts,
        Err(resp) => return resp,
    };

    let mut rx = match state.relay.stream(&messages, req.temperature).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(target: "coach::ask", error = %e, "stream setup failed");
            return upstream_error();
        }
    };

    let sessions = state.sessions.clone();
    let mode_label = final_mode.label();
    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(Event::default().event("mode").data(mode_label));
        let mut full = String::new();
        while let Some(frame) = rx.recv().await {
            match frame {
                Ok(frag) => {
                    full.push_str(&frag);
                    yield Ok(Event::default().event("token").data(frag));
                }
                Err(e) => {
                    tracing::error!(target: "coach::ask", error = %e, "stream failed mid-transfer");
                    yield Ok(Event::default().event("error").data(UPSTREAM_ERROR));
                    return;
                }
            }
        }
        sessions.record_exchange(&session_key, &question, &full);
        yield Ok(Event::default().event("done").data(""));
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}
