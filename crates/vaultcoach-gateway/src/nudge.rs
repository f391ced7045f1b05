//! Nudge endpoints: store-backed (fetch a member's vaults) and explicit-field
//! (caller already knows streak/type/progress) variants of the same rules.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use vaultcoach_core::{nudge_from_vaults, nudge_message, NudgeFacts, VaultKind};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct NudgeRequest {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CoachNudgeRequest {
    #[serde(default)]
    streak: u32,
    vault_type: Option<String>,
    #[serde(default)]
    progress: i64,
}

/// POST /api/v1/nudge — fetch the member's active vaults and derive a nudge.
pub(crate) async fn nudge(
    State(state): State<AppState>,
    Json(req): Json<NudgeRequest>,
) -> Response {
    let Some(user_id) = req
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "user_id is required" })),
        )
            .into_response();
    };

    let Some(store) = state.store.as_ref() else {
        tracing::error!(target: "coach::nudge", "vault store not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "vault store unavailable" })),
        )
            .into_response();
    };

    match store.fetch_active_vaults(user_id).await {
        Ok(vaults) => {
            Json(serde_json::json!({ "nudge": nudge_from_vaults(&vaults) })).into_response()
        }
        Err(e) => {
            tracing::error!(target: "coach::nudge", error = %e, "vault fetch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "vault store unavailable" })),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/coach/nudge — same threshold rules over caller-supplied fields.
pub(crate) async fn coach_nudge(Json(req): Json<CoachNudgeRequest>) -> Response {
    let facts = NudgeFacts {
        vault_type: VaultKind::from_label(req.vault_type.as_deref().unwrap_or("")),
        streak: req.streak,
        progress: req.progress,
    };
    Json(serde_json::json!({ "message": nudge_message(facts) })).into_response()
}
