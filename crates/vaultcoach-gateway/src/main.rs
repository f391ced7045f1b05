//! vaultcoach gateway — savings-coach relay at COACH_BIND (default 127.0.0.1:8080).
//! Ask endpoints compose a persona-aware prompt and relay it to the completion
//! API (whole, chunked text, or SSE); nudge endpoints derive motivational
//! messages from vault records. API keys live in the backend only.

mod ask;
mod config;
mod nudge;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vaultcoach_core::{CompletionBackend, CompletionRelay, RestVaultStore, SessionStore, VaultStore};

use crate::config::GatewayConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    relay: Arc<dyn CompletionBackend>,
    sessions: Arc<SessionStore>,
    /// Absent when COACH_STORE_URL / COACH_STORE_KEY are unset; store-backed
    /// endpoints answer 500 rather than panicking.
    store: Option<Arc<dyn VaultStore>>,
}

impl AppState {
    fn new(relay: Arc<dyn CompletionBackend>, store: Option<Arc<dyn VaultStore>>) -> Self {
        Self {
            relay,
            sessions: Arc::new(SessionStore::new()),
            store,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env first; all API keys stay backend-side.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[vaultcoach-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = GatewayConfig::from_env();
    let store = RestVaultStore::from_env().map(|s| Arc::new(s) as Arc<dyn VaultStore>);
    if store.is_none() {
        tracing::warn!("COACH_STORE_URL/COACH_STORE_KEY unset; store-backed nudges disabled");
    }
    let state = AppState::new(Arc::new(CompletionRelay::new()), store);

    let app = build_router(state).layer(cfg.cors_layer());

    tracing::info!(addr = %cfg.bind_addr, "vaultcoach gateway listening");
    let listener = match tokio::net::TcpListener::bind(&cfg.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %cfg.bind_addr, error = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server exited");
        std::process::exit(1);
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ask", post(ask::ask))
        .route("/api/v1/ask/stream", post(ask::ask_stream))
        .route("/api/v1/ask/events", post(ask::ask_events))
        .route("/api/v1/nudge", post(nudge::nudge))
        .route("/api/v1/coach/nudge", post(nudge::coach_nudge))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;
    use vaultcoach_core::{ChatTurn, RelayError, RelayMode, StoreError, Vault, NO_VAULTS_MESSAGE};

    struct StaticStore(Vec<Vault>);

    #[async_trait]
    impl VaultStore for StaticStore {
        async fn fetch_active_vaults(&self, _user_id: &str) -> Result<Vec<Vault>, StoreError> {
            Ok(self.0.iter().filter(|v| !v.archived).cloned().collect())
        }
    }

    /// Backend whose stream dies partway through, the way a dropped upstream
    /// connection surfaces: some fragments, then one error frame.
    struct DroppingRelay;

    #[async_trait]
    impl CompletionBackend for DroppingRelay {
        async fn complete(
            &self,
            _messages: &[ChatTurn],
            _temperature: Option<f32>,
        ) -> Result<String, RelayError> {
            Ok("whole reply".to_string())
        }

        async fn stream(
            &self,
            _messages: &[ChatTurn],
            _temperature: Option<f32>,
        ) -> Result<mpsc::Receiver<Result<String, RelayError>>, RelayError> {
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                let _ = tx.send(Ok("partial ".to_string())).await;
                let _ = tx
                    .send(Err(RelayError::Api {
                        status: 502,
                        body: "upstream reset".to_string(),
                    }))
                    .await;
            });
            Ok(rx)
        }
    }

    fn router_with_relay(relay: Arc<dyn CompletionBackend>, vaults: Vec<Vault>) -> Router {
        let state = AppState::new(relay, Some(Arc::new(StaticStore(vaults))));
        build_router(state)
    }

    fn test_router(vaults: Vec<Vault>) -> Router {
        router_with_relay(
            Arc::new(CompletionRelay::with_mode(RelayMode::Mock)),
            vaults,
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = test_router(vec![])
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_question_is_400() {
        for body in [
            serde_json::json!({}),
            serde_json::json!({ "question": "   " }),
        ] {
            let response = test_router(vec![])
                .oneshot(post_json("/api/v1/ask", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = json_body(response).await;
            assert!(json["error"].is_string());
        }
    }

    #[tokio::test]
    async fn legacy_message_field_is_accepted() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/ask",
                serde_json::json!({ "message": "how are my savings?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["reply"].as_str().unwrap().contains("how are my savings?"));
    }

    #[tokio::test]
    async fn overwhelmed_question_reports_soothing_mode() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/ask",
                serde_json::json!({
                    "question": "I'm overwhelmed by my bills",
                    "mode": "Energetic & Motivating"
                }),
            ))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["finalMode"], "Soothing & Calm");
    }

    #[tokio::test]
    async fn stream_concatenation_matches_whole_reply() {
        let question = "should I automate deposits?";
        let router = test_router(vec![]);

        let whole = router
            .clone()
            .oneshot(post_json(
                "/api/v1/ask",
                serde_json::json!({ "question": question, "sessionId": "a" }),
            ))
            .await
            .unwrap();
        let reply = json_body(whole).await["reply"].as_str().unwrap().to_string();

        let streamed = router
            .oneshot(post_json(
                "/api/v1/ask/stream",
                serde_json::json!({ "question": question, "sessionId": "b" }),
            ))
            .await
            .unwrap();
        assert_eq!(streamed.status(), StatusCode::OK);
        assert_eq!(
            streamed.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let bytes = axum::body::to_bytes(streamed.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), reply);
    }

    #[tokio::test]
    async fn nudge_requires_user_id() {
        let response = test_router(vec![])
            .oneshot(post_json("/api/v1/nudge", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_vault_set_gets_no_vaults_message() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/nudge",
                serde_json::json!({ "user_id": "u1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["nudge"], NO_VAULTS_MESSAGE);
    }

    #[tokio::test]
    async fn store_backed_nudge_uses_vault_records() {
        let vaults = vec![Vault {
            vault_type: vaultcoach_core::VaultKind::Car,
            current_balance: 90.0,
            target_amount: 100.0,
            streak: 0,
            archived: false,
        }];
        let response = test_router(vaults)
            .oneshot(post_json(
                "/api/v1/nudge",
                serde_json::json!({ "user_id": "u1" }),
            ))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert!(json["nudge"].as_str().unwrap().contains("10% away"));
    }

    #[tokio::test]
    async fn explicit_fields_nudge_bypasses_store() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/coach/nudge",
                serde_json::json!({
                    "vault_type": "Credit Card",
                    "streak": 0,
                    "progress": 55
                }),
            ))
            .await
            .unwrap();
        let json = json_body(response).await;
        assert!(json["message"].as_str().unwrap().contains("halfway"));
    }

    #[tokio::test]
    async fn unknown_vault_type_degrades_to_default_emoji() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/coach/nudge",
                serde_json::json!({ "vault_type": "Yacht", "progress": 40 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["message"].as_str().unwrap().contains("✨"));
    }

    #[tokio::test]
    async fn sse_endpoint_frames_with_done_event() {
        let response = test_router(vec![])
            .oneshot(post_json(
                "/api/v1/ask/events",
                serde_json::json!({ "question": "quick tip?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: token"));
        assert!(text.contains("event: done"));
    }

    #[tokio::test]
    async fn mid_stream_failure_aborts_plain_body() {
        let response = router_with_relay(Arc::new(DroppingRelay), vec![])
            .oneshot(post_json(
                "/api/v1/ask/stream",
                serde_json::json!({ "question": "quick tip?" }),
            ))
            .await
            .unwrap();
        // Headers already went out; the failure surfaces as an aborted body,
        // not a termination marker.
        assert_eq!(response.status(), StatusCode::OK);
        let collected = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        assert!(collected.is_err());
    }

    #[tokio::test]
    async fn mid_stream_failure_emits_error_event() {
        let response = router_with_relay(Arc::new(DroppingRelay), vec![])
            .oneshot(post_json(
                "/api/v1/ask/events",
                serde_json::json!({ "question": "quick tip?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("event: token"));
        assert!(text.contains("event: error"));
        assert!(!text.contains("event: done"));
    }
}
