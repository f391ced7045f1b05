//! Gateway configuration from environment variables (loaded from `.env` at
//! startup). Everything has a local-dev default except the store credentials.

use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Dev-client origins allowed when COACH_ALLOWED_ORIGINS is unset.
const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("COACH_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let allowed_origins = std::env::var("COACH_ALLOWED_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_else(|_| DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect());
        Self { bind_addr, allowed_origins }
    }

    /// Fixed allow-list CORS policy: origins outside the list are rejected at
    /// the transport layer.
    pub fn cors_layer(&self) -> CorsLayer {
        let allowed = self.allowed_origins.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                let s = origin.to_str().unwrap_or("");
                allowed.iter().any(|a| a == s)
            }))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
