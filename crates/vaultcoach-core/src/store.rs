//! Read-only client for the external vault row store (PostgREST-style API).
//! The gateway only ever filters by member id and `archived = false`.

use async_trait::async_trait;

use crate::vault::Vault;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("vault store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vault store error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Source of a member's vault records.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Non-archived vaults for one member, in the store's return order.
    async fn fetch_active_vaults(&self, user_id: &str) -> Result<Vec<Vault>, StoreError>;
}

/// PostgREST-backed store: `GET {base}/rest/v1/vaults?user_id=eq.{id}&archived=eq.false`.
pub struct RestVaultStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestVaultStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            service_key: service_key.into(),
        }
    }

    /// Builds a store from `COACH_STORE_URL` / `COACH_STORE_KEY`; `None` when
    /// either is unset, leaving store-backed nudges unconfigured.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("COACH_STORE_URL").ok()?;
        let service_key = std::env::var("COACH_STORE_KEY").ok()?;
        if base_url.trim().is_empty() || service_key.trim().is_empty() {
            return None;
        }
        Some(Self::new(base_url.trim().to_string(), service_key.trim().to_string()))
    }
}

#[async_trait]
impl VaultStore for RestVaultStore {
    async fn fetch_active_vaults(&self, user_id: &str) -> Result<Vec<Vault>, StoreError> {
        let url = format!("{}/rest/v1/vaults", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("archived", "eq.false".to_string()),
                ("select", "*".to_string()),
            ])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(target: "coach::store", status = %status, "vault store error: {}", body);
            return Err(StoreError::Api { status: status.as_u16(), body });
        }

        let vaults: Vec<Vault> = response.json().await?;
        tracing::debug!(target: "coach::store", count = vaults.len(), "vaults fetched");
        Ok(vaults)
    }
}
