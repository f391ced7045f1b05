//! vaultcoach-core: savings-coach core library.
//!
//! Prompt composition (persona-aware system directives + short-term context),
//! nudge selection over vault records, the completion relay (mock or live
//! OpenRouter-compatible API, streaming and non-streaming), the read-only vault
//! store client, and the per-session conversation memory.

mod memory;
mod nudge;
mod persona;
mod prompt;
mod relay;
mod store;
mod vault;

pub use memory::{SessionContext, SessionStore, HISTORY_RETAIN_LIMIT, HISTORY_REPLAY_LIMIT};
pub use nudge::{nudge_from_vaults, nudge_message, select_vault, NudgeFacts, NO_VAULTS_MESSAGE};
pub use persona::{infer_mode, resolve_mode, CoachMode};
pub use prompt::{compose, ChatTurn, ComposeRequest, Role, vault_summary_context};
pub use relay::{CompletionBackend, CompletionRelay, RelayError, RelayMode, FALLBACK_REPLY};
pub use store::{RestVaultStore, StoreError, VaultStore};
pub use vault::{Vault, VaultKind};
