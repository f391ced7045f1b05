//! Prompt composer: turns a question plus optional context into the ordered
//! role-tagged message list sent to the completion API. Pure transformation —
//! validation of the question happens at the gateway.

use serde::{Deserialize, Serialize};

use crate::memory::HISTORY_REPLAY_LIMIT;
use crate::persona::{resolve_mode, CoachMode};
use crate::vault::Vault;

/// Message roles understood by the chat-completion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation, wire-shaped for the completion API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        ChatTurn { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatTurn { role: Role::Assistant, content: content.into() }
    }
}

const BASE_DIRECTIVE: &str = "You are Penny, the in-app savings coach. \
Members ask you about their savings vaults, budgeting, and money habits. \
Keep replies short and concrete, speak to the member directly, and never invent \
balances or transactions you were not given.";

/// Label prefixed to the memory note so the model treats it as prior context,
/// not as part of the current question.
const MEMORY_LABEL: &str = "Context from earlier conversations:";

/// Inputs for one composition. History is an immutable snapshot owned by the
/// caller's session store; compose never mutates shared state.
#[derive(Debug, Default)]
pub struct ComposeRequest<'a> {
    pub question: &'a str,
    pub requested_mode: Option<CoachMode>,
    /// Caller-supplied system prompt; used verbatim as the sole base directive.
    pub system_prompt: Option<&'a str>,
    /// Free-text memory note carried across requests by the client.
    pub memory: Option<&'a str>,
    /// Prior turns, oldest first. Only the most recent few are replayed.
    pub history: &'a [ChatTurn],
    /// Active vault type or a multi-line vault-status summary.
    pub vault_context: Option<&'a str>,
}

/// Builds the message list and reports the mode that ended up in effect.
///
/// Fixed ordering: base system directive, optional memory note (system),
/// replayed history, then the current question last.
pub fn compose(req: &ComposeRequest<'_>) -> (Vec<ChatTurn>, CoachMode) {
    let mode = resolve_mode(req.requested_mode, req.question);

    let base = match req.system_prompt.map(str::trim).filter(|s| !s.is_empty()) {
        Some(custom) => custom.to_string(),
        None => synthesize_directive(mode, req.vault_context),
    };

    let mut turns = Vec::with_capacity(3 + HISTORY_REPLAY_LIMIT);
    turns.push(ChatTurn::system(base));

    if let Some(memory) = req.memory.map(str::trim).filter(|m| !m.is_empty()) {
        turns.push(ChatTurn::system(format!("{} {}", MEMORY_LABEL, memory)));
    }

    let replay_from = req.history.len().saturating_sub(HISTORY_REPLAY_LIMIT);
    turns.extend(req.history[replay_from..].iter().cloned());

    turns.push(ChatTurn::user(req.question.trim()));
    (turns, mode)
}

fn synthesize_directive(mode: CoachMode, vault_context: Option<&str>) -> String {
    let mut directive = String::from(BASE_DIRECTIVE);
    if let Some(ctx) = vault_context.map(str::trim).filter(|c| !c.is_empty()) {
        directive.push_str("\n\n");
        directive.push_str(ctx);
    }
    directive.push_str("\n\nTone: ");
    directive.push_str(mode.tone_clause());
    directive
}

/// Multi-line vault-status summary for the system directive, one line per
/// active vault. Archived vaults are left out.
pub fn vault_summary_context(vaults: &[Vault]) -> Option<String> {
    let lines: Vec<String> = vaults
        .iter()
        .filter(|v| !v.archived)
        .map(|v| {
            format!(
                "- {} vault: {}% funded, {}-day streak",
                v.vault_type.label(),
                v.progress_pct(),
                v.streak
            )
        })
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("The member's current vaults:\n{}", lines.join("\n")))
}
