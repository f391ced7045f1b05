//! Nudge generator: ordered threshold rules over a member's vaults (or
//! caller-supplied fields) producing one short motivational message.

use crate::vault::{Vault, VaultKind};

/// Returned when the member has no active vaults at all.
pub const NO_VAULTS_MESSAGE: &str =
    "You haven't set up a vault yet — create your first one and give your savings a home! 🌱";

/// Streak length that counts as a habit worth celebrating.
const STREAK_THRESHOLD: u32 = 5;

/// The fields the threshold rules actually look at. Built either from a
/// selected vault record or directly from caller-supplied values.
#[derive(Debug, Clone, Copy)]
pub struct NudgeFacts {
    pub vault_type: VaultKind,
    pub streak: u32,
    pub progress: i64,
}

impl From<&Vault> for NudgeFacts {
    fn from(v: &Vault) -> Self {
        NudgeFacts {
            vault_type: v.vault_type,
            streak: v.streak,
            progress: v.progress_pct(),
        }
    }
}

/// Picks the vault the nudge should talk about. Priority: an active streak,
/// then a Credit Card payoff goal, then whatever the store returned first.
/// The final fallback depends on store return order, which is not guaranteed
/// stable across calls.
pub fn select_vault(vaults: &[Vault]) -> Option<&Vault> {
    let active: Vec<&Vault> = vaults.iter().filter(|v| !v.archived).collect();
    if active.is_empty() {
        return None;
    }
    active
        .iter()
        .find(|v| v.streak >= STREAK_THRESHOLD)
        .or_else(|| active.iter().find(|v| v.vault_type == VaultKind::CreditCard))
        .copied()
        .or_else(|| active.first().copied())
}

/// Store-backed path: select a vault and run the threshold rules.
pub fn nudge_from_vaults(vaults: &[Vault]) -> String {
    match select_vault(vaults) {
        Some(vault) => nudge_message(NudgeFacts::from(vault)),
        None => NO_VAULTS_MESSAGE.to_string(),
    }
}

/// Ordered threshold rules, first match wins. Identical for both input modes.
pub fn nudge_message(facts: NudgeFacts) -> String {
    let label = facts.vault_type.label();
    let emoji = facts.vault_type.emoji();

    if facts.progress < 15 {
        return format!(
            "Your {label} vault is just getting started {emoji} — even a small deposit today gets the ball rolling!"
        );
    }
    if facts.streak >= STREAK_THRESHOLD {
        return format!(
            "{} days in a row! {emoji} Your {label} streak is turning saving into a habit — keep it alive today.",
            facts.streak
        );
    }
    if facts.progress >= 90 {
        return format!(
            "So close! You're only {}% away from your {label} goal {emoji} — one more push.",
            100 - facts.progress
        );
    }
    if facts.vault_type == VaultKind::CreditCard && facts.progress >= 50 {
        return format!(
            "Over halfway there {emoji} — your Credit Card payoff is {}% funded. Keep chipping away!",
            facts.progress
        );
    }
    format!("Your {label} vault is growing steadily {emoji} — keep the deposits coming!")
}
