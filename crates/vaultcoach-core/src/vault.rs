//! Vault records: a member's named savings goal with balance, target, and streak.
//! Fetched read-only from the external row store; never mutated here.

use serde::{Deserialize, Serialize};

/// Closed set of vault labels. Labels the store returns that we do not know
/// degrade to [`VaultKind::Unknown`] — default emoji, generic wording, no error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultKind {
    Rent,
    #[serde(rename = "Credit Card")]
    CreditCard,
    Emergency,
    Bills,
    Car,
    Custom,
    General,
    #[serde(other)]
    Unknown,
}

impl VaultKind {
    /// Parses a caller-supplied label (explicit-fields nudge path).
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Rent" => VaultKind::Rent,
            "Credit Card" => VaultKind::CreditCard,
            "Emergency" => VaultKind::Emergency,
            "Bills" => VaultKind::Bills,
            "Car" => VaultKind::Car,
            "Custom" => VaultKind::Custom,
            "General" => VaultKind::General,
            _ => VaultKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VaultKind::Rent => "Rent",
            VaultKind::CreditCard => "Credit Card",
            VaultKind::Emergency => "Emergency",
            VaultKind::Bills => "Bills",
            VaultKind::Car => "Car",
            VaultKind::Custom => "Custom",
            VaultKind::General => "General",
            VaultKind::Unknown => "savings",
        }
    }

    /// Fixed emoji mapping; unknown kinds get the generic sparkle.
    pub fn emoji(&self) -> &'static str {
        match self {
            VaultKind::Rent => "🏠",
            VaultKind::CreditCard => "💳",
            VaultKind::Emergency => "🛟",
            VaultKind::Bills => "🧾",
            VaultKind::Car => "🚗",
            VaultKind::Custom => "🎯",
            VaultKind::General => "💰",
            VaultKind::Unknown => "✨",
        }
    }
}

/// One savings goal as returned by the row store.
#[derive(Debug, Clone, Deserialize)]
pub struct Vault {
    pub vault_type: VaultKind,
    pub current_balance: f64,
    pub target_amount: f64,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub archived: bool,
}

impl Vault {
    /// Funding progress as a rounded integer percent.
    /// A non-positive target yields 0 rather than dividing; the store schema
    /// promises `target_amount > 0` but we do not trust it with a division.
    pub fn progress_pct(&self) -> i64 {
        if self.target_amount <= 0.0 {
            return 0;
        }
        (self.current_balance / self.target_amount * 100.0).round() as i64
    }
}
