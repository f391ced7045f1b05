//! Coach personality selection. The caller may request a mode, but keyword
//! inference on the question takes precedence so a member typing "I'm
//! overwhelmed" always gets the calm coach, whatever the UI toggle says.

use serde::{Deserialize, Serialize};

/// Tone labels the composer can speak in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoachMode {
    #[serde(rename = "Warm & Friendly")]
    WarmFriendly,
    #[serde(rename = "Energetic & Motivating")]
    Energetic,
    #[serde(rename = "Professional & Direct")]
    Professional,
    #[serde(rename = "Soothing & Calm")]
    Soothing,
    #[serde(rename = "Expert Financial Advisor")]
    Expert,
}

/// Stress and anxiety signals route to the calm coach first, before anything else.
const SOOTHING_KEYWORDS: &[&str] = &[
    "stress", "stressed", "overwhelm", "overwhelmed", "anxious", "anxiety", "worried", "panic",
];

const ENERGETIC_KEYWORDS: &[&str] = &[
    "hype", "hyped", "motivate", "motivated", "motivation", "boost", "pump", "fired up",
];

const PROFESSIONAL_KEYWORDS: &[&str] = &[
    "discipline", "disciplined", "accountability", "accountable", "strict", "hold me to",
];

const EXPERT_KEYWORDS: &[&str] = &[
    "strategy", "strategic", "optimize", "optimise", "plan", "allocate", "portfolio",
];

impl CoachMode {
    pub fn label(&self) -> &'static str {
        match self {
            CoachMode::WarmFriendly => "Warm & Friendly",
            CoachMode::Energetic => "Energetic & Motivating",
            CoachMode::Professional => "Professional & Direct",
            CoachMode::Soothing => "Soothing & Calm",
            CoachMode::Expert => "Expert Financial Advisor",
        }
    }

    /// Tone clause interpolated into the synthesized system instruction.
    pub fn tone_clause(&self) -> &'static str {
        match self {
            CoachMode::WarmFriendly => {
                "Be warm, friendly, and encouraging. Celebrate small wins and never scold."
            }
            CoachMode::Energetic => {
                "Be energetic and motivating. Short punchy sentences, big enthusiasm, rally the member to act today."
            }
            CoachMode::Professional => {
                "Be professional and direct. No filler, no emoji unless the member uses them first. Give clear next steps and hold the member accountable."
            }
            CoachMode::Soothing => {
                "Be soothing and calm. Acknowledge the member's feelings before any advice, slow the pace down, and keep suggestions small and manageable."
            }
            CoachMode::Expert => {
                "Respond as an expert financial advisor. Reference concrete numbers from the member's vaults when available and explain the reasoning behind each recommendation."
            }
        }
    }
}

/// Scans the lowercased question against the keyword sets in fixed priority
/// order. First matching set wins; no match means no inference.
pub fn infer_mode(question: &str) -> Option<CoachMode> {
    let lower = question.to_lowercase();
    let tables: [(&[&str], CoachMode); 4] = [
        (SOOTHING_KEYWORDS, CoachMode::Soothing),
        (ENERGETIC_KEYWORDS, CoachMode::Energetic),
        (PROFESSIONAL_KEYWORDS, CoachMode::Professional),
        (EXPERT_KEYWORDS, CoachMode::Expert),
    ];
    for (keywords, mode) in tables {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(mode);
        }
    }
    None
}

/// Inference beats the requested mode; the requested mode beats the default.
pub fn resolve_mode(requested: Option<CoachMode>, question: &str) -> CoachMode {
    infer_mode(question)
        .or(requested)
        .unwrap_or(CoachMode::WarmFriendly)
}
