use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::base::prompts;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Transcript.

/// The author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry in the triage transcript.
///
/// Turns are append-only: once pushed onto a session's transcript they are
/// never mutated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

// Severity.

/// Urgency classification for a reported symptom description.
///
/// Variants are declared in urgency order, so the derived `Ord` gives
/// `Mild < Moderate < Severe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    Mild,
    Moderate,
    Severe,
}

impl SeverityTier {
    /// Display label used by the severity badge.
    pub fn label(&self) -> &'static str {
        match self {
            SeverityTier::Mild => "Mild",
            SeverityTier::Moderate => "Moderate",
            SeverityTier::Severe => "Severe",
        }
    }

    /// Urgency on a 0-100 scale, used for the progress meter.
    pub fn urgency(&self) -> u8 {
        match self {
            SeverityTier::Mild => 25,
            SeverityTier::Moderate => 60,
            SeverityTier::Severe => 95,
        }
    }

    /// The canned reply associated with this tier.
    pub fn canned_reply(&self) -> &'static str {
        match self {
            SeverityTier::Mild => prompts::MILD_REPLY,
            SeverityTier::Moderate => prompts::MODERATE_REPLY,
            SeverityTier::Severe => prompts::SEVERE_REPLY,
        }
    }

    /// Parse a model-provided severity label (case-insensitive).
    ///
    /// Models are asked for one of four labels; `Critical` folds into `Severe`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "mild" => Some(SeverityTier::Mild),
            "moderate" => Some(SeverityTier::Moderate),
            "severe" | "critical" => Some(SeverityTier::Severe),
            _ => None,
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// Assessment.

/// Extra structured output produced by model-backed classifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentDetails {
    pub summary: String,
    pub advice: String,
    pub red_flags: Vec<String>,
    pub differential: Vec<String>,
    pub rationale: String,
}

/// The result of classifying one user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub tier: SeverityTier,
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AssessmentDetails>,
}

impl Assessment {
    /// An assessment carrying the tier's canned reply.
    pub fn canned(tier: SeverityTier) -> Self {
        Self {
            tier,
            reply: tier.canned_reply().to_string(),
            details: None,
        }
    }
}

// Patient context.

/// Optional patient facts forwarded to model-backed classifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientContext {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

// Tests.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order_matches_urgency() {
        assert!(SeverityTier::Mild < SeverityTier::Moderate);
        assert!(SeverityTier::Moderate < SeverityTier::Severe);

        assert!(SeverityTier::Mild.urgency() < SeverityTier::Moderate.urgency());
        assert!(SeverityTier::Moderate.urgency() < SeverityTier::Severe.urgency());
        assert_eq!(SeverityTier::Severe.urgency(), 95);
    }

    #[test]
    fn test_from_label() {
        assert_eq!(SeverityTier::from_label("Mild"), Some(SeverityTier::Mild));
        assert_eq!(SeverityTier::from_label(" MODERATE "), Some(SeverityTier::Moderate));
        assert_eq!(SeverityTier::from_label("Critical"), Some(SeverityTier::Severe));
        assert_eq!(SeverityTier::from_label("urgent"), None);
    }

    #[test]
    fn test_canned_assessment() {
        let assessment = Assessment::canned(SeverityTier::Severe);

        assert_eq!(assessment.tier, SeverityTier::Severe);
        assert!(assessment.reply.contains("emergency facility"));
        assert!(assessment.details.is_none());
    }

    #[test]
    fn test_turn_serializes_speaker_lowercase() {
        let turn = Turn::user("headache");
        let json = serde_json::to_value(&turn).unwrap();

        assert_eq!(json["speaker"], "user");
        assert_eq!(json["text"], "headache");
    }
}
