//! Structured claims extracted from a backstory.

use serde::{Deserialize, Serialize};

/// The state dimensions a claim can assert.
///
/// Only the first three participate in contradiction checks; `Other`
/// claims are kept for retrieval context and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    /// Where the character is or was.
    Location,
    /// Whether the character is alive or dead.
    Vital,
    /// Which faction or cause the character serves.
    Allegiance,
    /// Anything else.
    Other,
}

impl ClaimCategory {
    /// Categories that participate in contradiction checks.
    pub const CHECKABLE: [ClaimCategory; 3] = [
        ClaimCategory::Location,
        ClaimCategory::Vital,
        ClaimCategory::Allegiance,
    ];

    /// Display name for prompts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ClaimCategory::Location => "location",
            ClaimCategory::Vital => "life or death",
            ClaimCategory::Allegiance => "allegiance",
            ClaimCategory::Other => "other",
        }
    }

    pub fn is_checkable(&self) -> bool {
        !matches!(self, ClaimCategory::Other)
    }
}

/// Whether a claim asserts or denies its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Asserted,
    Negated,
}

/// Optional narrative-time anchor for a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalAnchor {
    /// The claim holds at or after the given chunk position; evidence at
    /// or before it is in the claim's valid window.
    Position(u64),
    /// A free-text marker ("chapter 12", "after the trial") that could not
    /// be mapped to a position. Judged against the whole timeline.
    Marker(String),
}

impl TemporalAnchor {
    /// Upper bound of evidence positions this anchor admits, if known.
    pub fn position(&self) -> Option<u64> {
        match self {
            TemporalAnchor::Position(p) => Some(*p),
            TemporalAnchor::Marker(_) => None,
        }
    }
}

/// A single categorized assertion extracted from a backstory.
///
/// Claims are ephemeral: they live for one judgment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub category: ClaimCategory,
    pub value: String,
    pub polarity: Polarity,
    pub temporal_anchor: Option<TemporalAnchor>,
}

impl Claim {
    /// Create an asserted, unanchored claim.
    pub fn new(category: ClaimCategory, value: impl Into<String>) -> Self {
        Self {
            category,
            value: value.into(),
            polarity: Polarity::Asserted,
            temporal_anchor: None,
        }
    }

    pub fn negated(mut self) -> Self {
        self.polarity = Polarity::Negated;
        self
    }

    pub fn with_anchor(mut self, anchor: TemporalAnchor) -> Self {
        self.temporal_anchor = Some(anchor);
        self
    }
}
