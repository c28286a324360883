//! Verdicts and the per-category consistency state model.
//!
//! Every category starts in `Consistent` and only an explicit opposing
//! assertion, backed by cited evidence, can move it. The "benefit of the
//! doubt" policy is this initial state, not an early-return path.

use super::claim::ClaimCategory;
use serde::{Deserialize, Serialize};

/// Per-category evaluation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryState {
    Consistent,
    Contradicted,
}

impl CategoryState {
    pub fn is_contradicted(&self) -> bool {
        matches!(self, CategoryState::Contradicted)
    }
}

impl Default for CategoryState {
    fn default() -> Self {
        CategoryState::Consistent
    }
}

/// A reported conflict between a claim and cited evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub category: ClaimCategory,
    /// The claim value the evidence rules out.
    pub claim_value: String,
    /// Chunk ids of the evidence that triggered the flip. Never empty.
    pub cited_chunks: Vec<u64>,
    pub explanation: String,
}

/// The final outcome of one backstory-check request.
///
/// Serializes to `score` (0/1), `contradictions`, and `degraded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// 1 = consistent (the default), 0 = contradiction found.
    pub score: u8,
    pub contradictions: Vec<Contradiction>,
    /// True when any category fell back to its default because the model
    /// router was exhausted.
    pub degraded: bool,
}

impl Verdict {
    /// The default verdict: consistent, nothing cited, full confidence.
    pub fn consistent() -> Self {
        Self {
            score: 1,
            contradictions: Vec::new(),
            degraded: false,
        }
    }

    /// Assemble a verdict; the score falls out of the contradiction list.
    pub fn from_contradictions(contradictions: Vec<Contradiction>, degraded: bool) -> Self {
        let score = if contradictions.is_empty() { 1 } else { 0 };
        Self {
            score,
            contradictions,
            degraded,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.score == 1
    }
}
