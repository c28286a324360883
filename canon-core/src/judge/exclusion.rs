//! Closed mutual-exclusion tables per state category.
//!
//! A contradiction requires an explicit opposing assertion; these tables
//! define what "opposing" means. Values outside a table never conflict,
//! so "Paris" vs "unknown" can never flip a verdict.

use super::claim::ClaimCategory;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Faction pairs historically opposed. The table is configurable per
    /// checker; these defaults cover the Restoration-era novels the batch
    /// corpus ships with.
    static ref DEFAULT_OPPOSED_FACTIONS: Vec<(String, String)> = [
        ("royalist", "bonapartist"),
        ("bourbon", "bonapartist"),
        ("crown", "republican"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
}

/// Location values that name no actual place and therefore exclude nothing.
const LOCATION_PLACEHOLDERS: [&str; 6] = [
    "unknown",
    "somewhere",
    "abroad",
    "elsewhere",
    "parts unknown",
    "nowhere",
];

/// Vital states recognized by the comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalState {
    Alive,
    Dead,
}

impl VitalState {
    /// Map a free-text state value onto the closed vital pair, if possible.
    pub fn parse(value: &str) -> Option<Self> {
        let v = normalize(value);
        if ["dead", "died", "deceased", "killed", "perished", "death"]
            .iter()
            .any(|m| contains_word(&v, m))
        {
            return Some(VitalState::Dead);
        }
        if ["alive", "living", "lives", "survived", "survives"]
            .iter()
            .any(|m| contains_word(&v, m))
        {
            return Some(VitalState::Alive);
        }
        None
    }

    pub fn opposite(&self) -> Self {
        match self {
            VitalState::Alive => VitalState::Dead,
            VitalState::Dead => VitalState::Alive,
        }
    }
}

/// The per-category exclusion tables.
#[derive(Debug, Clone)]
pub struct ExclusionTables {
    opposed_factions: Vec<(String, String)>,
}

impl Default for ExclusionTables {
    fn default() -> Self {
        Self {
            opposed_factions: DEFAULT_OPPOSED_FACTIONS.clone(),
        }
    }
}

impl ExclusionTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the opposed-faction table entirely.
    pub fn with_opposed_factions(factions: Vec<(String, String)>) -> Self {
        Self {
            opposed_factions: factions
                .into_iter()
                .map(|(a, b)| (normalize(&a), normalize(&b)))
                .collect(),
        }
    }

    /// Register an additional opposed pair.
    pub fn add_opposed(&mut self, a: impl AsRef<str>, b: impl AsRef<str>) {
        self.opposed_factions
            .push((normalize(a.as_ref()), normalize(b.as_ref())));
    }

    /// Faction names known to the table, for marker-based extraction.
    pub fn known_factions(&self) -> impl Iterator<Item = &str> {
        self.opposed_factions
            .iter()
            .flat_map(|(a, b)| [a.as_str(), b.as_str()])
    }

    /// Whether two values for a category are mutually exclusive.
    ///
    /// Absence, vagueness, and anything outside the closed tables is never
    /// exclusive.
    pub fn excludes(&self, category: ClaimCategory, a: &str, b: &str) -> bool {
        match category {
            ClaimCategory::Vital => match (VitalState::parse(a), VitalState::parse(b)) {
                (Some(x), Some(y)) => x != y,
                _ => false,
            },
            ClaimCategory::Location => locations_exclusive(a, b),
            ClaimCategory::Allegiance => self.factions_opposed(a, b),
            ClaimCategory::Other => false,
        }
    }

    fn factions_opposed(&self, a: &str, b: &str) -> bool {
        let a = normalize(a);
        let b = normalize(b);
        if a.is_empty() || b.is_empty() || a == b {
            return false;
        }
        self.opposed_factions.iter().any(|(x, y)| {
            (contains_word(&a, x) && contains_word(&b, y))
                || (contains_word(&a, y) && contains_word(&b, x))
        })
    }
}

/// Two locations are exclusive only when both name distinct places and
/// neither contains the other ("Paris" vs "the prison of Paris" overlap).
fn locations_exclusive(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() || a == b {
        return false;
    }
    if is_placeholder(&a) || is_placeholder(&b) {
        return false;
    }
    !(a.contains(&b) || b.contains(&a))
}

fn is_placeholder(value: &str) -> bool {
    LOCATION_PLACEHOLDERS.iter().any(|p| *p == value)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Find `word` in `text` at word boundaries, returning its byte offset.
///
/// A word boundary is the start/end of string or a non-alphanumeric byte;
/// multi-word phrases match as phrases.
pub(crate) fn find_word(text: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }

    let text_bytes = text.as_bytes();
    let word_bytes = word.as_bytes();
    let text_len = text_bytes.len();
    let word_len = word_bytes.len();

    if word_len > text_len {
        return None;
    }

    let mut i = 0;
    while i + word_len <= text_len {
        if &text_bytes[i..i + word_len] == word_bytes {
            let left_ok = i == 0 || !text_bytes[i - 1].is_ascii_alphanumeric();
            let right_ok =
                i + word_len == text_len || !text_bytes[i + word_len].is_ascii_alphanumeric();
            if left_ok && right_ok {
                return Some(i);
            }
        }
        i += 1;
    }

    None
}

/// Check if `text` contains `word` at word boundaries.
pub(crate) fn contains_word(text: &str, word: &str) -> bool {
    find_word(text, word).is_some()
}
