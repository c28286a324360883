//! Fact extraction from backstory text.
//!
//! Two passes. A rule pass catches explicit markers (death phrases,
//! imprisonment, named factions, chapter references) with word-boundary
//! matching; a model pass through the router catches implicit claims.
//! Losing the model pass to router exhaustion degrades the extraction to
//! the rule claims alone, it never fails the request.

use super::claim::{Claim, ClaimCategory, Polarity, TemporalAnchor};
use super::exclusion::{contains_word, find_word, ExclusionTables};
use super::router::{ModelRouter, Prompt, RouterError};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Maximum tokens for the extraction response.
const EXTRACT_MAX_TOKENS: usize = 1024;

const DEATH_MARKERS: [&str; 7] = [
    "died",
    "is dead",
    "was dead",
    "passed away",
    "was killed",
    "deceased",
    "perished",
];

const ALIVE_MARKERS: [&str; 3] = ["still alive", "alive and well", "survived"];

const PRISON_MARKERS: [&str; 5] = [
    "imprisoned",
    "in prison",
    "jailed",
    "behind bars",
    "incarcerated",
];

/// Outcome of extraction: the merged claims plus whether the model pass
/// was lost to router exhaustion.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub claims: Vec<Claim>,
    pub degraded: bool,
    /// Backend that served the model pass, when it ran.
    pub served_by: Option<String>,
}

/// Turns a free-text backstory into structured claims.
pub struct FactExtractor {
    router: Arc<ModelRouter>,
    tables: Arc<ExclusionTables>,
}

/// Response format we expect from the model pass.
#[derive(Debug, Deserialize)]
struct ClaimsResponse {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    #[serde(default)]
    category: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    polarity: Option<String>,
    #[serde(default)]
    anchor: Option<String>,
}

impl FactExtractor {
    pub fn new(router: Arc<ModelRouter>, tables: Arc<ExclusionTables>) -> Self {
        Self { router, tables }
    }

    /// Extract claims from a backstory. Never fails; the worst outcome is
    /// a degraded rule-pass-only extraction.
    pub async fn extract(
        &self,
        backstory: &str,
        character: &str,
        caption: Option<&str>,
    ) -> Extraction {
        let rule_claims = self.rule_claims(backstory);
        let prompt = build_prompt(backstory, character, caption);

        match self.router.call_json::<ClaimsResponse>(&prompt).await {
            Ok(routed) => {
                let model_claims: Vec<Claim> = routed
                    .value
                    .claims
                    .into_iter()
                    .filter_map(raw_to_claim)
                    .collect();
                Extraction {
                    claims: merge_claims(rule_claims, model_claims),
                    degraded: false,
                    served_by: Some(routed.served_by),
                }
            }
            Err(err) => {
                log_degraded(&err);
                Extraction {
                    claims: rule_claims,
                    degraded: true,
                    served_by: None,
                }
            }
        }
    }

    /// Word-boundary matching for explicit markers.
    fn rule_claims(&self, backstory: &str) -> Vec<Claim> {
        let text = backstory.to_lowercase();
        let anchor = chapter_anchor(&text);
        let mut claims = Vec::new();

        for marker in DEATH_MARKERS {
            if let Some(at) = find_word(&text, marker) {
                claims.push(with_polarity(
                    Claim::new(ClaimCategory::Vital, "dead"),
                    negated_before(&text, at),
                ));
                break;
            }
        }

        for marker in ALIVE_MARKERS {
            if let Some(at) = find_word(&text, marker) {
                claims.push(with_polarity(
                    Claim::new(ClaimCategory::Vital, "alive"),
                    negated_before(&text, at),
                ));
                break;
            }
        }

        for marker in PRISON_MARKERS {
            if let Some(at) = find_word(&text, marker) {
                claims.push(with_polarity(
                    Claim::new(ClaimCategory::Location, "prison"),
                    negated_before(&text, at),
                ));
                break;
            }
        }

        let mut factions: Vec<String> = self
            .tables
            .known_factions()
            .map(|f| f.to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        factions.sort();
        for faction in factions {
            if let Some(at) = find_word(&text, &faction) {
                claims.push(with_polarity(
                    Claim::new(ClaimCategory::Allegiance, faction),
                    negated_before(&text, at),
                ));
            }
        }

        if let Some(anchor) = anchor {
            for claim in &mut claims {
                claim.temporal_anchor = Some(anchor.clone());
            }
        }
        claims
    }
}

fn with_polarity(claim: Claim, negated: bool) -> Claim {
    if negated {
        claim.negated()
    } else {
        claim
    }
}

/// A marker is negated when "never" or "not" appears shortly before it.
fn negated_before(text: &str, marker_at: usize) -> bool {
    let window_start = marker_at.saturating_sub(24);
    // Back off to a char boundary.
    let mut start = window_start;
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    let window = &text[start..marker_at];
    contains_word(window, "never") || contains_word(window, "not")
}

/// Anchor from the first explicit chapter reference, when present.
fn chapter_anchor(text: &str) -> Option<TemporalAnchor> {
    let at = find_word(text, "chapter")?;
    let rest = &text[at + "chapter".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    Some(TemporalAnchor::Marker(format!("chapter {digits}")))
}

fn build_prompt(backstory: &str, character: &str, caption: Option<&str>) -> Prompt {
    let caption = caption.unwrap_or("none");
    let user = format!(
        r#"You are a fact extractor for narrative consistency checking.

## Character
{character}

## Caption
{caption}

## Backstory
"{backstory}"

## Instructions
Break the backstory into atomic factual claims about the character. Classify each claim into exactly one category:
- "location": where the character is or was
- "vital": whether the character is alive or dead
- "allegiance": which faction or cause the character serves
- "other": anything else

Respond with ONLY a JSON object (no markdown, no prose outside the JSON):
{{
  "claims": [
    {{"category": "location", "value": "Paris", "polarity": "asserted", "anchor": "chapter 30"}}
  ]
}}

"polarity" is "asserted" or "negated". "anchor" is an optional chapter or time marker; omit it when the claim has none. If there are no claims, return {{"claims": []}}."#
    );

    Prompt::new(user).with_max_tokens(EXTRACT_MAX_TOKENS)
}

fn raw_to_claim(raw: RawClaim) -> Option<Claim> {
    let value = raw.value.trim().to_string();
    if value.is_empty() {
        return None;
    }

    let mut claim = Claim::new(parse_category(&raw.category), value);
    if matches!(raw.polarity.as_deref(), Some("negated")) {
        claim = claim.negated();
    }
    if let Some(anchor) = raw.anchor {
        let anchor = anchor.trim().to_string();
        if !anchor.is_empty() {
            claim = claim.with_anchor(TemporalAnchor::Marker(anchor));
        }
    }
    Some(claim)
}

fn parse_category(category: &str) -> ClaimCategory {
    let c = category.trim().to_lowercase();
    if c.contains("location") || c.contains("place") {
        ClaimCategory::Location
    } else if c.contains("vital") || c.contains("life") || c.contains("death") {
        ClaimCategory::Vital
    } else if c.contains("allegiance") || c.contains("alliance") || c.contains("faction") {
        ClaimCategory::Allegiance
    } else {
        ClaimCategory::Other
    }
}

/// Rule claims win on duplicates; dedup key is category + normalized value
/// + polarity.
fn merge_claims(rule_claims: Vec<Claim>, model_claims: Vec<Claim>) -> Vec<Claim> {
    let mut seen: HashSet<(ClaimCategory, String, bool)> = HashSet::new();
    let mut merged = Vec::new();
    for claim in rule_claims.into_iter().chain(model_claims) {
        let key = (
            claim.category,
            claim.value.trim().to_lowercase(),
            claim.polarity == Polarity::Negated,
        );
        if seen.insert(key) {
            merged.push(claim);
        }
    }
    merged
}

fn log_degraded(err: &RouterError) {
    tracing::warn!(error = %err, "claim extraction degraded to rule pass");
}
