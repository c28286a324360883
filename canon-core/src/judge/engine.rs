//! The logic judge: three-tier mutually-exclusive-state comparison.
//!
//! Each checkable category (location, vital, allegiance) is evaluated
//! independently from the default `Consistent` state. The judge walks a
//! claim's evidence in chronological order, probes each chunk for the
//! state it asserts (one schema-constrained router call per chunk), keeps
//! the most recent assertion inside the claim's window, and flips the
//! category only when that assertion is mutually exclusive with the claim
//! under the closed tables. Infrastructure failure can never flip a
//! verdict: an exhausted router degrades the category to its default.

use super::claim::{Claim, ClaimCategory, Polarity};
use super::exclusion::{contains_word, ExclusionTables, VitalState};
use super::retriever::Evidence;
use super::router::{ModelRouter, Prompt, Routed, RouterError};
use super::verdict::{Contradiction, Verdict};
use crate::store::Chunk;
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;

const PROBE_MAX_TOKENS: usize = 256;
const EXPLAIN_MAX_TOKENS: usize = 300;

/// Judge configuration.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Evidence chunks that must assert the opposing state before a
    /// category flips to contradicted.
    pub min_corroboration: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            min_corroboration: 1,
        }
    }
}

/// Response format we expect from a state probe.
#[derive(Debug, Deserialize)]
struct ProbeResponse {
    #[serde(default)]
    state: Option<String>,
}

/// A state one evidence chunk asserted for a category.
#[derive(Debug)]
struct Assertion {
    value: String,
    position: u64,
    chunk_id: u64,
}

#[derive(Debug, Default)]
struct CategoryOutcome {
    contradictions: Vec<Contradiction>,
    degraded: bool,
}

#[derive(Debug, Default)]
struct ClaimEvaluation {
    contradiction: Option<Contradiction>,
    degraded: bool,
}

impl ClaimEvaluation {
    fn consistent() -> Self {
        Self::default()
    }

    fn degraded() -> Self {
        Self {
            contradiction: None,
            degraded: true,
        }
    }
}

/// Compares claims against chronologically ordered evidence.
pub struct LogicJudge {
    router: Arc<ModelRouter>,
    tables: Arc<ExclusionTables>,
    config: JudgeConfig,
}

impl LogicJudge {
    pub fn new(router: Arc<ModelRouter>, tables: Arc<ExclusionTables>, config: JudgeConfig) -> Self {
        Self {
            router,
            tables,
            config,
        }
    }

    /// Judge claims against their evidence. `evidence[i]` must be the
    /// position-ascending list for `claims[i]`.
    ///
    /// Categories evaluate concurrently and join before the verdict is
    /// assembled.
    pub async fn judge(
        &self,
        character: &str,
        claims: &[Claim],
        evidence: &[Vec<Evidence>],
    ) -> Verdict {
        let work: Vec<(ClaimCategory, Vec<usize>)> = ClaimCategory::CHECKABLE
            .iter()
            .map(|category| {
                let indices: Vec<usize> = claims
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.category == *category)
                    .map(|(i, _)| i)
                    .collect();
                (*category, indices)
            })
            .filter(|(_, indices)| !indices.is_empty())
            .collect();

        let outcomes = join_all(work.into_iter().map(|(category, indices)| {
            self.judge_category(character, category, indices, claims, evidence)
        }))
        .await;

        let mut contradictions = Vec::new();
        let mut degraded = false;
        for outcome in outcomes {
            contradictions.extend(outcome.contradictions);
            degraded |= outcome.degraded;
        }
        Verdict::from_contradictions(contradictions, degraded)
    }

    async fn judge_category(
        &self,
        character: &str,
        category: ClaimCategory,
        indices: Vec<usize>,
        claims: &[Claim],
        evidence: &[Vec<Evidence>],
    ) -> CategoryOutcome {
        let mut outcome = CategoryOutcome::default();
        for index in indices {
            let claim = &claims[index];
            let Some(list) = evidence.get(index) else {
                continue;
            };
            if list.is_empty() {
                // Nothing retrieved, nothing to contradict.
                continue;
            }

            let evaluation = self.evaluate_claim(character, claim, list).await;
            if let Some(contradiction) = evaluation.contradiction {
                outcome.contradictions.push(contradiction);
            }
            if evaluation.degraded {
                outcome.degraded = true;
                tracing::warn!(
                    category = category.name(),
                    "category evaluation degraded, defaulting to consistent"
                );
            }
        }
        outcome
    }

    async fn evaluate_claim(
        &self,
        character: &str,
        claim: &Claim,
        evidence: &[Evidence],
    ) -> ClaimEvaluation {
        let window = claim.temporal_anchor.as_ref().and_then(|a| a.position());

        let mut assertions: Vec<Assertion> = Vec::new();
        for item in evidence {
            if let Some(limit) = window {
                if item.chunk.position > limit {
                    continue;
                }
            }
            match self.probe_chunk(character, claim.category, &item.chunk).await {
                Ok(Some(state)) => assertions.push(Assertion {
                    value: state,
                    position: item.chunk.position,
                    chunk_id: item.chunk.chunk_id,
                }),
                Ok(None) => {}
                Err(err) => {
                    // Cannot prove a contradiction without a working judge.
                    tracing::warn!(
                        error = %err,
                        category = claim.category.name(),
                        "state probe lost to router failure"
                    );
                    return ClaimEvaluation::degraded();
                }
            }
        }

        if assertions.is_empty() {
            return ClaimEvaluation::consistent();
        }

        // The current known state: the latest assertion inside the window.
        // Earlier assertions are superseded by later positions.
        let current = &assertions[assertions.len() - 1];
        if !self.conflicts(claim, &current.value) {
            return ClaimEvaluation::consistent();
        }

        let last_support = assertions
            .iter()
            .filter(|a| !self.conflicts(claim, &a.value))
            .map(|a| a.position)
            .max();
        let cited: Vec<&Assertion> = assertions
            .iter()
            .filter(|a| {
                self.conflicts(claim, &a.value)
                    && last_support.map_or(true, |support| a.position > support)
            })
            .collect();

        if cited.len() < self.config.min_corroboration {
            return ClaimEvaluation::consistent();
        }

        let cited_chunks: Vec<u64> = cited.iter().map(|a| a.chunk_id).collect();
        let (explanation, degraded) = self.explain(character, claim, current, evidence).await;

        ClaimEvaluation {
            contradiction: Some(Contradiction {
                category: claim.category,
                claim_value: claim.value.clone(),
                cited_chunks,
                explanation,
            }),
            degraded,
        }
    }

    /// Whether an evidence-asserted state rules the claim out.
    fn conflicts(&self, claim: &Claim, evidence_state: &str) -> bool {
        match claim.polarity {
            Polarity::Asserted => {
                self.tables
                    .excludes(claim.category, &claim.value, evidence_state)
            }
            // A negated claim conflicts with evidence asserting the very
            // state it denies.
            Polarity::Negated => match claim.category {
                ClaimCategory::Vital => {
                    match (VitalState::parse(&claim.value), VitalState::parse(evidence_state)) {
                        (Some(claimed), Some(evidenced)) => claimed == evidenced,
                        _ => false,
                    }
                }
                _ => {
                    let claimed = claim.value.trim().to_lowercase();
                    let evidenced = evidence_state.trim().to_lowercase();
                    claimed == evidenced
                        || contains_word(&evidenced, &claimed)
                        || contains_word(&claimed, &evidenced)
                }
            },
        }
    }

    /// One schema-constrained router call per evidence chunk.
    async fn probe_chunk(
        &self,
        character: &str,
        category: ClaimCategory,
        chunk: &Chunk,
    ) -> Result<Option<String>, RouterError> {
        let prompt = probe_prompt(character, category, chunk);
        let routed: Routed<ProbeResponse> = self.router.call_json(&prompt).await?;

        Ok(routed
            .value
            .state
            .map(|s| s.trim().to_string())
            .filter(|s| {
                !s.is_empty() && !matches!(s.to_lowercase().as_str(), "none" | "null" | "n/a")
            }))
    }

    /// Model-generated explanation, with a deterministic fallback when the
    /// router is down. The contradiction is already evidence-backed either
    /// way.
    async fn explain(
        &self,
        character: &str,
        claim: &Claim,
        current: &Assertion,
        evidence: &[Evidence],
    ) -> (String, bool) {
        let excerpt = evidence
            .iter()
            .find(|e| e.chunk.chunk_id == current.chunk_id)
            .map(|e| e.chunk.text.as_str())
            .unwrap_or_default();

        let prompt = Prompt::new(format!(
            r#"You are a narrative logic judge.

The backstory claims the {} of {character} is "{}", but the book establishes "{}" in this excerpt:

"{excerpt}"

In one or two sentences, state the conflict as [book state] vs [claim state] and quote the decisive words."#,
            claim.category.name(),
            claim.value,
            current.value,
        ))
        .with_max_tokens(EXPLAIN_MAX_TOKENS);

        match self.router.call_text(&prompt).await {
            Ok(routed) => (routed.value, false),
            Err(err) => {
                tracing::warn!(error = %err, "explanation fell back to template");
                (
                    format!(
                        "Evidence at position {} establishes \"{}\", which is mutually exclusive with the claimed \"{}\".",
                        current.position, current.value, claim.value
                    ),
                    true,
                )
            }
        }
    }
}

fn probe_prompt(character: &str, category: ClaimCategory, chunk: &Chunk) -> Prompt {
    let user = format!(
        r#"You are a narrative state reader.

## Excerpt
[Chunk {}]: "{}"

## Question
What does this excerpt establish about the {} of {character}, if anything?

Only report a state the excerpt itself establishes for this exact character. Do not infer beyond the text; if the excerpt concerns a different character or establishes nothing for this dimension, the state is null.

Respond with ONLY a JSON object:
{{"state": "<short state value>"}}
or
{{"state": null}}"#,
        chunk.chunk_id,
        chunk.text,
        category.name(),
    );
    Prompt::new(user).with_max_tokens(PROBE_MAX_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::claim::TemporalAnchor;
    use crate::judge::router::RouterConfig;
    use crate::store::BookId;
    use crate::testing::{state_json, MockReply, MockTransport};

    fn judge(transport: MockTransport, config: JudgeConfig) -> LogicJudge {
        let router = Arc::new(ModelRouter::new(
            Arc::new(transport),
            RouterConfig::default().with_models(vec!["m1".to_string()]),
        ));
        LogicJudge::new(router, Arc::new(ExclusionTables::default()), config)
    }

    fn item(chunk_id: u64, position: u64, text: &str) -> Evidence {
        Evidence {
            chunk: Chunk {
                chunk_id,
                book_id: BookId::new("book"),
                text: text.to_string(),
                position,
            },
            relevance_score: 1.0,
            claim_indices: vec![0],
        }
    }

    #[tokio::test]
    async fn test_no_claims_is_consistent() {
        let j = judge(MockTransport::new(), JudgeConfig::default());
        let verdict = j.judge("Edmond", &[], &[]).await;
        assert_eq!(verdict.score, 1);
        assert!(verdict.contradictions.is_empty());
        assert!(!verdict.degraded);
    }

    #[tokio::test]
    async fn test_other_claims_are_not_checked() {
        // No probe rules: an Other claim must never reach the router.
        let transport = MockTransport::new().with_default(MockReply::RateLimited);
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Other, "a gifted fencer")];
        let evidence = vec![vec![item(0, 0, "He had never held a sword")]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 1);
        assert!(!verdict.degraded);
    }

    #[tokio::test]
    async fn test_empty_evidence_is_consistent() {
        let j = judge(MockTransport::new(), JudgeConfig::default());
        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")];

        let verdict = j.judge("Edmond", &claims, &[Vec::new()]).await;
        assert_eq!(verdict.score, 1);
        assert!(!verdict.degraded);
    }

    #[tokio::test]
    async fn test_later_position_supersedes() {
        let transport = MockTransport::new()
            .reply_when("hale and hearty", MockReply::Text(state_json(Some("alive"))))
            .reply_when("breathed his last", MockReply::Text(state_json(Some("dead"))))
            .reply_when("logic judge", MockReply::Text("The book reports the death.".into()));
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")
            .with_anchor(TemporalAnchor::Position(6))];
        let evidence = vec![vec![
            item(1, 1, "Edmond was hale and hearty"),
            item(5, 5, "Edmond breathed his last"),
        ]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.contradictions.len(), 1);
        assert_eq!(verdict.contradictions[0].cited_chunks, vec![5]);
    }

    #[tokio::test]
    async fn test_recovery_after_contradiction_is_consistent() {
        // Dead at 3, alive again at 7: the later state is current.
        let transport = MockTransport::new()
            .reply_when("presumed drowned", MockReply::Text(state_json(Some("dead"))))
            .reply_when("walked ashore", MockReply::Text(state_json(Some("alive"))));
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")];
        let evidence = vec![vec![
            item(3, 3, "Edmond was presumed drowned"),
            item(7, 7, "Edmond walked ashore at Marseille"),
        ]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 1);
    }

    #[tokio::test]
    async fn test_evidence_outside_anchor_window_is_ignored() {
        let transport = MockTransport::new()
            .reply_when("breathed his last", MockReply::Text(state_json(Some("dead"))));
        let j = judge(transport, JudgeConfig::default());

        // Death at position 9 cannot contradict a claim about positions <= 4.
        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")
            .with_anchor(TemporalAnchor::Position(4))];
        let evidence = vec![vec![item(9, 9, "Edmond breathed his last")]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 1);
    }

    #[tokio::test]
    async fn test_router_exhaustion_degrades_category() {
        let transport = MockTransport::new().with_default(MockReply::RateLimited);
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")];
        let evidence = vec![vec![item(0, 0, "Edmond breathed his last")]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 1);
        assert!(verdict.degraded);
        assert!(verdict.contradictions.is_empty());
    }

    #[tokio::test]
    async fn test_min_corroboration_two_needs_two_chunks() {
        let transport = MockTransport::new()
            .reply_when("breathed his last", MockReply::Text(state_json(Some("dead"))))
            .reply_when("laid to rest", MockReply::Text(state_json(Some("dead"))))
            .reply_when("logic judge", MockReply::Text("Two reports of death.".into()));
        let j = judge(
            transport,
            JudgeConfig {
                min_corroboration: 2,
            },
        );

        let claims = vec![Claim::new(ClaimCategory::Vital, "alive")];

        // One asserting chunk: not enough.
        let single = vec![vec![item(5, 5, "Edmond breathed his last")]];
        let verdict = j.judge("Edmond", &claims, &single).await;
        assert_eq!(verdict.score, 1);

        // Two asserting chunks: flips.
        let double = vec![vec![
            item(5, 5, "Edmond breathed his last"),
            item(6, 6, "Edmond was laid to rest"),
        ]];
        let verdict = j.judge("Edmond", &claims, &double).await;
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.contradictions[0].cited_chunks, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_negated_claim_conflicts_with_denied_state() {
        let transport = MockTransport::new()
            .reply_when(
                "secret society",
                MockReply::Text(state_json(Some("bonapartist"))),
            )
            .reply_when("logic judge", MockReply::Text("He carried the letter.".into()));
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Allegiance, "bonapartist").negated()];
        let evidence = vec![vec![item(2, 2, "He joined the secret society")]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 0);
    }

    #[tokio::test]
    async fn test_unrelated_states_never_flip() {
        let transport = MockTransport::new()
            .reply_when("nobody knew", MockReply::Text(state_json(Some("unknown"))));
        let j = judge(transport, JudgeConfig::default());

        let claims = vec![Claim::new(ClaimCategory::Location, "Paris")];
        let evidence = vec![vec![item(1, 1, "Where he was, nobody knew")]];

        let verdict = j.judge("Edmond", &claims, &evidence).await;
        assert_eq!(verdict.score, 1);
    }
}
