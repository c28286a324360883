//! Testing utilities for the judgment engine.
//!
//! This module provides tools for deterministic tests without API calls:
//! - [`MockTransport`], a scripted [`ChatTransport`] with failure injection
//! - fixture helpers for building small in-memory evidence stores

use crate::judge::{ChatTransport, Prompt, TransportError};
use crate::store::{BookId, Chunk, MemoryStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A scripted reply from the mock transport.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text as the model output.
    Text(String),
    RateLimited,
    Timeout,
    ApiError(u16),
    Network,
}

impl MockReply {
    fn to_result(&self) -> Result<String, TransportError> {
        match self {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::RateLimited => Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(1)),
            }),
            MockReply::Timeout => Err(TransportError::Timeout),
            MockReply::ApiError(status) => Err(TransportError::Api {
                status: *status,
                message: "scripted failure".to_string(),
            }),
            MockReply::Network => Err(TransportError::Network("scripted failure".to_string())),
        }
    }
}

struct MockRule {
    model: Option<String>,
    prompt_contains: Option<String>,
    /// When set, the rule only fires this many times.
    remaining: Option<AtomicUsize>,
    reply: MockReply,
}

impl MockRule {
    fn matches(&self, model: &str, prompt: &Prompt) -> bool {
        if let Some(m) = &self.model {
            if m != model {
                return false;
            }
        }
        if let Some(needle) = &self.prompt_contains {
            if !prompt.user.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(remaining) = &self.remaining {
            loop {
                let current = remaining.load(Ordering::SeqCst);
                if current == 0 {
                    return false;
                }
                if remaining
                    .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return true;
                }
            }
        }
        true
    }
}

/// One recorded transport call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub user: String,
}

/// A scripted transport: rules are consulted in insertion order, the first
/// match wins, and every call is recorded for assertions.
pub struct MockTransport {
    rules: Vec<MockRule>,
    default: MockReply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default: MockReply::Text("{}".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply used when no rule matches.
    pub fn with_default(mut self, reply: MockReply) -> Self {
        self.default = reply;
        self
    }

    /// Reply whenever the user prompt contains `needle`.
    pub fn reply_when(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push(MockRule {
            model: None,
            prompt_contains: Some(needle.into()),
            remaining: None,
            reply,
        });
        self
    }

    /// Reply whenever the given backend model is called.
    pub fn reply_for_model(mut self, model: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push(MockRule {
            model: Some(model.into()),
            prompt_contains: None,
            remaining: None,
            reply,
        });
        self
    }

    /// Fail the first `times` calls to `model` with `reply`, then fall
    /// through to later rules or the default.
    pub fn fail_times(mut self, model: impl Into<String>, times: usize, reply: MockReply) -> Self {
        self.rules.push(MockRule {
            model: Some(model.into()),
            prompt_contains: None,
            remaining: Some(AtomicUsize::new(times)),
            reply,
        });
        self
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn complete(&self, model: &str, prompt: &Prompt) -> Result<String, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            user: prompt.user.clone(),
        });

        for rule in &self.rules {
            if rule.matches(model, prompt) {
                return rule.reply.to_result();
            }
        }
        self.default.to_result()
    }
}

/// Build an in-memory store for one book from `(chunk_id, position, text)`
/// triples.
pub fn fixture_store(book: &str, chunks: &[(u64, u64, &str)]) -> MemoryStore {
    let book_id = BookId::new(book);
    let mut store = MemoryStore::new();
    store.add_book(
        book_id.clone(),
        chunks
            .iter()
            .map(|(chunk_id, position, text)| Chunk {
                chunk_id: *chunk_id,
                book_id: book_id.clone(),
                text: text.to_string(),
                position: *position,
            })
            .collect(),
    );
    store
}

/// JSON body of a state-probe response.
pub fn state_json(state: Option<&str>) -> String {
    match state {
        Some(s) => format!(r#"{{"state": "{s}"}}"#),
        None => r#"{"state": null}"#.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_match_in_order() {
        let transport = MockTransport::new()
            .reply_when("alpha", MockReply::Text("first".into()))
            .reply_when("alpha beta", MockReply::Text("second".into()));

        let reply = transport
            .complete("m", &Prompt::new("alpha beta gamma"))
            .await
            .unwrap();
        assert_eq!(reply, "first");
    }

    #[tokio::test]
    async fn test_fail_times_exhausts() {
        let transport = MockTransport::new()
            .fail_times("m", 2, MockReply::Timeout)
            .with_default(MockReply::Text("ok".into()));

        assert!(transport.complete("m", &Prompt::new("q")).await.is_err());
        assert!(transport.complete("m", &Prompt::new("q")).await.is_err());
        assert_eq!(transport.complete("m", &Prompt::new("q")).await.unwrap(), "ok");
        assert_eq!(transport.calls().len(), 3);
    }
}
