//! Public entry point: the backstory checker facade.
//!
//! `BackstoryChecker` wires the extractor, retriever, router, and judge
//! around an evidence store. Apart from invalid input, it always prefers
//! returning a (possibly degraded) verdict over raising an error.

use crate::judge::{
    ChatTransport, ExclusionTables, FactExtractor, GroqTransport, JudgeConfig, LogicJudge,
    ModelRouter, RetrieverConfig, RouterConfig, TimelineRetriever, Verdict,
};
use crate::store::{BookId, EvidenceStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Errors that abort a check before a verdict exists. Everything else
/// degrades into the verdict instead.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("backstory text is empty")]
    InvalidInput,

    #[error("unknown book: {0}")]
    UnknownBook(BookId),

    #[error("evidence store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct CheckerConfig {
    pub router: RouterConfig,
    pub retriever: RetrieverConfig,
    pub judge: JudgeConfig,
}

/// One backstory-check request.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub book_id: BookId,
    pub character: String,
    /// Short scene or time hint, fed into retrieval queries and prompts.
    pub caption: Option<String>,
    pub backstory: String,
}

impl CheckRequest {
    pub fn new(
        book_id: impl Into<BookId>,
        character: impl Into<String>,
        backstory: impl Into<String>,
    ) -> Self {
        Self {
            book_id: book_id.into(),
            character: character.into(),
            caption: None,
            backstory: backstory.into(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }
}

/// Checks backstories against a book's indexed evidence.
pub struct BackstoryChecker {
    store: Arc<dyn EvidenceStore>,
    extractor: FactExtractor,
    retriever: TimelineRetriever,
    judge: LogicJudge,
}

impl BackstoryChecker {
    /// Build a checker over the given store and model transport.
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        transport: Arc<dyn ChatTransport>,
        config: CheckerConfig,
    ) -> Self {
        Self::with_tables(store, transport, config, ExclusionTables::default())
    }

    /// Build a checker with a custom exclusion table set.
    pub fn with_tables(
        store: Arc<dyn EvidenceStore>,
        transport: Arc<dyn ChatTransport>,
        config: CheckerConfig,
        tables: ExclusionTables,
    ) -> Self {
        let router = Arc::new(ModelRouter::new(transport, config.router));
        let tables = Arc::new(tables);
        Self {
            extractor: FactExtractor::new(Arc::clone(&router), Arc::clone(&tables)),
            retriever: TimelineRetriever::new(Arc::clone(&store), config.retriever),
            judge: LogicJudge::new(router, tables, config.judge),
            store,
        }
    }

    /// Build a checker from the GROQ_API_KEY environment variable.
    pub fn from_env(
        store: Arc<dyn EvidenceStore>,
        config: CheckerConfig,
    ) -> Result<Self, groq::Error> {
        let transport = Arc::new(GroqTransport::from_env()?);
        Ok(Self::new(store, transport, config))
    }

    /// Check a backstory for consistency with a book.
    ///
    /// Only invalid input aborts; any model-side failure degrades the
    /// verdict instead.
    pub async fn check(&self, request: &CheckRequest) -> Result<Verdict, CheckError> {
        if request.backstory.trim().is_empty() {
            return Err(CheckError::InvalidInput);
        }
        if !self.store.contains_book(&request.book_id) {
            return Err(CheckError::UnknownBook(request.book_id.clone()));
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "check_backstory",
            %request_id,
            book = %request.book_id,
            character = %request.character,
        );

        self.run(request).instrument(span).await
    }

    /// The simple entry point: book and text, anonymous subject.
    pub async fn check_backstory(
        &self,
        book_id: impl Into<BookId>,
        backstory: &str,
    ) -> Result<Verdict, CheckError> {
        self.check(&CheckRequest::new(book_id, "the character", backstory))
            .await
    }

    async fn run(&self, request: &CheckRequest) -> Result<Verdict, CheckError> {
        let extraction = self
            .extractor
            .extract(
                &request.backstory,
                &request.character,
                request.caption.as_deref(),
            )
            .await;

        let checkable = extraction
            .claims
            .iter()
            .filter(|c| c.category.is_checkable())
            .count();
        tracing::info!(
            claims = extraction.claims.len(),
            checkable,
            "claims extracted"
        );

        if checkable == 0 {
            // Nothing to contradict: degenerate success, not an error.
            let mut verdict = Verdict::consistent();
            verdict.degraded = extraction.degraded;
            return Ok(verdict);
        }

        let evidence = self
            .retriever
            .retrieve(
                &request.book_id,
                &extraction.claims,
                &request.character,
                request.caption.as_deref(),
            )
            .await?;

        let mut verdict = self
            .judge
            .judge(&request.character, &extraction.claims, &evidence)
            .await;
        if extraction.degraded {
            verdict.degraded = true;
        }

        tracing::info!(
            score = verdict.score,
            degraded = verdict.degraded,
            contradictions = verdict.contradictions.len(),
            "verdict assembled"
        );
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture_store, MockTransport};

    fn checker(store: crate::store::MemoryStore) -> BackstoryChecker {
        BackstoryChecker::new(
            Arc::new(store),
            Arc::new(MockTransport::new()),
            CheckerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_backstory_is_invalid_input() {
        let c = checker(fixture_store("book", &[(0, 0, "text")]));
        let request = CheckRequest::new("book", "Edmond", "   ");
        assert!(matches!(
            c.check(&request).await,
            Err(CheckError::InvalidInput)
        ));
    }

    #[tokio::test]
    async fn test_unknown_book_is_rejected() {
        let c = checker(fixture_store("book", &[(0, 0, "text")]));
        let request = CheckRequest::new("other-book", "Edmond", "A sailor's story.");
        assert!(matches!(
            c.check(&request).await,
            Err(CheckError::UnknownBook(_))
        ));
    }
}
