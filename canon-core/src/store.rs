//! Evidence store contract and the in-process lexical store.
//!
//! The engine treats retrieval as a black box behind [`EvidenceStore`]:
//! given a book and a query string, return scored chunks from that book and
//! that book only. [`MemoryStore`] is the shipped implementation, a
//! deterministic token-overlap store over pre-chunked text. A vector-backed
//! store plugs in at the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Opaque identifier for a book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(String);

impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BookId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A fixed segment of novel text with a stable chronological position.
///
/// `position` is monotonically increasing with narrative order. Chunks are
/// immutable once indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: u64,
    pub book_id: BookId,
    pub text: String,
    pub position: u64,
}

/// A chunk returned from a store query, annotated with similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Errors from evidence store lookups.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown book: {0}")]
    UnknownBook(BookId),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read-only lookup contract for per-book evidence retrieval.
///
/// Implementations must never return a chunk whose `book_id` differs from
/// the queried book.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Return up to `top_k` chunks from `book_id` ranked by relevance to
    /// `query_text`, best first.
    async fn query(
        &self,
        book_id: &BookId,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Whether the store holds an index for the given book.
    fn contains_book(&self, book_id: &BookId) -> bool;
}

/// Deterministic in-process store with lexical token-overlap scoring.
///
/// Good enough to drive tests and the batch driver without an embedding
/// service; scores are the fraction of query tokens present in a chunk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    books: HashMap<BookId, Vec<IndexedChunk>>,
}

#[derive(Debug)]
struct IndexedChunk {
    chunk: Chunk,
    tokens: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a book's chunks. Chunks are stored as given; callers are
    /// expected to provide them in narrative order.
    pub fn add_book(&mut self, book_id: BookId, chunks: Vec<Chunk>) {
        let indexed = chunks
            .into_iter()
            .map(|chunk| IndexedChunk {
                tokens: tokenize(&chunk.text),
                chunk,
            })
            .collect();
        self.books.insert(book_id, indexed);
    }

    /// Ids of all indexed books.
    pub fn book_ids(&self) -> Vec<&BookId> {
        self.books.keys().collect()
    }

    /// Number of chunks indexed for a book, if present.
    pub fn chunk_count(&self, book_id: &BookId) -> Option<usize> {
        self.books.get(book_id).map(|chunks| chunks.len())
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn query(
        &self,
        book_id: &BookId,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let chunks = self
            .books
            .get(book_id)
            .ok_or_else(|| StoreError::UnknownBook(book_id.clone()))?;

        let query_tokens = tokenize(query_text);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .filter_map(|indexed| {
                let matched = query_tokens
                    .iter()
                    .filter(|t| indexed.tokens.contains(*t))
                    .count();
                if matched == 0 {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: indexed.chunk.clone(),
                    score: matched as f32 / query_tokens.len() as f32,
                })
            })
            .collect();

        // Best score first; chunk id breaks ties for determinism.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    fn contains_book(&self, book_id: &BookId) -> bool {
        self.books.contains_key(book_id)
    }
}

/// Lowercased alphanumeric tokens of length >= 3.
///
/// Short tokens ("a", "of", "in") carry no signal for overlap scoring and
/// only inflate the denominator.
fn tokenize(text: &str) -> HashSet<String> {
    let mut tokens = HashSet::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            if current.len() >= 3 {
                tokens.insert(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 3 {
        tokens.insert(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(book: &str, id: u64, text: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            book_id: BookId::new(book),
            text: text.to_string(),
            position: id,
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap() {
        let mut store = MemoryStore::new();
        store.add_book(
            BookId::new("monte-cristo"),
            vec![
                chunk("monte-cristo", 0, "Edmond Dantes sailed into Marseille"),
                chunk("monte-cristo", 1, "The abbe spoke of treasure"),
                chunk("monte-cristo", 2, "Dantes was imprisoned in the Chateau d'If"),
            ],
        );

        let results = store
            .query(&BookId::new("monte-cristo"), "Dantes imprisoned Chateau", 10)
            .await
            .unwrap();

        assert_eq!(results[0].chunk.chunk_id, 2);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_no_cross_book_leakage() {
        let mut store = MemoryStore::new();
        store.add_book(
            BookId::new("book-a"),
            vec![chunk("book-a", 0, "the captain sailed north")],
        );
        store.add_book(
            BookId::new("book-b"),
            vec![chunk("book-b", 0, "the captain sailed south")],
        );

        let results = store
            .query(&BookId::new("book-a"), "captain sailed", 10)
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.chunk.book_id == BookId::new("book-a")));
    }

    #[tokio::test]
    async fn test_unknown_book_errors() {
        let store = MemoryStore::new();
        let result = store.query(&BookId::new("missing"), "anything", 5).await;
        assert!(matches!(result, Err(StoreError::UnknownBook(_))));
    }

    #[tokio::test]
    async fn test_top_k_bound() {
        let mut store = MemoryStore::new();
        let chunks = (0..20)
            .map(|i| chunk("book", i, "Paris again and again"))
            .collect();
        store.add_book(BookId::new("book"), chunks);

        let results = store
            .query(&BookId::new("book"), "Paris again", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_tokenize_drops_short_tokens() {
        let tokens = tokenize("He is in Paris");
        assert!(tokens.contains("paris"));
        assert!(!tokens.contains("he"));
        assert!(!tokens.contains("in"));
    }
}
