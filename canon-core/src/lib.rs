//! Backstory consistency judgment engine.
//!
//! This crate provides:
//! - Fact extraction from free-text character backstories
//! - Chronological evidence retrieval over a per-book store
//! - A three-tier mutually-exclusive-state comparator with verdicts
//! - Ordered-fallback model routing resilient to backend failures
//!
//! # Quick Start
//!
//! ```ignore
//! use canon_core::{BackstoryChecker, CheckRequest, CheckerConfig, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut store = MemoryStore::new();
//!     // ... index a book's chunks ...
//!
//!     let checker = BackstoryChecker::from_env(Arc::new(store), CheckerConfig::default())?;
//!
//!     let request = CheckRequest::new("monte-cristo", "Edmond Dantes", "He fled to Paris...")
//!         .with_caption("after the trial");
//!     let verdict = checker.check(&request).await?;
//!     println!("score: {}", verdict.score);
//!     Ok(())
//! }
//! ```

pub mod checker;
pub mod judge;
pub mod store;
pub mod testing;

// Primary public API
pub use checker::{BackstoryChecker, CheckError, CheckRequest, CheckerConfig};
pub use judge::{
    Claim, ClaimCategory, Contradiction, Evidence, ExclusionTables, JudgeConfig, Polarity,
    RetrieverConfig, RouterConfig, TemporalAnchor, Verdict,
};
pub use store::{BookId, Chunk, EvidenceStore, MemoryStore, ScoredChunk, StoreError};
