//! Judgment engine module.
//!
//! Contains the fact extractor, timeline retriever, model router, and
//! logic judge that together turn a backstory and a book index into a
//! consistency verdict.

mod claim;
mod engine;
mod exclusion;
mod extractor;
mod retriever;
mod router;
mod verdict;

pub use claim::{Claim, ClaimCategory, Polarity, TemporalAnchor};
pub use engine::{JudgeConfig, LogicJudge};
pub use exclusion::{ExclusionTables, VitalState};
pub use extractor::{Extraction, FactExtractor};
pub use retriever::{Evidence, RetrieverConfig, TimelineRetriever};
pub use router::{
    ChatTransport, GroqTransport, ModelRouter, Prompt, Routed, RouterConfig, RouterError,
    TransportError,
};
pub use verdict::{CategoryState, Contradiction, Verdict};
