//! Integration tests that call the real Groq API.
//!
//! These tests require GROQ_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p canon-core --test api_integration -- --ignored`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use canon_core::{BackstoryChecker, BookId, CheckRequest, CheckerConfig, Chunk, MemoryStore};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("GROQ_API_KEY").is_ok()
}

fn sample_store() -> MemoryStore {
    let book_id = BookId::new("monte-cristo");
    let passages = [
        "On the 24th of February, 1815, the three-master Pharaon arrived at Marseille, and the young sailor Edmond Dantes stood at her helm.",
        "Edmond Dantes was denounced as a Bonapartist agent and arrested at his own betrothal feast.",
        "Dantes was rowed out to the Chateau d'If and swallowed by its dungeons, where he would remain for fourteen years.",
        "In the dungeon the Abbe Faria taught Dantes languages, science, and the location of the treasure of Monte Cristo.",
    ];

    let mut store = MemoryStore::new();
    store.add_book(
        book_id.clone(),
        passages
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                chunk_id: i as u64,
                book_id: book_id.clone(),
                text: text.to_string(),
                position: i as u64,
            })
            .collect(),
    );
    store
}

#[tokio::test]
#[ignore] // Run with: cargo test -p canon-core --test api_integration -- --ignored
async fn test_contradictory_backstory_live() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GROQ_API_KEY not set");
        return;
    }

    let checker = BackstoryChecker::from_env(Arc::new(sample_store()), CheckerConfig::default())
        .expect("Failed to create checker");

    let request = CheckRequest::new(
        "monte-cristo",
        "Edmond Dantes",
        "In the year after his arrest, Edmond Dantes lived freely in Paris, \
         hosting salons and never seeing the inside of a cell.",
    )
    .with_caption("the year after the betrothal feast");

    let verdict = checker.check(&request).await.expect("checker should respond");

    println!("score: {}", verdict.score);
    println!("degraded: {}", verdict.degraded);
    for contradiction in &verdict.contradictions {
        println!(
            "[{:?}] {} -> chunks {:?}: {}",
            contradiction.category,
            contradiction.claim_value,
            contradiction.cited_chunks,
            contradiction.explanation
        );
    }

    // Whatever the model concluded, a contradiction verdict must cite
    // evidence.
    if verdict.score == 0 {
        assert!(verdict
            .contradictions
            .iter()
            .all(|c| !c.cited_chunks.is_empty()));
    }
}

#[tokio::test]
#[ignore]
async fn test_benign_backstory_live() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GROQ_API_KEY not set");
        return;
    }

    let checker = BackstoryChecker::from_env(Arc::new(sample_store()), CheckerConfig::default())
        .expect("Failed to create checker");

    let verdict = checker
        .check_backstory(
            "monte-cristo",
            "As a boy he loved the sea and dreamed of commanding a ship of his own.",
        )
        .await
        .expect("checker should respond");

    println!("score: {}", verdict.score);
    // A backstory the book never speaks to should get the benefit of the
    // doubt unless the model finds an explicit conflict.
}
