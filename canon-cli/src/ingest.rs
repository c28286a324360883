//! Book loading, cleaning, and chunking for the in-memory store.
//!
//! Chunk ids are assigned per book in narrative order, so `position`
//! doubles as the chronological marker the retriever sorts on.

use canon_core::{BookId, Chunk};

/// Normalize line endings and strip control characters.
///
/// Mojibake repair belongs to the ingestion collaborator; this only keeps
/// the chunker sane on plain-text files.
pub fn clean_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.replace("\r\n", "\n").chars() {
        if c == '\n' || c == '\t' || !c.is_control() {
            cleaned.push(c);
        }
    }
    cleaned
}

/// Split text into overlapping word windows of roughly `chunk_size`
/// characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut len = 0;
        let mut end = start;
        while end < words.len() && len + words[end].len() + 1 <= chunk_size {
            len += words[end].len() + 1;
            end += 1;
        }
        if end == start {
            // A single word longer than the window still becomes a chunk.
            end = start + 1;
        }
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        // Step back enough words to cover the overlap, but always advance.
        let mut back = end;
        let mut covered = 0;
        while back > start + 1 && covered < overlap {
            back -= 1;
            covered += words[back].len() + 1;
        }
        start = if back > start { back } else { end };
    }

    chunks
}

/// Clean and chunk a raw book text into store-ready chunks.
pub fn chunk_book(book_id: &BookId, raw: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let cleaned = clean_text(raw);
    chunk_text(&cleaned, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            chunk_id: i as u64,
            book_id: book_id.clone(),
            text,
            position: i as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_control_chars() {
        let cleaned = clean_text("a\u{0000}b\r\nc\td");
        assert_eq!(cleaned, "ab\nc\td");
    }

    #[test]
    fn test_chunk_ids_are_monotonic() {
        let text = "word ".repeat(500);
        let chunks = chunk_book(&BookId::new("book"), &text, 100, 20);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i as u64);
            assert_eq!(chunk.position, i as u64);
        }
    }

    #[test]
    fn test_adjacent_chunks_overlap() {
        let text: String = (0..200).map(|i| format!("w{i} ")).collect();
        let chunks = chunk_text(&text, 120, 40);

        assert!(chunks.len() > 1);
        let first_tail: Vec<&str> = chunks[0].split_whitespace().rev().take(2).collect();
        for word in first_tail {
            assert!(chunks[1].contains(word));
        }
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("   \n  ", 100, 20).is_empty());
    }

    #[test]
    fn test_overlong_word_still_chunks() {
        let text = "x".repeat(500);
        let chunks = chunk_text(&text, 100, 20);
        assert_eq!(chunks.len(), 1);
    }
}
