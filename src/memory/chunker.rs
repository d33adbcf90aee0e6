// src/memory/chunker.rs

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 4000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,    // characters per chunk
    pub chunk_overlap: usize, // characters carried into the next chunk
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

pub struct TextChunker {
    config: ChunkerConfig,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn with_default() -> Self {
        Self::new(ChunkerConfig::default())
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.config.chunk_size, self.config.chunk_overlap)
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into overlapping character windows.
///
/// Windows prefer to end right after a sentence terminator (`.`, `!`, `?`)
/// when one falls in the back half of the window. Every window advances by
/// at least one character, so the loop always terminates. Positions are
/// counted in chars so multi-byte text never splits inside a code point.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let cleaned = normalize_whitespace(text);
    if cleaned.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = cleaned.chars().collect();
    if chars.len() <= chunk_size {
        return vec![cleaned];
    }

    let overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let mut split = end;

        if end < chars.len() {
            if let Some(pos) = chars[start..end]
                .iter()
                .rposition(|c| matches!(c, '.' | '!' | '?'))
            {
                // Only honor the boundary if it keeps the chunk reasonably full
                if pos + 1 > chunk_size / 2 {
                    split = start + pos + 1;
                }
            }
        }

        let piece: String = chars[start..split].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if split >= chars.len() {
            break;
        }

        let step = (split - start).saturating_sub(overlap).max(1);
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace() {
        assert!(chunk_text("", 4000, 200).is_empty());
        assert!(chunk_text("   \n\t  ", 4000, 200).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("Hello   world.\n\nSecond  line.", 4000, 200);
        assert_eq!(chunks, vec!["Hello world. Second line.".to_string()]);
    }

    #[test]
    fn test_six_thousand_chars_two_chunks() {
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = sentence.repeat(6000 / sentence.len() + 1);
        let text = &text[..6000];

        let chunks = chunk_text(text, 4000, 200);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('.'));
        assert!(chunks[0].chars().count() <= 4000);

        // Overlap: the tail of chunk 0 reappears at the head of chunk 1
        let tail: String = chunks[0].chars().rev().take(50).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].contains(tail.trim()));
    }

    #[test]
    fn test_no_terminators_still_progresses() {
        let text = "a".repeat(10_000);
        let chunks = chunk_text(&text, 1000, 100);
        assert!(chunks.len() >= 10);
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    }

    #[test]
    fn test_overlap_larger_than_size_terminates() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, 10, 50);
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "héllo wörld ünïcödé. ".repeat(100);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_chunker_uses_config() {
        let chunker = TextChunker::new(ChunkerConfig { chunk_size: 20, chunk_overlap: 0 });
        let chunks = chunker.chunk("One two three. Four five six. Seven eight nine.");
        assert!(chunks.len() >= 2);
    }
}
