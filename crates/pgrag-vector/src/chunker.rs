//! Text chunking for ingestion
//!
//! Splits text into overlapping windows, preferring to cut at paragraph or
//! sentence boundaries near the end of each window.

use pgrag_core::RagConfig;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between chunks in characters
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl From<&RagConfig> for ChunkConfig {
    fn from(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }
}

const BREAK_PATTERNS: [&str; 5] = ["\n\n", ". ", "! ", "? ", "\n"];

/// Chunk a text string into trimmed, non-empty pieces
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let size = config.chunk_size.max(1);

    // Byte offset of every char, plus the end of the text
    let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = offsets.len();
    offsets.push(text.len());

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + size).min(char_count);
        let actual_end = if end < char_count {
            find_break_point(text, &offsets, start, end, size)
        } else {
            end
        };

        let piece = text[offsets[start]..offsets[actual_end]].trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if actual_end >= char_count {
            break;
        }

        start = match actual_end.checked_sub(config.overlap) {
            Some(next) if next > start => next,
            _ => actual_end,
        };
    }

    chunks
}

/// Char index just after the best break in the second half of the window
fn find_break_point(text: &str, offsets: &[usize], start: usize, end: usize, size: usize) -> usize {
    let window_start = (start + 1).max(end.saturating_sub(size / 2));
    let window = &text[offsets[window_start]..offsets[end]];

    for pattern in BREAK_PATTERNS {
        if let Some(pos) = window.rfind(pattern) {
            let byte = offsets[window_start] + pos + pattern.len();
            // Patterns are ASCII, so `byte` always lands on a char boundary
            if let Ok(idx) = offsets.binary_search(&byte) {
                return idx;
            }
        }
    }

    end
}
