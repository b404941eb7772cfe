//! Splits long text into overlapping chunks on natural boundaries.

use serde::{Deserialize, Serialize};
use spacefold_core::{Error, Result};
use std::collections::VecDeque;

const DEFAULT_CHUNK_SIZE: usize = 250;
const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Separators tried in order; `true` keeps the separator on the split.
const SEPARATORS: [(&str, bool); 5] = [("\n", false), (".", true), ("!", true), ("?", true), (" ", true)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_on(text: &str, separator: &str, keep_separator: bool) -> Vec<String> {
    let parts: Vec<&str> = text.split(separator).collect();
    let last = parts.len().saturating_sub(1);
    parts
        .into_iter()
        .enumerate()
        .filter_map(|(i, part)| {
            let part = if keep_separator && i != last {
                format!("{}{} ", part, separator.trim())
            } else {
                part.to_string()
            };
            (!part.trim().is_empty()).then_some(part)
        })
        .collect()
}

/// Break text into splits no longer than `chunk_size` where a separator allows.
fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let mut pending: VecDeque<String> = VecDeque::from([text.to_string()]);
    let mut splits = Vec::new();
    while let Some(split) = pending.pop_front() {
        if char_len(&split) <= chunk_size {
            splits.push(split);
            continue;
        }
        let normalized = normalize_whitespace(&split);
        let finer = SEPARATORS
            .iter()
            .map(|(separator, keep)| split_on(&normalized, separator, *keep))
            .find(|parts| parts.len() > 1);
        match finer {
            Some(parts) => {
                for part in parts.into_iter().rev() {
                    pending.push_front(part);
                }
            }
            None => splits.push(split),
        }
    }
    splits
}

/// Split `text` into chunks of at most `chunk_size` characters, carrying up
/// to `chunk_overlap` characters of context into the next chunk.
///
/// A single word longer than `chunk_size` becomes its own oversized chunk.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut emit = |current: &VecDeque<String>| {
        let joined = current.iter().map(String::as_str).collect::<Vec<_>>().join(" ");
        let chunk = normalize_whitespace(&joined);
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    };

    let mut current: VecDeque<String> = VecDeque::new();
    let mut current_len = 0usize;
    for split in split_text(text, config.chunk_size) {
        let len = char_len(&split);
        if current_len + len > config.chunk_size && !current.is_empty() {
            emit(&current);
            while current_len > config.chunk_overlap || (current_len > 0 && current_len + len > config.chunk_size) {
                match current.pop_front() {
                    Some(removed) => current_len -= char_len(&removed),
                    None => break,
                }
            }
        }
        current_len += len;
        current.push_back(split);
    }
    emit(&current);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "one two three four five six seven eight nine ten";

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text("  \n ", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("Hello   world.\nBye", &ChunkingConfig::default());
        assert_eq!(chunks, vec!["Hello world. Bye".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunks = chunk_text(TEXT, &ChunkingConfig::new(20, 0));
        assert_eq!(chunks[0], "one two three four");
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        assert_eq!(chunks.join(" "), TEXT);
    }

    #[test]
    fn test_overlap_carries_context() {
        let chunks = chunk_text(TEXT, &ChunkingConfig::new(20, 10));
        assert_eq!(chunks[0], "one two three four");
        assert_eq!(chunks[1], "four five six seven");
    }

    #[test]
    fn test_sentences_split_first() {
        let text = "First sentence here. Second sentence here! Third one?";
        let chunks = chunk_text(text, &ChunkingConfig::new(25, 0));
        assert_eq!(chunks[0], "First sentence here.");
        assert_eq!(chunks[1], "Second sentence here!");
        assert_eq!(chunks[2], "Third one?");
    }

    #[test]
    fn test_invalid_config() {
        assert!(ChunkingConfig::new(10, 10).validate().is_err());
        assert!(ChunkingConfig::new(0, 0).validate().is_err());
        assert!(ChunkingConfig::default().validate().is_ok());
    }
}
