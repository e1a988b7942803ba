//! Chunker contract: file -> ordered text chunks, pure and deterministic
//! given a model. Tokenisation itself is out of scope here; this module
//! defines the trait boundary and ships one concrete, deterministic default
//! so the pipeline is runnable end to end.

const DEFAULT_MAX_CHUNK_CHARS: usize = 2000;
const DEFAULT_OVERLAP_LINES: usize = 2;

/// `chunk(file, model) -> [text]`. Implementations MUST be deterministic:
/// identical bytes and model produce identical chunk text in the same
/// order, since `ChunkId` derivation depends only on `(file_hash, index)`.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Splits text into overlapping line-based windows. An empty file yields no
/// chunks; the caller records it as skipped rather than as zero chunks
/// upserted.
pub struct LineWindowChunker {
    max_chars: usize,
    overlap_lines: usize,
}

impl Default for LineWindowChunker {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHUNK_CHARS,
            overlap_lines: DEFAULT_OVERLAP_LINES,
        }
    }
}

impl Chunker for LineWindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < lines.len() {
            let mut end = start;
            let mut char_count = 0;

            while end < lines.len() && char_count < self.max_chars {
                char_count += lines[end].len() + 1;
                end += 1;
            }

            let chunk_text = lines[start..end].join("\n");
            if !chunk_text.trim().is_empty() {
                chunks.push(chunk_text);
            }

            if end >= lines.len() {
                break;
            }
            start = end.saturating_sub(self.overlap_lines).max(start + 1);
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_no_chunks() {
        let chunker = LineWindowChunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn small_file_yields_one_chunk() {
        let chunker = LineWindowChunker::default();
        let chunks = chunker.chunk("hello");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], "hello");
    }

    #[test]
    fn large_file_splits_into_multiple_chunks() {
        let chunker = LineWindowChunker {
            max_chars: 20,
            overlap_lines: 1,
        };
        let text = (0..50).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
    }
}
