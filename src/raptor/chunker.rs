//! Recursive separator-based text chunker.
//!
//! Splits text on an ordered list of separators, recursing into any
//! resulting fragment that is still too large with the remaining
//! separators, then greedily merges adjacent fragments into
//! `chunk_size`-bounded chunks with a sliding overlap window. The
//! algorithm mirrors `RecursiveCharacterTextSplitter` from
//! `langchain-text-splitters`, which the original service wraps directly
//! (`infra/chunking/langchain_chunker.py`); this reimplements the same
//! split/merge contract natively instead of shelling out to Python.

/// Default separator list: paragraph break, line break, word break,
/// character-by-character fallback.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub keep_separator: bool,
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::new(1200, 200, false, None)
    }
}

impl ChunkerConfig {
    /// Construct with validation and the spec's clamping rule: an overlap
    /// that is not strictly less than `chunk_size` is clamped to
    /// `chunk_size / 5`.
    pub fn new(chunk_size: usize, chunk_overlap: usize, keep_separator: bool, separators: Option<Vec<String>>) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        let chunk_overlap = if chunk_overlap >= chunk_size { chunk_size / 5 } else { chunk_overlap };
        Self {
            chunk_size,
            chunk_overlap,
            keep_separator,
            separators: separators.unwrap_or_else(|| DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect()),
        }
    }
}

/// Split `text` into an ordered sequence of non-empty, non-whitespace-only
/// chunks. Deterministic for a given `config`.
pub fn chunk(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let separators: Vec<String> = config.separators.clone();
    let pieces = split_text(text, &separators, config);
    pieces
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn split_text(text: &str, separators: &[String], config: &ChunkerConfig) -> Vec<String> {
    let split_index = separators
        .iter()
        .position(|s| s.is_empty() || text.contains(s.as_str()))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators[split_index].as_str();
    let remaining = &separators[split_index.saturating_add(1).min(separators.len())..];

    let raw_splits = split_on_separator(text, separator, config.keep_separator);

    let mut good_splits: Vec<String> = Vec::new();
    let mut final_chunks: Vec<String> = Vec::new();
    let merge_separator = if config.keep_separator { "" } else { separator };

    for piece in raw_splits {
        if piece.chars().count() < config.chunk_size {
            good_splits.push(piece);
        } else {
            if !good_splits.is_empty() {
                final_chunks.extend(merge_splits(&good_splits, merge_separator, config));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece);
            } else {
                final_chunks.extend(split_text(&piece, remaining, config));
            }
        }
    }
    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(&good_splits, merge_separator, config));
    }
    final_chunks
}

/// Split `text` on `separator`. When `separator` is empty, splits into
/// individual characters. With `keep_separator`, the separator text is
/// reattached as a prefix to every fragment after the first.
fn split_on_separator(text: &str, separator: &str, keep_separator: bool) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }
    let parts: Vec<&str> = text.split(separator).collect();
    if parts.len() == 1 {
        return vec![text.to_string()];
    }
    if keep_separator {
        let mut out = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            if i == 0 {
                out.push(part.to_string());
            } else {
                out.push(format!("{separator}{part}"));
            }
        }
        out
    } else {
        parts.into_iter().map(|p| p.to_string()).collect()
    }
}

/// Greedily pack `splits` into `chunk_size`-bounded windows joined by
/// `separator`, carrying a sliding overlap of up to `chunk_overlap`
/// characters from the tail of the previous window into the next.
fn merge_splits(splits: &[String], separator: &str, config: &ChunkerConfig) -> Vec<String> {
    let sep_len = separator.chars().count();
    let mut docs = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut total = 0usize;

    let len_with_sep = |current: &[String], total: usize| -> usize {
        if current.is_empty() {
            total
        } else {
            total + sep_len
        }
    };

    for piece in splits {
        let piece_len = piece.chars().count();
        if len_with_sep(&current, total) + piece_len > config.chunk_size && !current.is_empty() {
            docs.push(current.join(separator));
            while total > config.chunk_overlap
                || (len_with_sep(&current, total) + piece_len > config.chunk_size && total > 0)
            {
                if current.is_empty() {
                    break;
                }
                let first_len = current.remove(0).chars().count();
                total = total.saturating_sub(first_len);
                if !current.is_empty() {
                    total = total.saturating_sub(sep_len);
                }
            }
        }
        if !current.is_empty() {
            total += sep_len;
        }
        total += piece_len;
        current.push(piece.clone());
    }
    if !current.is_empty() {
        docs.push(current.join(separator));
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk("", &ChunkerConfig::default()).is_empty());
        assert!(chunk("   \n\n  ", &ChunkerConfig::default()).is_empty());
    }

    #[test]
    fn small_input_yields_single_chunk() {
        let cfg = ChunkerConfig::new(100, 10, false, None);
        let chunks = chunk("a short paragraph of text", &cfg);
        assert_eq!(chunks, vec!["a short paragraph of text".to_string()]);
    }

    #[test]
    fn oversized_separatorless_fragment_is_emitted_as_is() {
        let cfg = ChunkerConfig::new(10, 2, false, Some(vec!["\n\n".to_string()]));
        let word = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk(word, &cfg);
        assert_eq!(chunks, vec![word.to_string()]);
    }

    #[test]
    fn overlap_is_clamped_when_invalid() {
        let cfg = ChunkerConfig::new(100, 500, false, None);
        assert_eq!(cfg.chunk_overlap, 20);
        let cfg2 = ChunkerConfig::new(100, 100, false, None);
        assert_eq!(cfg2.chunk_overlap, 20);
    }

    #[test]
    fn splits_respect_chunk_size_with_word_boundaries() {
        let cfg = ChunkerConfig::new(20, 5, false, None);
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk(text, &cfg);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 20 + 5, "chunk too long: {c:?}");
        }
    }

    #[test]
    fn adjacent_chunks_share_overlap_content() {
        let cfg = ChunkerConfig::new(20, 8, false, None);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunk(text, &cfg);
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn is_deterministic_across_repeated_calls() {
        let cfg = ChunkerConfig::new(30, 5, false, None);
        let text = "The quick brown fox.\n\nJumps over the lazy dog.\n\nAnd then ran away quickly into the forest.";
        let first = chunk(text, &cfg);
        let second = chunk(text, &cfg);
        assert_eq!(first, second);
    }

    #[test]
    fn idempotent_when_overlap_is_zero_and_input_already_chunked() {
        let cfg = ChunkerConfig::new(1000, 0, false, None);
        let text = "a single short passage that fits in one chunk";
        let once = chunk(text, &cfg);
        let twice = chunk(&once.join("\n\n"), &cfg);
        assert_eq!(once, twice);
    }

    #[test]
    fn keep_separator_reattaches_separator_to_following_text() {
        let cfg = ChunkerConfig::new(5, 0, true, Some(vec!["\n".to_string(), "".to_string()]));
        let chunks = chunk("ab\ncd", &cfg);
        assert!(chunks.iter().any(|c| c.contains('\n')) || chunks.len() == 2);
    }
}
