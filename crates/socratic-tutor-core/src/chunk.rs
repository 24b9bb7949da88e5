//! Heading-aware text chunker.
//!
//! Splits extracted document text into [`Chunk`]s that are bounded in size
//! and tagged with the nearest preceding section heading. Structured
//! documents (statutes, amendment acts, syllabi) phrase their headings
//! predictably, so the heading text is folded into every chunk beneath it
//! as a `"Regarding {heading}: "` prefix.
//!
//! # Algorithm
//!
//! 1. Split the text into lines and drop blank lines.
//! 2. Classify each line as a heading if any [`HeadingPatterns`] regex
//!    matches it; everything else is body text.
//! 3. Body lines accumulate, space-separated, into a paragraph buffer.
//! 4. On a heading, a non-empty buffer is finalized under the *previous*
//!    heading: split with the [`TextSplitter`] and prefixed. The buffer is
//!    then cleared and the new heading becomes current.
//! 5. The trailing buffer is finalized the same way.
//! 6. If no heading was detected at all, or the heading pass yields no
//!    chunks, the raw text is split as-is with no prefix.
//!
//! Two headings in a row produce no chunk for the first one; only the
//! second is carried forward. Empty input produces no chunks.
//!
//! # Example
//!
//! ```rust
//! use socratic_tutor_core::chunk::{HeadingChunker, HeadingPatterns};
//!
//! let chunker = HeadingChunker::new(HeadingPatterns::legal(), 1000, 100);
//! let chunks = chunker.chunk("act.pdf", "Amendment of section 183.\nThe fine is Rs 1000.\n");
//! assert_eq!(chunks.len(), 1);
//! assert!(chunks[0].text.starts_with("Regarding Amendment of section 183.: The fine is Rs 1000."));
//! ```

use std::collections::VecDeque;

use regex::Regex;

use crate::models::Chunk;

/// Heading patterns for amendment acts ("legal" profile).
pub const LEGAL_HEADING_PATTERNS: &[&str] = &[
    r"(?i)^(?:\d+[A-Z]?\.\s*)?amendment\s+of\s+sections?\s+\d+[A-Z]*",
    r"(?i)^(?:\d+[A-Z]?\.\s*)?insertion\s+of\s+new\s+sections?\s+\d+[A-Z]*",
    r"(?i)^(?:\d+[A-Z]?\.\s*)?substitution\s+of\s+new\s+sections?\s+for\s+sections?\s+\d+[A-Z]*",
];

/// Default target chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Separators tried in order, coarsest first. The empty separator splits
/// between characters and is only reached for unbroken runs of text.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// An injectable list of heading matchers for one document type.
#[derive(Debug, Clone, Default)]
pub struct HeadingPatterns {
    patterns: Vec<Regex>,
}

impl HeadingPatterns {
    /// Compile a pattern list. Fails on the first invalid regex.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// The built-in amendment-act profile.
    pub fn legal() -> Self {
        Self::from_patterns(LEGAL_HEADING_PATTERNS).expect("built-in heading patterns compile")
    }

    /// A profile that never matches; every document takes the fallback path.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_heading(&self, line: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(line))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Fixed-size recursive character splitter with overlap.
///
/// Text is split on the coarsest separator present, and the pieces are
/// greedily merged back up to `chunk_size` characters, carrying up to
/// `chunk_overlap` characters of trailing context into the next chunk.
/// Pieces still too large are split again with the next finer separator,
/// so chunk boundaries land between words whenever a word boundary exists.
///
/// Lengths are counted in `char`s, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_size` is raised to at least 1 and `chunk_overlap` is clamped
    /// below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Same overlap, different size.
    pub fn with_size(&self, chunk_size: usize) -> Self {
        Self::new(chunk_size, self.chunk_overlap)
    }

    /// Split `text` into trimmed, non-empty pieces of at most `chunk_size` chars.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in splits {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                out.extend(self.merge(&small, separator));
                small.clear();
            }
            if finer.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_with(piece, finer));
            }
        }
        if !small.is_empty() {
            out.extend(self.merge(&small, separator));
        }
        out
    }

    /// Greedily join pieces up to `chunk_size`, keeping an overlap window.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut docs, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let had_more = window.len() > 1;
                    match window.pop_front() {
                        Some(front) => {
                            let dropped = char_len(front) + if had_more { sep_len } else { 0 };
                            total = total.saturating_sub(dropped);
                        }
                        None => {
                            total = 0;
                            break;
                        }
                    }
                }
            }
            window.push_back(piece);
            total += len + if window.len() > 1 { sep_len } else { 0 };
        }
        push_joined(&mut docs, &window, separator);
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(docs: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// Splits document text into heading-prefixed chunks.
#[derive(Debug, Clone)]
pub struct HeadingChunker {
    patterns: HeadingPatterns,
    splitter: TextSplitter,
}

impl HeadingChunker {
    pub fn new(patterns: HeadingPatterns, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            patterns,
            splitter: TextSplitter::new(chunk_size, chunk_overlap),
        }
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Chunk `text` for the document `source_id`.
    ///
    /// Indices are contiguous from 0 and ids are deterministic, so chunking
    /// the same text twice yields identical chunks.
    pub fn chunk(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        let mut pieces: Vec<(Option<String>, String)> = Vec::new();
        let mut current_heading = String::new();
        let mut paragraph = String::new();
        let mut headings_seen = 0usize;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.patterns.is_heading(line) {
                headings_seen += 1;
                if !paragraph.is_empty() {
                    self.finalize(&current_heading, &paragraph, &mut pieces);
                    paragraph.clear();
                }
                current_heading = line.to_string();
            } else {
                if !paragraph.is_empty() {
                    paragraph.push(' ');
                }
                paragraph.push_str(line);
            }
        }
        if !paragraph.is_empty() {
            self.finalize(&current_heading, &paragraph, &mut pieces);
        }

        if headings_seen == 0 || pieces.is_empty() {
            return self.fallback(source_id, text);
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(i, (heading, body))| Chunk::new(source_id, i as i64, &body, heading.as_deref()))
            .collect()
    }

    /// Plain fixed-size split of the raw text, no heading prefix.
    pub fn fallback(&self, source_id: &str, text: &str) -> Vec<Chunk> {
        self.splitter
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(i, body)| Chunk::new(source_id, i as i64, &body, None))
            .collect()
    }

    fn finalize(&self, heading: &str, body: &str, out: &mut Vec<(Option<String>, String)>) {
        if heading.is_empty() {
            for piece in self.splitter.split(body) {
                out.push((None, piece));
            }
            return;
        }

        // Every piece under a heading carries the prefix, so the body gets
        // the room left after it (never less than a quarter chunk).
        let prefix = format!("Regarding {}: ", heading);
        let size = self.splitter.chunk_size();
        let budget = size.saturating_sub(char_len(&prefix)).max(size / 4).max(1);
        for piece in self.splitter.with_size(budget).split(body) {
            out.push((Some(heading.to_string()), format!("{}{}", prefix, piece)));
        }
    }
}

impl Default for HeadingChunker {
    fn default() -> Self {
        Self::new(
            HeadingPatterns::legal(),
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn legal_patterns_match_amendment_headings() {
        let p = HeadingPatterns::legal();
        assert_eq!(p.len(), 3);
        assert!(p.is_heading("Amendment of section 183."));
        assert!(p.is_heading("12. Amendment of section 2."));
        assert!(p.is_heading("Insertion of new section 2A."));
        assert!(p.is_heading("Substitution of new section for section 182."));
        assert!(!p.is_heading("The fine is Rs 1000."));
        assert!(!p.is_heading("See the amendment of section 12 below."));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(HeadingPatterns::from_patterns(["(unclosed"]).is_err());
    }

    #[test]
    fn single_heading_scenario() {
        let chunker = HeadingChunker::default();
        let chunks = chunker.chunk("X.pdf", "Amendment of section 183.\nThe fine is Rs 1000.\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "Regarding Amendment of section 183.: The fine is Rs 1000."
        );
        assert_eq!(
            chunks[0].heading_context.as_deref(),
            Some("Amendment of section 183.")
        );
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[0].source_id, "X.pdf");
    }

    #[test]
    fn body_before_first_heading_has_no_prefix() {
        let chunker = HeadingChunker::default();
        let text = "THE MOTOR VEHICLES ACT\nAn Act to amend.\nAmendment of section 2.\nIn section 2, for clause (a) substitute.";
        let chunks = chunker.chunk("mva.pdf", text);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "THE MOTOR VEHICLES ACT An Act to amend.");
        assert_eq!(chunks[0].heading_context, None);
        assert!(chunks[1]
            .text
            .starts_with("Regarding Amendment of section 2.: In section 2"));
    }

    #[test]
    fn consecutive_headings_carry_only_the_last() {
        let chunker = HeadingChunker::default();
        let text = "Amendment of section 1.\nAmendment of section 2.\nBody for two.";
        let chunks = chunker.chunk("a.pdf", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "Regarding Amendment of section 2.: Body for two."
        );
    }

    #[test]
    fn every_chunk_under_a_long_section_carries_the_heading() {
        let chunker = HeadingChunker::new(HeadingPatterns::legal(), 200, 30);
        let text = format!(
            "Insertion of new section 2A.\n{}\nAmendment of section 3.\nShort body.",
            words(120)
        );
        let chunks = chunker.chunk("a.pdf", &text);
        assert!(chunks.len() > 2);
        let (first, last) = chunks.split_at(chunks.len() - 1);
        for c in first {
            assert!(c.text.starts_with("Regarding Insertion of new section 2A.: "));
            assert!(c.text.chars().count() <= 200, "{}", c.text.len());
        }
        assert_eq!(
            last[0].text,
            "Regarding Amendment of section 3.: Short body."
        );
    }

    #[test]
    fn no_headings_equals_fallback_split() {
        let chunker = HeadingChunker::new(HeadingPatterns::legal(), 120, 20);
        let text = format!("{}\n\n{}\n{}", words(30), words(10), words(25));
        let chunks = chunker.chunk("plain.pdf", &text);
        let expected = chunker.splitter().split(&text);
        assert_eq!(
            chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>(),
            expected
        );
        for c in &chunks {
            assert!(c.heading_context.is_none());
            assert!(c.text.chars().count() <= 120 + 20);
        }
    }

    #[test]
    fn headings_only_falls_back_to_raw_text() {
        let chunker = HeadingChunker::default();
        let text = "Amendment of section 1.\nAmendment of section 2.";
        let chunks = chunker.chunk("a.pdf", text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert!(chunks[0].heading_context.is_none());
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        let chunker = HeadingChunker::default();
        assert!(chunker.chunk("a.pdf", "").is_empty());
        assert!(chunker.chunk("a.pdf", "  \n\n \n").is_empty());
    }

    #[test]
    fn splitter_respects_size_and_overlaps() {
        let splitter = TextSplitter::new(50, 15);
        let text = words(60);
        let pieces = splitter.split(&text);
        assert!(pieces.len() > 1);
        for p in &pieces {
            assert!(p.chars().count() <= 50);
        }
        // Adjacent pieces share their boundary word.
        for pair in pieces.windows(2) {
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(pair[1].contains(last_word));
        }
        // No word is cut in half.
        for p in &pieces {
            for w in p.split_whitespace() {
                assert!(w.starts_with("word"));
            }
        }
    }

    #[test]
    fn splitter_prefers_paragraph_boundaries() {
        let splitter = TextSplitter::new(40, 0);
        let pieces = splitter.split("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(
            pieces,
            vec![
                "First paragraph here.".to_string(),
                "Second paragraph here.".to_string()
            ]
        );
    }

    #[test]
    fn splitter_hard_splits_unbroken_runs() {
        let splitter = TextSplitter::new(10, 2);
        let text = "x".repeat(35);
        let pieces = splitter.split(&text);
        assert!(pieces.len() >= 4);
        for p in &pieces {
            assert!(p.chars().count() <= 10);
        }
    }

    #[test]
    fn splitter_handles_multibyte_text() {
        let splitter = TextSplitter::new(8, 2);
        let text = "┌──────────────────┐ │ Hello wörld │ └──────────────────┘";
        let pieces = splitter.split(text);
        assert!(!pieces.is_empty());
        for p in &pieces {
            assert!(p.chars().count() <= 8);
        }
    }

    #[test]
    fn overlap_is_clamped_below_size() {
        let s = TextSplitter::new(10, 50);
        assert_eq!(s.chunk_overlap(), 9);
        let s = TextSplitter::new(0, 0);
        assert_eq!(s.chunk_size(), 1);
    }

    #[test]
    fn deterministic_output() {
        let chunker = HeadingChunker::new(HeadingPatterns::legal(), 80, 10);
        let text = format!("Amendment of section 5.\n{}", words(40));
        let a = chunker.chunk("d.pdf", &text);
        let b = chunker.chunk("d.pdf", &text);
        assert_eq!(a, b);
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.sequence_index, i as i64);
        }
    }
}
