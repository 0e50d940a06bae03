//! Semantic chunking of section text.
//!
//! Targets a token budget per chunk with paragraph, then sentence, then
//! token boundaries, and carries a configurable overlap between
//! consecutive chunks. Token counts are whitespace-word approximations,
//! which is what the downstream budget knobs are calibrated against.

use finloom::config::ChunkingConfig;
use finloom::types::Chunk;
use regex::Regex;
use std::sync::LazyLock;

static SENTENCE_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)[.!?]['")\]]*\s+"#).expect("valid regex"));
static HAS_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").expect("valid regex"));
static TABLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*\S {2,}\S.*$").expect("valid regex"));
static LIST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-•*]|\d+\.)\s+").expect("valid regex"));

/// Approximate token count of a text.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// One contiguous unit of source text with its original offsets.
#[derive(Debug, Clone)]
struct Unit {
    start: usize,
    end: usize,
    tokens: usize,
}

/// Token-budget chunker.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Chunker with the given sizes.
    pub const fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk one section's text. `chunk_index_offset` positions this
    /// section's chunks within the whole filing.
    pub fn chunk_section(
        &self,
        accession: &str,
        section_item: &str,
        section_title: &str,
        text: &str,
        chunk_index_offset: usize,
    ) -> Vec<Chunk> {
        let units = self.split_units(text);
        if units.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current: Vec<&Unit> = Vec::new();
        let mut current_tokens = 0usize;

        let flush = |current: &mut Vec<&Unit>, current_tokens: &mut usize, chunks: &mut Vec<(usize, usize)>| {
            if let (Some(first), Some(last)) = (current.first(), current.last()) {
                chunks.push((first.start, last.end));
            }
            current.clear();
            *current_tokens = 0;
        };

        let mut spans: Vec<(usize, usize)> = Vec::new();
        for unit in &units {
            let would_be = current_tokens + unit.tokens;
            if !current.is_empty()
                && (would_be > self.config.max_tokens
                    || (would_be > self.config.target_tokens && current_tokens >= self.config.min_tokens))
            {
                flush(&mut current, &mut current_tokens, &mut spans);
            }
            current.push(unit);
            current_tokens += unit.tokens;
        }
        flush(&mut current, &mut current_tokens, &mut spans);

        for (i, (start, end)) in spans.iter().enumerate() {
            let body = &text[*start..*end];
            // Overlap: prepend the tail of the previous span
            let overlap_prefix = if i > 0 {
                let (prev_start, prev_end) = spans[i - 1];
                tail_tokens(&text[prev_start..prev_end], self.config.overlap_tokens)
            } else {
                String::new()
            };
            let chunk_text = if overlap_prefix.is_empty() {
                body.to_string()
            } else {
                format!("{overlap_prefix} {body}")
            };

            chunks.push(Chunk {
                chunk_id: format!("{accession}_{section_item}_{}", chunk_index_offset + i),
                accession_number: accession.to_string(),
                section_item: section_item.to_string(),
                section_title: section_title.to_string(),
                chunk_index: chunk_index_offset + i,
                token_count: token_count(&chunk_text),
                char_start: *start,
                char_end: *end,
                contains_tables: TABLE_LINE.is_match(body),
                contains_lists: LIST_LINE.is_match(body),
                contains_numbers: HAS_NUMBER.is_match(body),
                text: chunk_text,
                embedding: None,
            });
        }
        chunks
    }

    /// Split into paragraph units; paragraphs beyond the max budget break
    /// into sentences, and oversized sentences hard-split at word windows.
    fn split_units(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut cursor = 0usize;

        for paragraph in text.split("\n\n") {
            let start = cursor;
            let end = start + paragraph.len();
            cursor = end + 2; // the separator

            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }
            let tokens = token_count(paragraph);
            if tokens <= self.config.max_tokens {
                units.push(Unit { start, end, tokens });
                continue;
            }

            // Sentence pass
            let mut sentence_start = start;
            let mut last = start;
            for m in SENTENCE_SPLIT.find_iter(paragraph) {
                let sentence_end = start + m.end();
                let sentence = &text[sentence_start..sentence_end];
                let sentence_tokens = token_count(sentence);
                if sentence_tokens > self.config.max_tokens {
                    units.extend(hard_split(text, sentence_start, sentence_end, self.config.max_tokens));
                } else {
                    units.push(Unit { start: sentence_start, end: sentence_end, tokens: sentence_tokens });
                }
                sentence_start = sentence_end;
                last = sentence_end;
            }
            if last < end {
                let rest_tokens = token_count(&text[sentence_start..end]);
                if rest_tokens > self.config.max_tokens {
                    units.extend(hard_split(text, sentence_start, end, self.config.max_tokens));
                } else if rest_tokens > 0 {
                    units.push(Unit { start: sentence_start, end, tokens: rest_tokens });
                }
            }
        }
        units
    }
}

/// Break `[start, end)` into word windows of at most `max_tokens`.
fn hard_split(text: &str, start: usize, end: usize, max_tokens: usize) -> Vec<Unit> {
    let slice = &text[start..end];
    let mut units = Vec::new();
    let mut window_start_rel: Option<usize> = None;
    let mut tokens = 0usize;
    let mut last_end_rel = 0usize;

    for (rel, word) in slice.split_whitespace().map(|w| {
        let rel = w.as_ptr() as usize - slice.as_ptr() as usize;
        (rel, w)
    }) {
        if window_start_rel.is_none() {
            window_start_rel = Some(rel);
        }
        tokens += 1;
        last_end_rel = rel + word.len();
        if tokens >= max_tokens {
            units.push(Unit {
                start: start + window_start_rel.unwrap_or(0),
                end: start + last_end_rel,
                tokens,
            });
            window_start_rel = None;
            tokens = 0;
        }
    }
    if let Some(rel) = window_start_rel {
        if tokens > 0 {
            units.push(Unit { start: start + rel, end: start + last_end_rel, tokens });
        }
    }
    units
}

/// Last `n` whitespace tokens of a text.
fn tail_tokens(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= n {
        return words.join(" ");
    }
    words[words.len() - n..].join(" ")
}
