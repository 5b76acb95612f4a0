//! Document chunking: split normalised text into ordered, overlapping chunks.
//!
//! Every size here is measured in characters (Unicode scalar values), not
//! bytes: CJK documents would otherwise get chunks a third of the intended
//! length.
//!
//! ## Overlap
//!
//! Whatever the strategy, chunk `i > 0` starts with the last `chunk_overlap`
//! characters of chunk `i - 1` (or all of it when it is shorter). The refine
//! prompt sees one chunk at a time; the repeated tail lets the model notice
//! that a sentence or list continues across the boundary.

use crate::config::{ChunkStrategy, ProcessingConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Approximate characters per token used by [`ChunkStrategy::Fast`].
pub const FAST_CHARS_PER_TOKEN: usize = 4;

/// Chunker bound to one set of chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentChunker {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: ChunkStrategy,
    pub max_tokens: Option<usize>,
}

impl DocumentChunker {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            strategy: config.chunk_strategy,
            max_tokens: Some(config.max_tokens),
        }
    }

    /// Split `text` into chunks. Empty or whitespace-only text yields none.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(
            text,
            self.chunk_size,
            self.chunk_overlap,
            self.strategy,
            self.max_tokens,
        )
    }
}

/// Split `text` into an ordered sequence of chunks.
///
/// Returns an empty vector for empty or whitespace-only input and at least
/// one chunk otherwise.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkStrategy,
    max_tokens: Option<usize>,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let size = chunk_size.max(1);

    let bodies = match strategy {
        ChunkStrategy::Paragraph => paragraph_chunks(text, size),
        ChunkStrategy::Recursive => recursive_split(text, size, SEPARATORS),
        ChunkStrategy::Hybrid => hybrid_chunks(text, size),
        ChunkStrategy::Semantic => semantic_chunks(text, size),
        ChunkStrategy::Fast => {
            let budget = max_tokens
                .map(|t| t.saturating_mul(FAST_CHARS_PER_TOKEN))
                .unwrap_or(size)
                .max(1);
            fast_chunks(text, budget)
        }
    };

    let chunks = apply_overlap(bodies, chunk_overlap);
    debug!(
        "Chunked {} chars into {} chunks ({:?}, size {}, overlap {})",
        char_len(text),
        chunks.len(),
        strategy,
        size,
        chunk_overlap
    );
    chunks
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The last `n` characters of `s` (all of `s` when shorter).
pub(crate) fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// The first `n` characters of `s` (all of `s` when shorter).
pub(crate) fn head_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn push_trimmed(out: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
}

fn apply_overlap(bodies: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 {
        return bodies;
    }
    let mut out: Vec<String> = Vec::with_capacity(bodies.len());
    for body in bodies {
        let chunk = match out.last() {
            Some(prev) => format!("{}\n{}", tail_chars(prev, overlap), body),
            None => body,
        };
        out.push(chunk);
    }
    out
}

/// Greedy packer joining units with a blank line while they fit.
struct Packer {
    size: usize,
    out: Vec<String>,
    buf: String,
    buf_len: usize,
}

impl Packer {
    const JOIN: &'static str = "\n\n";

    fn new(size: usize) -> Self {
        Self {
            size,
            out: Vec::new(),
            buf: String::new(),
            buf_len: 0,
        }
    }

    /// Append a unit, starting a new chunk when it would overflow.
    fn push(&mut self, unit: &str) {
        let len = char_len(unit);
        if self.buf.is_empty() {
            self.buf.push_str(unit);
            self.buf_len = len;
        } else if self.buf_len + Self::JOIN.len() + len <= self.size {
            self.buf.push_str(Self::JOIN);
            self.buf.push_str(unit);
            self.buf_len += Self::JOIN.len() + len;
        } else {
            self.flush();
            self.buf.push_str(unit);
            self.buf_len = len;
        }
    }

    /// Emit a finished chunk as-is, after whatever is buffered.
    fn emit(&mut self, chunk: String) {
        self.flush();
        push_trimmed(&mut self.out, &chunk);
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            push_trimmed(&mut self.out, &self.buf);
            self.buf.clear();
            self.buf_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.out
    }
}

// ── Paragraph ────────────────────────────────────────────────────────────────

static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

fn split_paragraphs(text: &str) -> Vec<&str> {
    RE_PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn paragraph_chunks(text: &str, size: usize) -> Vec<String> {
    let mut packer = Packer::new(size);
    for para in split_paragraphs(text) {
        packer.push(para);
    }
    packer.finish()
}

// ── Recursive ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Separator {
    Literal(&'static str),
    Sentence,
    Whitespace,
}

const SEPARATORS: &[Separator] = &[
    Separator::Literal("\n\n"),
    Separator::Literal("\n"),
    Separator::Sentence,
    Separator::Whitespace,
];

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | '；')
}

impl Separator {
    /// Split keeping each separator attached to the piece before it, so the
    /// pieces concatenate back to the input.
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self {
            Self::Literal(sep) => text.split_inclusive(*sep).collect(),
            Self::Sentence => text.split_inclusive(is_sentence_end).collect(),
            Self::Whitespace => text.split_inclusive(char::is_whitespace).collect(),
        }
    }
}

fn recursive_split(text: &str, size: usize, seps: &[Separator]) -> Vec<String> {
    let mut out = Vec::new();
    if char_len(text) <= size {
        push_trimmed(&mut out, text);
        return out;
    }
    let Some((sep, rest)) = seps.split_first() else {
        // Atomic text longer than the budget: emitted whole.
        push_trimmed(&mut out, text);
        return out;
    };

    let pieces = sep.split(text);
    if pieces.len() <= 1 {
        return recursive_split(text, size, rest);
    }

    let mut buf = String::new();
    let mut buf_len = 0usize;
    for piece in pieces {
        let len = char_len(piece);
        if len > size {
            push_trimmed(&mut out, &buf);
            buf.clear();
            buf_len = 0;
            out.extend(recursive_split(piece, size, rest));
        } else if buf_len + len > size {
            push_trimmed(&mut out, &buf);
            buf.clear();
            buf.push_str(piece);
            buf_len = len;
        } else {
            buf.push_str(piece);
            buf_len += len;
        }
    }
    push_trimmed(&mut out, &buf);
    out
}

// ── Hybrid ───────────────────────────────────────────────────────────────────

fn hybrid_chunks(text: &str, size: usize) -> Vec<String> {
    let mut packer = Packer::new(size);
    for para in split_paragraphs(text) {
        if char_len(para) > size {
            for piece in recursive_split(para, size, SEPARATORS) {
                packer.emit(piece);
            }
        } else {
            packer.push(para);
        }
    }
    packer.finish()
}

// ── Semantic ─────────────────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:#{1,6}\s+\S.*|第[一二三四五六七八九十百零〇\d]+[章节部篇].*|\d+(?:\.\d+)+\s+\S[^。.!?！？]{0,60}|[一二三四五六七八九十]+、\S.{0,40})$",
    )
    .unwrap()
});

fn is_heading(line: &str) -> bool {
    RE_HEADING.is_match(line.trim())
}

/// Split into sections, each starting at a heading line. Text before the
/// first heading forms its own section.
fn split_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if is_heading(line) && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current);
    }
    sections
}

fn semantic_chunks(text: &str, size: usize) -> Vec<String> {
    if !text.lines().any(is_heading) {
        return paragraph_chunks(text, size);
    }
    let mut packer = Packer::new(size);
    for section in split_sections(text) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }
        if char_len(section) > size {
            for piece in paragraph_chunks(section, size) {
                packer.emit(piece);
            }
        } else {
            packer.push(section);
        }
    }
    packer.finish()
}

// ── Fast ─────────────────────────────────────────────────────────────────────

fn fast_chunks(text: &str, budget: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < chars.len() {
        let mut end = (pos + budget).min(chars.len());
        if end < chars.len() {
            // Prefer a line break within the last tenth of the window.
            let floor = end - (budget / 10).min(end - pos - 1);
            if let Some(k) = (floor..end).rev().find(|&k| chars[k] == '\n') {
                end = k + 1;
            }
        }
        let piece: String = chars[pos..end].iter().collect();
        push_trimmed(&mut out, &piece);
        pos = end;
    }
    out
}
