//! Text normalisation applied before chunking.
//!
//! Converter output (OCR, Office extraction, pasted text) carries noise that
//! distorts chunk sizes and paragraph detection: CRLF endings, zero-width
//! characters, whitespace-only "blank" lines, long runs of empty lines.
//! Normalisation is deterministic and never touches visible content.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest run of consecutive blank lines kept in normalised text.
///
/// Two blank lines still read as a section break to the semantic chunker;
/// anything longer is layout noise.
pub const MAX_BLANK_LINES: usize = 2;

static RE_LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r\n?").unwrap());

/// Zero-width space/joiners, word joiner, BOM and soft hyphen.
static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{200B}-\x{200D}\x{2060}\x{FEFF}\x{00AD}]").unwrap());

/// Normalise raw document text in one pass over its lines.
///
/// * CRLF and lone CR become LF
/// * invisible characters are dropped
/// * trailing whitespace is cut from every line, so whitespace-only lines
///   count as blank
/// * runs of blank lines are capped at [`MAX_BLANK_LINES`]
/// * the result is trimmed; whitespace-only input yields `""`
pub fn normalize_text(input: &str) -> String {
    let unified = RE_LINE_BREAK.replace_all(input, "\n");
    let visible = RE_INVISIBLE.replace_all(&unified, "");

    let mut out = String::with_capacity(visible.len());
    let mut blank_run = 0usize;
    for line in visible.split('\n').map(str::trim_end) {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > MAX_BLANK_LINES {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_are_unified() {
        assert_eq!(normalize_text("a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn trailing_whitespace_goes_leading_stays() {
        assert_eq!(normalize_text("title\n  indented   \nend\t"), "title\n  indented\nend");
    }

    #[test]
    fn blank_runs_are_capped() {
        assert_eq!(normalize_text("a\n\n\n\n\n\nb"), "a\n\n\nb");
        assert_eq!(normalize_text("a\n\n\nb"), "a\n\n\nb");
        assert_eq!(normalize_text("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn invisible_characters_are_dropped() {
        let input = "so\u{200B}lar\u{FEFF} pa\u{00AD}nels\u{2060}";
        assert_eq!(normalize_text(input), "solar panels");
    }

    #[test]
    fn whitespace_only_lines_become_blank() {
        let out = normalize_text("first\r\n   \r\n\t\r\n\r\n\r\nsecond  ");
        assert_eq!(out, "first\n\n\nsecond");
    }

    #[test]
    fn whitespace_document_normalises_to_empty() {
        assert_eq!(normalize_text(" \n\t\u{200B}\n "), "");
    }
}
