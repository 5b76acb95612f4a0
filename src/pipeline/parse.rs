//! Response parsing: recover an outline JSON object from free-form model text.
//!
//! ## Why a ladder of attempts?
//!
//! Even with "respond with JSON only" in the prompt, models wrap the object
//! in ```` ```json ```` fences, prepend "Here's the outline:", append
//! commentary, or leave a trailing comma. Each rung below handles one of
//! these habits; the first rung that yields a JSON object or array wins.
//!
//! 1. the whole trimmed response
//! 2. the body of a ```` ```json ```` fence
//! 3. the body of any ```` ``` ```` fence
//! 4. the first balanced `{…}` / `[…]` span (string-aware scan)
//! 5. preface phrases and fences stripped, first `{` to last `}`
//!
//! Each candidate is also retried once with trailing commas removed.
//!
//! [`extract_json_from_response`] never fails: when every rung misses it
//! returns the canonical one-slide default. [`validate_ppt_structure`] then
//! repairs whatever schema damage is left.

use crate::output::{PptOutline, SlideType, DEFAULT_OUTLINE_TITLE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Extract, validate and return an outline object from `text`.
///
/// Total: any input, including the empty string or plain prose, produces a
/// structurally valid outline value.
pub fn extract_json_from_response(text: &str) -> Value {
    match try_extract_json(text) {
        Some(value) => validate_ppt_structure(value),
        None => {
            warn!(
                "No JSON recovered from {}-char response; using default outline",
                text.chars().count()
            );
            default_outline_value()
        }
    }
}

/// Run the extraction ladder without the default fallback.
///
/// Returns the raw (unvalidated) JSON object or array, or `None` when the
/// response contains nothing parseable.
pub fn try_extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // 1) Whole response
    if let Some(v) = parse_candidate(trimmed) {
        debug!("JSON parsed from whole response");
        return Some(v);
    }

    // 2) ```json fence
    if let Some(caps) = RE_JSON_FENCE.captures(trimmed) {
        if let Some(v) = parse_candidate(caps[1].trim()) {
            debug!("JSON parsed from ```json fence");
            return Some(v);
        }
    }

    // 3) Any fence
    for caps in RE_ANY_FENCE.captures_iter(trimmed) {
        if let Some(v) = parse_candidate(caps[1].trim()) {
            debug!("JSON parsed from generic fence");
            return Some(v);
        }
    }

    // 4) First balanced span
    if let Some(v) = first_balanced_value(trimmed) {
        debug!("JSON parsed from balanced span");
        return Some(v);
    }

    // 5) Strip prefaces and fences, slice outermost braces
    let stripped = RE_PREFACE.replace(trimmed, "");
    let stripped = RE_FENCE_MARKER.replace_all(&stripped, "");
    if let (Some(start), Some(end)) = (stripped.find('{'), stripped.rfind('}')) {
        if start < end {
            if let Some(v) = parse_candidate(&stripped[start..=end]) {
                debug!("JSON parsed after stripping preface");
                return Some(v);
            }
        }
    }

    None
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\s*json\s*\n?(.*?)```").unwrap());

static RE_ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").unwrap());

static RE_FENCE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").unwrap());

static RE_PREFACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:here(?:'s| is) (?:the|your) (?:json|outline|updated outline|result)[^:\n]*:?|sure[,!.]?[^\n{]*|以下是[^\n{]*|这是[^\n{]*|好的[，,。！!]?[^\n{]*)",
    )
    .unwrap()
});

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Parse a candidate, accepting only objects and arrays.
fn parse_candidate(s: &str) -> Option<Value> {
    let accept = |v: Value| matches!(v, Value::Object(_) | Value::Array(_)).then_some(v);
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return accept(v);
    }
    let repaired = RE_TRAILING_COMMA.replace_all(s, "$1");
    if repaired != s {
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            return accept(v);
        }
    }
    None
}

/// Try every `{` / `[` in order (up to a bound) and parse the balanced span
/// that starts there.
///
/// Arrays only count when they look like a slide list, so bracketed prose
/// such as a `[1]` citation does not hide the object that follows it.
fn first_balanced_value(s: &str) -> Option<Value> {
    const MAX_STARTS: usize = 32;
    s.char_indices()
        .filter(|&(_, c)| c == '{' || c == '[')
        .take(MAX_STARTS)
        .filter_map(|(start, _)| balanced_span(&s[start..]))
        .filter_map(parse_candidate)
        .find(|v| match v {
            Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_object),
            _ => true,
        })
}

/// The shortest prefix of `s` (which starts with `{` or `[`) whose brackets
/// balance, ignoring brackets inside string literals.
fn balanced_span(s: &str) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&s[..i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Schema validation ────────────────────────────────────────────────────────

/// The canonical one-slide outline returned when nothing usable was found.
pub fn default_outline_value() -> Value {
    json!({
        "title": DEFAULT_OUTLINE_TITLE,
        "total_pages": 1,
        "slides": [{
            "page_number": 1,
            "title": "标题页",
            "content_points": ["演示标题"],
            "slide_type": "title",
            "description": "PPT标题页"
        }]
    })
}

/// Fill, coerce and clamp an outline value into the expected schema.
///
/// Total and idempotent: `validate(validate(x)) == validate(x)` for all `x`.
///
/// * a bare array is taken as the slide list
/// * any other non-object becomes [`default_outline_value`]
/// * `title` defaults to [`DEFAULT_OUTLINE_TITLE`]
/// * `slides` is coerced to a list of objects
/// * per slide: positive `page_number` (sequential when missing, full
///   renumbering on duplicates), non-empty `title`, `content_points` list of
///   strings, `slide_type` within `title|content|conclusion`, string
///   `description`, object-or-absent `chart_config`
/// * `total_pages = len(slides)`
pub fn validate_ppt_structure(value: Value) -> Value {
    let mut obj = match value {
        Value::Object(map) => map,
        Value::Array(slides) => {
            let mut map = Map::new();
            map.insert("slides".into(), Value::Array(slides));
            map
        }
        _ => return default_outline_value(),
    };

    let title = match obj.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => DEFAULT_OUTLINE_TITLE.to_string(),
    };

    let raw_slides = match obj.remove("slides") {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let mut slides: Vec<Map<String, Value>> = raw_slides
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .enumerate()
        .map(|(i, slide)| validate_slide(slide, i + 1))
        .collect();

    let mut seen = HashSet::new();
    let duplicates = slides
        .iter()
        .filter_map(|s| s.get("page_number").and_then(Value::as_u64))
        .any(|n| !seen.insert(n));
    if duplicates {
        for (i, slide) in slides.iter_mut().enumerate() {
            slide.insert("page_number".into(), json!(i + 1));
        }
    }

    if !matches!(obj.get("page_count_mode"), None | Some(Value::String(_))) {
        obj.remove("page_count_mode");
    }

    obj.insert("title".into(), Value::String(title));
    obj.insert("total_pages".into(), json!(slides.len()));
    obj.insert(
        "slides".into(),
        Value::Array(slides.into_iter().map(Value::Object).collect()),
    );
    Value::Object(obj)
}

fn positive_integer(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 1.0).map(|f| f as u64))
            .filter(|&n| n > 0),
        Value::String(s) => s.trim().parse::<u64>().ok().filter(|&n| n > 0),
        _ => None,
    }
}

fn validate_slide(mut slide: Map<String, Value>, position: usize) -> Map<String, Value> {
    let page_number = slide
        .get("page_number")
        .and_then(positive_integer)
        .unwrap_or(position as u64);
    slide.insert("page_number".into(), json!(page_number));

    let title = match slide.get("title") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("第{page_number}页"),
    };
    slide.insert("title".into(), Value::String(title));

    let points = match slide.remove("content_points") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(Value::String(s)),
                Value::Null => None,
                other => Some(Value::String(other.to_string())),
            })
            .collect(),
        _ => Vec::new(),
    };
    slide.insert("content_points".into(), Value::Array(points));

    let slide_type = slide
        .get("slide_type")
        .and_then(Value::as_str)
        .map(SlideType::from_tag)
        .unwrap_or_default();
    slide.insert("slide_type".into(), json!(slide_type.as_str()));

    if !matches!(slide.get("description"), Some(Value::String(_))) {
        slide.insert("description".into(), Value::String(String::new()));
    }

    if !matches!(slide.get("chart_config"), Some(Value::Object(_))) {
        slide.remove("chart_config");
    }

    slide
}

/// Validate `value` and convert it into a typed [`PptOutline`].
///
/// `fallback_mode` is used when the value carries no `page_count_mode`.
pub fn outline_from_value(value: Value, fallback_mode: &str) -> PptOutline {
    let mut validated = validate_ppt_structure(value);
    if let Value::Object(map) = &mut validated {
        map.entry("page_count_mode")
            .or_insert_with(|| Value::String(fallback_mode.to_string()));
    }
    match serde_json::from_value::<PptOutline>(validated) {
        Ok(outline) => outline,
        Err(e) => {
            warn!("Validated outline failed to deserialise ({e}); using default");
            default_outline(fallback_mode)
        }
    }
}

/// The canonical default as a typed outline.
pub fn default_outline(page_count_mode: &str) -> PptOutline {
    let mut value = default_outline_value();
    value["page_count_mode"] = Value::String(page_count_mode.to_string());
    serde_json::from_value(value).unwrap_or_else(|_| PptOutline {
        title: DEFAULT_OUTLINE_TITLE.to_string(),
        total_pages: 0,
        page_count_mode: page_count_mode.to_string(),
        slides: Vec::new(),
    })
}
