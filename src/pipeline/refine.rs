//! Folding one more chunk into the running outline.
//!
//! A refine step that fails does not abort the run. [`refine`] returns the
//! reason as a [`SkipReason`]; the workflow records it, keeps the previous
//! outline and moves on to the next chunk.
//!
//! ## Running Context
//!
//! Between steps the engine keeps a short rolling window of source text so
//! the model sees what came just before the current chunk. After every
//! refine step (successful or skipped) the window gains the last
//! [`CONTEXT_TAIL_CHARS`] characters of the consumed chunk and is cut back to
//! its most recent [`CONTEXT_MAX_CHARS`].

use crate::error::SkipReason;
use crate::output::PptOutline;
use crate::pipeline::chunk::tail_chars;
use crate::pipeline::llm::LlmInvoker;
use crate::pipeline::parse::{outline_from_value, try_extract_json, validate_ppt_structure};
use crate::prompts::{refine_prompt, RefinePromptInput, OUTLINE_SYSTEM_PROMPT};
use serde_json::Value;
use tracing::debug;

/// Characters of each consumed chunk appended to the running context.
pub const CONTEXT_TAIL_CHARS: usize = 300;

/// Upper bound on the running context.
pub const CONTEXT_MAX_CHARS: usize = 2000;

/// Ask the model for an updated outline covering one more chunk.
///
/// `input.chunk_number` is the 0-based index of the chunk in the document; it
/// is what [`SkipReason`] reports. The prompt shows it 1-based.
pub async fn refine(invoker: &LlmInvoker, input: &RefinePromptInput<'_>) -> Result<Value, SkipReason> {
    let chunk = input.chunk_number;
    let shown = RefinePromptInput {
        chunk_number: chunk + 1,
        ..*input
    };
    let prompt = refine_prompt(&shown);

    let text = invoker
        .invoke("refine_outline", OUTLINE_SYSTEM_PROMPT, &prompt)
        .await
        .map_err(|e| SkipReason::LlmFailed {
            chunk,
            attempts: invoker.policy().attempts(),
            detail: e.to_string(),
        })?;

    let raw = try_extract_json(&text).ok_or(SkipReason::UnparsableResponse { chunk })?;
    let validated = validate_ppt_structure(raw);
    let slides = validated["slides"].as_array().map_or(0, Vec::len);
    if slides == 0 {
        return Err(SkipReason::EmptyOutline { chunk });
    }
    debug!("Chunk {}: refined outline has {} slides", chunk, slides);
    Ok(validated)
}

/// Replace the outline wholesale with a refined value.
///
/// `page_count_mode` only changes when the refined value carries one.
pub fn apply_refinement(outline: &mut PptOutline, refined: Value) {
    *outline = outline_from_value(refined, &outline.page_count_mode);
}

/// Extend the running context with the tail of `chunk`, keeping it bounded.
pub fn extend_context(context: &str, chunk: &str) -> String {
    let tail = tail_chars(chunk, CONTEXT_TAIL_CHARS);
    let mut extended = String::with_capacity(context.len() + tail.len() + 1);
    extended.push_str(context);
    if !extended.is_empty() {
        extended.push('\n');
    }
    extended.push_str(tail);
    tail_chars(&extended, CONTEXT_MAX_CHARS).to_string()
}
