//! Error types for the edgequake-outline library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OutlineError`] — **Fatal**: the generation cannot proceed at all
//!   (empty document, recursion ceiling hit, provider not configured).
//!   Returned as `Err(OutlineError)` from the top-level `generate*` functions.
//!
//! * [`SkipReason`] — **Non-fatal**: a single refine step failed (transient
//!   API error that outlived its retries, unparsable model output) but the
//!   running outline is intact. The workflow logs it, records it in
//!   [`crate::output::GenerationOutput::skipped`], and moves on to the next
//!   chunk.
//!
//! JSON parse and schema problems never show up here at all: the response
//! parser repairs or replaces malformed output in place.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-outline library.
#[derive(Debug, Error)]
pub enum OutlineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document produced no chunks (empty or whitespace-only text).
    #[error("Document '{source_name}' has no content to outline.\nProvide non-empty text or check the converter output.")]
    Chunking { source_name: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Reading or decoding the input file failed.
    #[error("Failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Workflow errors ───────────────────────────────────────────────────
    /// The workflow needed more transitions than the configured ceiling.
    #[error(
        "Workflow exceeded its recursion limit of {limit} steps ({chunks} chunks).\n\
Raise --recursion-limit or increase --chunk-size so the document yields fewer chunks."
    )]
    RecursionLimitExceeded { limit: usize, chunks: usize },

    /// The caller aborted the workflow through its [`crate::workflow::AbortHandle`].
    #[error("Outline generation was cancelled after {steps} steps")]
    Cancelled { steps: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a refine step left the outline untouched.
///
/// Produced by [`crate::pipeline::refine::refine`]; the workflow branches on
/// it instead of unwinding, so the cursor always advances past the chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum SkipReason {
    /// The LLM call failed after all retries.
    #[error("chunk {chunk}: LLM call failed after {attempts} attempts: {detail}")]
    LlmFailed {
        chunk: usize,
        attempts: u32,
        detail: String,
    },

    /// No JSON could be recovered from the model's response.
    #[error("chunk {chunk}: response contained no recoverable JSON")]
    UnparsableResponse { chunk: usize },

    /// The recovered outline had no slides; keeping the previous one.
    #[error("chunk {chunk}: refined outline has no slides")]
    EmptyOutline { chunk: usize },
}

/// Failures of a single LLM completion.
///
/// Retried by [`crate::pipeline::retry`]; only the last one of a step is
/// ever looked at.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// The provider returned an error (HTTP, auth, rate limit, …).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider answered with an empty body.
    #[error("empty completion")]
    EmptyResponse,
}

/// Content-cache failures. Never escape [`crate::cache::ContentCache`]'s
/// lookup path: a broken entry is deleted and reported as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry {hash}: {detail}")]
    Corrupt { hash: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursion_limit_display_is_actionable() {
        let e = OutlineError::RecursionLimitExceeded {
            limit: 100,
            chunks: 240,
        };
        let msg = e.to_string();
        assert!(msg.contains("100"), "got: {msg}");
        assert!(msg.contains("240 chunks"));
        assert!(msg.contains("--recursion-limit"));
    }

    #[test]
    fn chunking_display_names_source() {
        let e = OutlineError::Chunking {
            source_name: "report.txt".into(),
        };
        assert!(e.to_string().contains("report.txt"));
    }

    #[test]
    fn skip_reason_display() {
        let e = SkipReason::LlmFailed {
            chunk: 4,
            attempts: 3,
            detail: "timeout".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 4"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn skip_reason_serialises() {
        let e = SkipReason::EmptyOutline { chunk: 2 };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("EmptyOutline"));
    }
}
