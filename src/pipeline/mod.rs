//! Pipeline stages for outline generation.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own with a scripted [`llm::OutlineLlm`].
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ normalize ──▶ chunk ──▶ structure ──▶ bootstrap ──▶ refine × (n-1)
//!                                  (chunk 0)     (chunk 0)     (chunks 1..n)
//! ```
//!
//! 1. [`normalize`] — deterministic cleanup of converter output
//! 2. [`chunk`]     — split the text into ordered chunks (five strategies)
//! 3. [`structure`] — one LLM call describing the document; never fails
//! 4. [`bootstrap`] — first outline from the structure and chunk 0; never fails
//! 5. [`refine`]    — fold each further chunk into the outline; a failure
//!    skips the chunk
//!
//! [`parse`] repairs and validates every model response; [`retry`] and
//! [`llm`] wrap the model calls. The sequencing itself lives in
//! [`crate::workflow`].

pub mod bootstrap;
pub mod chunk;
pub mod llm;
pub mod normalize;
pub mod parse;
pub mod refine;
pub mod retry;
pub mod structure;
