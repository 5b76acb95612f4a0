//! # edgequake-outline
//!
//! Turn long documents into structured presentation outlines with an LLM.
//!
//! ## Why iterative refinement?
//!
//! A 200-page report does not fit in one prompt, and summarising it chunk by
//! chunk loses the global shape of the deck. This crate instead keeps one
//! running outline and folds the document into it a chunk at a time: the model
//! always sees the *whole* current outline plus the *next* piece of text, and
//! returns the complete updated outline.
//!
//! ## Pipeline Overview
//!
//! ```text
//! text / file
//!  │
//!  ├─ 1. Ingest     convert + cache file content (MD5-keyed, 7-day TTL)
//!  ├─ 2. Normalize  line endings, invisible chars, blank-line runs
//!  ├─ 3. Chunk      paragraph / semantic / recursive / hybrid / fast
//!  ├─ 4. Analyze    document structure from chunk 0
//!  ├─ 5. Bootstrap  first outline from structure + chunk 0
//!  ├─ 6. Refine     one LLM call per further chunk; failures skip the chunk
//!  └─ 7. Output     validated PptOutline + run stats
//! ```
//!
//! Model responses are never trusted: every one goes through a JSON repair
//! ladder and a schema validator before it touches the outline.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_outline::{OutlineGenerator, PageCountMode, ProcessingConfig, ProjectContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider credentials come from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = ProcessingConfig::builder().slides(6, 15).build()?;
//!     let generator = OutlineGenerator::new(config)?;
//!
//!     let project = ProjectContext::new("Annual results")
//!         .with_audience("board members")
//!         .with_page_count(PageCountMode::Fixed { pages: 10 });
//!     let output = generator
//!         .generate_from_file("report.md", project, None)
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&output.outline)?);
//!     eprintln!("{} chunks, {} skipped", output.stats.chunks, output.stats.skipped_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `outline` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-outline = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{CacheMetadata, CacheStats, ContentCache};
pub use config::{
    CacheConfig, ChunkStrategy, LlmProviderKind, PageCountMode, ProcessingConfig,
    ProcessingConfigBuilder, ProjectContext, TerminalTagging,
};
pub use error::{CacheError, LlmError, OutlineError, SkipReason};
pub use generate::{generate_outline, generate_outline_sync, shared_clients, OutlineGenerator};
pub use ingest::{ConvertedDocument, DocumentConverter, PlainTextConverter};
pub use output::{GenerationOutput, GenerationStats, PptOutline, SlideInfo, SlideType};
pub use pipeline::chunk::{chunk_text, DocumentChunker};
pub use pipeline::llm::{ClientKey, EdgequakeLlm, LlmClientCache, LlmInvoker, OutlineLlm};
pub use pipeline::parse::{extract_json_from_response, validate_ppt_structure};
pub use pipeline::retry::{execute_with_fallback, execute_with_retry, RetryPolicy};
pub use progress::{NoopProgressCallback, ProgressCallback, WorkflowProgressCallback};
pub use workflow::{AbortHandle, WorkflowEngine, WorkflowState, WorkflowStep};
