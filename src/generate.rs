//! Outline generation entry points.
//!
//! [`OutlineGenerator`] owns everything a request needs: the validated
//! config, the LLM clients resolved from the shared [`LlmClientCache`], and
//! optionally a [`ContentCache`] plus a [`DocumentConverter`] for file input.
//! The free functions [`generate_outline`] and [`generate_outline_sync`] cover
//! the one-shot case.

use crate::cache::ContentCache;
use crate::config::{ProcessingConfig, ProjectContext};
use crate::error::OutlineError;
use crate::ingest::{DocumentConverter, PlainTextConverter};
use crate::output::{GenerationOutput, GenerationStats};
use crate::pipeline::chunk::DocumentChunker;
use crate::pipeline::llm::{LlmClientCache, LlmInvoker};
use crate::pipeline::normalize::normalize_text;
use crate::progress::ProgressCallback;
use crate::workflow::{AbortHandle, WorkflowEngine, WorkflowState};
use once_cell::sync::Lazy;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

static SHARED_CLIENTS: Lazy<Arc<LlmClientCache>> = Lazy::new(|| Arc::new(LlmClientCache::new()));

/// The process-wide client cache used by [`OutlineGenerator::new`].
pub fn shared_clients() -> Arc<LlmClientCache> {
    Arc::clone(&SHARED_CLIENTS)
}

/// Reusable generator for one configuration.
pub struct OutlineGenerator {
    config: ProcessingConfig,
    clients: Arc<LlmClientCache>,
    invoker: LlmInvoker,
    content_cache: Option<ContentCache>,
    converter: Arc<dyn DocumentConverter>,
    abort: Mutex<AbortHandle>,
}

impl OutlineGenerator {
    /// Generator using the process-wide client cache.
    pub fn new(config: ProcessingConfig) -> Result<Self, OutlineError> {
        Self::with_clients(config, shared_clients())
    }

    /// Generator resolving its LLM clients through `clients`.
    pub fn with_clients(config: ProcessingConfig, clients: Arc<LlmClientCache>) -> Result<Self, OutlineError> {
        config.validate()?;
        let invoker = LlmInvoker::from_config(&config, &clients)?;
        Ok(Self {
            config,
            clients,
            invoker,
            content_cache: None,
            converter: Arc::new(PlainTextConverter),
            abort: Mutex::new(AbortHandle::new()),
        })
    }

    /// Cache converted file content across requests.
    pub fn with_content_cache(mut self, cache: ContentCache) -> Self {
        self.content_cache = Some(cache);
        self
    }

    /// Replace the default [`PlainTextConverter`].
    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Flag that cancels the runs of this generator at their next transition.
    ///
    /// Once triggered it only affects runs already in flight: the next
    /// `generate*` call starts under a fresh flag, which this method then
    /// returns.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The flag for a run that is about to start.
    fn run_abort_handle(&self) -> AbortHandle {
        let mut abort = self.abort.lock().unwrap_or_else(PoisonError::into_inner);
        if abort.is_aborted() {
            debug!("Previous run was aborted; starting with a fresh abort flag");
            *abort = AbortHandle::new();
        }
        abort.clone()
    }

    /// Swap in a new config; clients and the recursion limit follow it.
    ///
    /// On error the previous config stays in effect.
    pub fn update_config(&mut self, config: ProcessingConfig) -> Result<(), OutlineError> {
        config.validate()?;
        self.invoker = LlmInvoker::from_config(&config, &self.clients)?;
        debug!("Config updated: {:?}", config);
        self.config = config;
        Ok(())
    }

    /// Generate an outline from document text.
    ///
    /// `title` becomes the topic when the project has none.
    ///
    /// # Errors
    /// * [`OutlineError::InvalidConfig`] — the page-count setting contradicts the config
    /// * [`OutlineError::Chunking`] — the text is empty after normalisation
    /// * [`OutlineError::RecursionLimitExceeded`] / [`OutlineError::Cancelled`]
    pub async fn generate(
        &self,
        text: &str,
        title: Option<&str>,
        mut project: ProjectContext,
        progress: Option<ProgressCallback>,
    ) -> Result<GenerationOutput, OutlineError> {
        let start = Instant::now();
        project.page_count.validate(&self.config)?;
        if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
            if project.topic.trim().is_empty() {
                project.topic = title.to_string();
            }
        }

        let normalized = normalize_text(text);
        let chunks = DocumentChunker::from_config(&self.config).chunk(&normalized);
        info!(
            "Generating outline: {} chars → {} chunks ({:?})",
            normalized.chars().count(),
            chunks.len(),
            self.config.chunk_strategy
        );
        let state = WorkflowState::new(chunks, project)?;
        let num_chunks = state.chunks().len();

        let engine = WorkflowEngine::new(self.invoker.clone(), self.config.clone())
            .with_abort_handle(self.run_abort_handle());
        let state = engine.execute(state, progress.as_deref()).await?;

        let stats = GenerationStats {
            chunks: num_chunks,
            steps: state.step_count(),
            refined_chunks: state.refined,
            skipped_chunks: state.skipped.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        Ok(GenerationOutput {
            outline: state.outline,
            document_structure: state.document_structure,
            stats,
            skipped: state.skipped,
        })
    }

    /// Convert `path` (through the content cache when configured), then generate.
    ///
    /// The file stem is used as title.
    pub async fn generate_from_file(
        &self,
        path: impl AsRef<Path>,
        project: ProjectContext,
        progress: Option<ProgressCallback>,
    ) -> Result<GenerationOutput, OutlineError> {
        let path = path.as_ref();
        let text = self.load_document(path).await?;
        let title = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        self.generate(&text, title.as_deref(), project, progress).await
    }

    /// Generate from `input` and write the outline JSON to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn generate_to_file(
        &self,
        input: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        project: ProjectContext,
        progress: Option<ProgressCallback>,
    ) -> Result<GenerationStats, OutlineError> {
        let output = self.generate_from_file(input, project, progress).await?;
        let path = output_path.as_ref();
        let write_err = |source: std::io::Error| OutlineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let json = serde_json::to_vec_pretty(&output.outline)
            .map_err(|e| OutlineError::Internal(format!("serialise outline: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

        Ok(output.stats)
    }

    /// Text of `path`, from the content cache when possible.
    ///
    /// Cache failures never fail the request; they only cost a conversion.
    pub async fn load_document(&self, path: &Path) -> Result<String, OutlineError> {
        if !path.exists() {
            return Err(OutlineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        let Some(cache) = &self.content_cache else {
            return Ok(self.converter.convert(path).await?.text);
        };

        match cache.is_cached(path).await {
            Ok((true, hash)) => {
                if let (Some(text), _) = cache.get_cached_content(&hash).await {
                    info!("Using cached conversion of {}", path.display());
                    return Ok(text);
                }
            }
            Ok((false, _)) => {}
            Err(e) => warn!("Cache lookup failed: {}", e),
        }

        let doc = self.converter.convert(path).await?;
        let metadata = json!({
            "converter": self.converter.name(),
            "encoding": doc.encoding,
            "chars": doc.text.chars().count(),
        });
        if let Err(e) = cache.save_to_cache(path, &doc.text, metadata).await {
            warn!("Could not cache {}: {}", path.display(), e);
        }
        Ok(doc.text)
    }
}

impl std::fmt::Debug for OutlineGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlineGenerator")
            .field("config", &self.config)
            .field("invoker", &self.invoker)
            .field("content_cache", &self.content_cache)
            .field("converter", &self.converter.name())
            .finish()
    }
}

/// Generate an outline from text with a fresh generator.
pub async fn generate_outline(
    text: &str,
    project: ProjectContext,
    config: &ProcessingConfig,
) -> Result<GenerationOutput, OutlineError> {
    OutlineGenerator::new(config.clone())?
        .generate(text, None, project, None)
        .await
}

/// Synchronous wrapper around [`generate_outline`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_outline_sync(
    text: &str,
    project: ProjectContext,
    config: &ProcessingConfig,
) -> Result<GenerationOutput, OutlineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OutlineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_outline(text, project, config))
}
