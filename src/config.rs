//! Configuration types for outline generation.
//!
//! All generation behaviour is controlled through [`ProcessingConfig`], built
//! via its [`ProcessingConfigBuilder`]. The config is constructed once per
//! request and never mutated afterwards; the only way to change it is
//! [`crate::generate::OutlineGenerator::update_config`], which validates the
//! new value and re-derives everything that depends on it.

use crate::error::OutlineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Hard upper bound on `max_slides`.
pub const MAX_SLIDES_CEILING: usize = 1000;

/// Smallest accepted explicit `recursion_limit`.
pub const MIN_RECURSION_LIMIT: usize = 10;

/// Configuration for one outline generation request.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_outline::{ChunkStrategy, ProcessingConfig};
///
/// let config = ProcessingConfig::builder()
///     .slides(5, 20)
///     .chunk_size(3000)
///     .chunk_strategy(ChunkStrategy::Hybrid)
///     .build()
///     .unwrap();
/// assert_eq!(config.effective_recursion_limit(), 110);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound on slides the outline may contain. Range: 1–1000. Default: 25.
    pub max_slides: usize,

    /// Lower bound on slides. Must be ≥ 1 and ≤ `max_slides`. Default: 5.
    pub min_slides: usize,

    /// Target chunk size in characters. Default: 3000.
    ///
    /// Every refine call carries the whole running outline plus one chunk, so
    /// the chunk has to leave room for the outline in the model's context.
    pub chunk_size: usize,

    /// Characters of the previous chunk repeated at the start of the next. Default: 200.
    pub chunk_overlap: usize,

    /// Chunking algorithm. Default: [`ChunkStrategy::Paragraph`].
    pub chunk_strategy: ChunkStrategy,

    /// LLM model identifier, e.g. "gpt-4.1-mini". Default: "gpt-4.1-mini".
    pub llm_model: String,

    /// LLM provider. Default: [`LlmProviderKind::OpenAI`].
    pub llm_provider: LlmProviderKind,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 4096.
    ///
    /// Also drives the character budget of [`ChunkStrategy::Fast`].
    pub max_tokens: usize,

    /// Hard ceiling on workflow transitions. `None` derives
    /// `max(100, max_slides * 3 + 50)`.
    pub recursion_limit: Option<usize>,

    /// Language the outline should be written in. Default: "zh-CN".
    pub target_language: String,

    /// Attempts per LLM call before the step gives up. Default: 3.
    pub max_retries: u32,

    /// Linear backoff base in milliseconds: attempt `n` waits `n × base`. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Model tried once when the primary model exhausts its retries.
    pub fallback_model: Option<String>,

    /// What happens to `page_count_mode` when the workflow ends.
    pub terminal_tagging: TerminalTagging,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_slides: 25,
            min_slides: 5,
            chunk_size: 3000,
            chunk_overlap: 200,
            chunk_strategy: ChunkStrategy::default(),
            llm_model: "gpt-4.1-mini".to_string(),
            llm_provider: LlmProviderKind::default(),
            temperature: 0.7,
            max_tokens: 4096,
            recursion_limit: None,
            target_language: "zh-CN".to_string(),
            max_retries: 3,
            retry_backoff_ms: 1000,
            fallback_model: None,
            terminal_tagging: TerminalTagging::default(),
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("slides", &(self.min_slides..=self.max_slides))
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("chunk_strategy", &self.chunk_strategy)
            .field("llm_provider", &self.llm_provider)
            .field("llm_model", &self.llm_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("recursion_limit", &self.effective_recursion_limit())
            .field("max_retries", &self.max_retries)
            .field("fallback_model", &self.fallback_model)
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }

    /// The recursion limit actually enforced by the workflow.
    pub fn effective_recursion_limit(&self) -> usize {
        self.recursion_limit
            .unwrap_or_else(|| derive_recursion_limit(self.max_slides))
    }

    /// Check every cross-field invariant.
    ///
    /// [`ProcessingConfigBuilder::build`] calls this; so does
    /// `update_config`, because a config can also arrive through serde.
    pub fn validate(&self) -> Result<(), OutlineError> {
        if self.min_slides < 1 {
            return Err(OutlineError::InvalidConfig(format!(
                "min_slides must be ≥ 1, got {}",
                self.min_slides
            )));
        }
        if self.max_slides > MAX_SLIDES_CEILING {
            return Err(OutlineError::InvalidConfig(format!(
                "max_slides must be ≤ {MAX_SLIDES_CEILING}, got {}",
                self.max_slides
            )));
        }
        if self.min_slides > self.max_slides {
            return Err(OutlineError::InvalidConfig(format!(
                "min_slides ({}) must not exceed max_slides ({})",
                self.min_slides, self.max_slides
            )));
        }
        if let Some(limit) = self.recursion_limit {
            if limit < MIN_RECURSION_LIMIT {
                return Err(OutlineError::InvalidConfig(format!(
                    "recursion_limit must be ≥ {MIN_RECURSION_LIMIT}, got {limit}"
                )));
            }
        }
        if self.chunk_size == 0 {
            return Err(OutlineError::InvalidConfig(
                "chunk_size must be ≥ 1".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(OutlineError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.max_retries == 0 {
            return Err(OutlineError::InvalidConfig(
                "max_retries must be ≥ 1".into(),
            ));
        }
        Ok(())
    }

    /// Backoff base as a `Duration`.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// `max(100, max_slides * 3 + 50)`: two fixed steps plus generous headroom
/// for refine steps on documents with many chunks.
pub fn derive_recursion_limit(max_slides: usize) -> usize {
    (max_slides * 3 + 50).max(100)
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    /// Set both slide bounds at once.
    pub fn slides(mut self, min: usize, max: usize) -> Self {
        self.config.min_slides = min;
        self.config.max_slides = max;
        self
    }

    pub fn max_slides(mut self, n: usize) -> Self {
        self.config.max_slides = n;
        self
    }

    pub fn min_slides(mut self, n: usize) -> Self {
        self.config.min_slides = n;
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn chunk_overlap(mut self, n: usize) -> Self {
        self.config.chunk_overlap = n;
        self
    }

    pub fn chunk_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.config.chunk_strategy = strategy;
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    pub fn llm_provider(mut self, provider: LlmProviderKind) -> Self {
        self.config.llm_provider = provider;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn recursion_limit(mut self, n: usize) -> Self {
        self.config.recursion_limit = Some(n);
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.config.target_language = lang.into();
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.config.fallback_model = Some(model.into());
        self
    }

    pub fn terminal_tagging(mut self, tagging: TerminalTagging) -> Self {
        self.config.terminal_tagging = tagging;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, OutlineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Chunking algorithm used by [`crate::pipeline::chunk`].
///
/// | Strategy | Boundaries | Use case |
/// |----------|------------|----------|
/// | `paragraph` | blank lines | prose, reports (default) |
/// | `semantic` | headings, else paragraphs | structured documents |
/// | `recursive` | paragraph → line → sentence → word | text with few blank lines |
/// | `hybrid` | paragraphs, oversized ones recursively | mixed content |
/// | `fast` | character budget from `max_tokens` | very large inputs |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    #[default]
    Paragraph,
    Semantic,
    Recursive,
    Hybrid,
    Fast,
}

impl FromStr for ChunkStrategy {
    type Err = OutlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paragraph" => Ok(Self::Paragraph),
            "semantic" => Ok(Self::Semantic),
            "recursive" => Ok(Self::Recursive),
            "hybrid" => Ok(Self::Hybrid),
            "fast" => Ok(Self::Fast),
            other => Err(OutlineError::InvalidConfig(format!(
                "unknown chunk strategy '{other}' (expected paragraph, semantic, recursive, hybrid or fast)"
            ))),
        }
    }
}

/// LLM backends the generator can talk to.
///
/// Selected once when the client is built; the rest of the crate only sees
/// [`crate::pipeline::llm::OutlineLlm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    OpenAI,
    Anthropic,
    Azure,
    Ollama,
    Gemini,
}

impl LlmProviderKind {
    /// Provider name understood by `edgequake_llm::ProviderFactory`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProviderKind {
    type Err = OutlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "azure" | "azure_openai" | "azure-openai" => Ok(Self::Azure),
            "ollama" => Ok(Self::Ollama),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(OutlineError::InvalidConfig(format!(
                "unknown LLM provider '{other}' (expected openai, anthropic, azure, ollama or gemini)"
            ))),
        }
    }
}

/// What the workflow does with `page_count_mode` when it reaches `End`.
///
/// During refinement the tag is only ever overwritten by whatever the model
/// returns. `Preserve` leaves that value alone; `MarkFinal` stamps
/// [`crate::output::MODE_FINAL`] once the last chunk has been folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalTagging {
    #[default]
    Preserve,
    MarkFinal,
}

/// How many slides the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum PageCountMode {
    /// Let the model decide, within the config's slide bounds.
    #[default]
    AiDecide,
    /// Exactly `pages` slides.
    Fixed { pages: usize },
    /// Between `min` and `max` slides, inclusive.
    CustomRange { min: usize, max: usize },
}

impl PageCountMode {
    /// The `page_count_mode` tag recorded for this setting.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AiDecide => "ai_decide",
            Self::Fixed { .. } => "fixed",
            Self::CustomRange { .. } => "custom_range",
        }
    }

    /// Reject settings that contradict themselves or the config bounds.
    pub fn validate(&self, config: &ProcessingConfig) -> Result<(), OutlineError> {
        match *self {
            Self::AiDecide => Ok(()),
            Self::Fixed { pages } => {
                if pages < 1 || pages > config.max_slides {
                    Err(OutlineError::InvalidConfig(format!(
                        "fixed page count must be within 1–{}, got {pages}",
                        config.max_slides
                    )))
                } else {
                    Ok(())
                }
            }
            Self::CustomRange { min, max } => {
                if min < 1 || min > max || max > config.max_slides {
                    Err(OutlineError::InvalidConfig(format!(
                        "custom page range {min}–{max} must satisfy 1 ≤ min ≤ max ≤ {}",
                        config.max_slides
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Per-request project parameters. Read-only for the whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub topic: String,
    pub scenario: String,
    pub requirements: String,
    pub target_audience: String,
    pub ppt_style: String,
    pub custom_style_prompt: Option<String>,
    pub page_count: PageCountMode,
}

impl ProjectContext {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = scenario.into();
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = requirements.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = audience.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.ppt_style = style.into();
        self
    }

    pub fn with_custom_style_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_style_prompt = Some(prompt.into());
        self
    }

    pub fn with_page_count(mut self, mode: PageCountMode) -> Self {
        self.page_count = mode;
        self
    }
}

/// Where and how long converted documents are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory holding `files/`, `markdown/` and `metadata/`.
    pub dir: PathBuf,

    /// Entry lifetime measured from `cached_time`. Default: 7 days.
    pub ttl: Duration,

    /// Raw-file backups are only written for inputs smaller than this. Default: 10 MB.
    pub backup_max_bytes: u64,
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            backup_max_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_backup_max_bytes(mut self, bytes: u64) -> Self {
        self.backup_max_bytes = bytes;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("edgequake-outline-cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ProcessingConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_min_above_max() {
        let err = ProcessingConfig::builder().slides(12, 10).build().unwrap_err();
        assert!(err.to_string().contains("must not exceed"), "got: {err}");
    }

    #[test]
    fn rejects_zero_min_slides() {
        assert!(ProcessingConfig::builder().slides(0, 10).build().is_err());
    }

    #[test]
    fn rejects_max_above_ceiling() {
        assert!(ProcessingConfig::builder().slides(1, 1001).build().is_err());
        assert!(ProcessingConfig::builder().slides(1, 1000).build().is_ok());
    }

    #[test]
    fn rejects_tiny_recursion_limit() {
        assert!(ProcessingConfig::builder().recursion_limit(9).build().is_err());
        assert!(ProcessingConfig::builder().recursion_limit(10).build().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk() {
        let res = ProcessingConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn min_above_max_always_rejected() {
        for max in 1..40 {
            for min in (max + 1)..(max + 5) {
                assert!(
                    ProcessingConfig::builder().slides(min, max).build().is_err(),
                    "min={min} max={max} accepted"
                );
            }
        }
    }

    #[test]
    fn recursion_limit_derivation() {
        assert_eq!(derive_recursion_limit(1), 100);
        assert_eq!(derive_recursion_limit(16), 100);
        assert_eq!(derive_recursion_limit(17), 101);
        assert_eq!(derive_recursion_limit(1000), 3050);

        let explicit = ProcessingConfig::builder().recursion_limit(42).build().unwrap();
        assert_eq!(explicit.effective_recursion_limit(), 42);
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ProcessingConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn parse_strategy_and_provider() {
        assert_eq!("Hybrid".parse::<ChunkStrategy>().unwrap(), ChunkStrategy::Hybrid);
        assert!("words".parse::<ChunkStrategy>().is_err());
        assert_eq!("claude".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::Anthropic);
        assert_eq!(LlmProviderKind::Azure.to_string(), "azure");
    }

    #[test]
    fn page_count_mode_validation() {
        let c = ProcessingConfig::builder().slides(1, 20).build().unwrap();
        assert!(PageCountMode::Fixed { pages: 5 }.validate(&c).is_ok());
        assert!(PageCountMode::Fixed { pages: 0 }.validate(&c).is_err());
        assert!(PageCountMode::Fixed { pages: 21 }.validate(&c).is_err());
        assert!(PageCountMode::CustomRange { min: 8, max: 4 }.validate(&c).is_err());
        assert!(PageCountMode::CustomRange { min: 4, max: 8 }.validate(&c).is_ok());
        assert_eq!(PageCountMode::AiDecide.tag(), "ai_decide");
    }

    #[test]
    fn config_roundtrips_through_serde() {
        let c = ProcessingConfig::builder()
            .chunk_strategy(ChunkStrategy::Semantic)
            .llm_provider(LlmProviderKind::Gemini)
            .build()
            .unwrap();
        let json = serde_json::to_string(&c).unwrap();
        assert!(json.contains("\"semantic\""));
        assert!(json.contains("\"gemini\""));
        let back: ProcessingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn project_context_fills_missing_fields() {
        let p: ProjectContext = serde_json::from_str(
            r#"{"topic":"Q3 review","page_count":{"mode":"custom_range","min":4,"max":9}}"#,
        )
        .unwrap();
        assert_eq!(p.topic, "Q3 review");
        assert_eq!(p.target_audience, "");
        assert_eq!(p.page_count, PageCountMode::CustomRange { min: 4, max: 9 });
        assert_eq!(p.page_count.tag(), "custom_range");
    }
}
