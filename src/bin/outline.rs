//! CLI binary for edgequake-outline.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ProcessingConfig` / `ProjectContext` and prints the outline as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_outline::{
    CacheConfig, ChunkStrategy, ContentCache, LlmProviderKind, OutlineGenerator, PageCountMode,
    ProcessingConfig, ProgressCallback, ProjectContext, TerminalTagging, WorkflowProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders workflow transitions as a 0–100 bar.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Outlining");
        bar.set_message("reading document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl WorkflowProgressCallback for CliProgressCallback {
    fn on_step(&self, step_name: &str, percent: f32) {
        if step_name == "complete" {
            self.bar.finish_and_clear();
            eprintln!("{} outline complete", green("✔"));
            return;
        }
        self.bar
            .println(format!("  {} {:<26} {}", green("✓"), step_name, dim(&format!("{percent:>5.1}%"))));
        self.bar.set_position(percent.round() as u64);
        self.bar.set_message(step_name.replace('_', " "));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Outline a document (JSON on stdout)
  outline report.md

  # Exactly 12 slides, written to a file
  outline --pages 12 report.md -o deck.json

  # Between 8 and 15 slides for a specific audience
  outline --pages 8-15 --audience "sales team" --style "minimal" notes.txt

  # Semantic chunking with a different model and a fallback
  outline --strategy semantic --model gpt-4.1 --fallback-model gpt-4.1-mini paper.md

  # Full output: outline, structure analysis, stats and skipped chunks
  outline --json report.md > run.json

  # Cache maintenance
  outline --cache-stats
  outline --clear-cache

CHUNK STRATEGIES:
  paragraph  pack blank-line separated paragraphs (default)
  semantic   split at headings (#, 第一章, 1.2 Title), then pack sections
  recursive  split on paragraphs → lines → sentences → words
  hybrid     paragraph packing; oversized paragraphs split recursively
  fast       fixed character budget (max_tokens × 4)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_PROVIDER      Override provider (openai, anthropic, azure, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  OUTLINE_CACHE_DIR       Content cache directory
  RUST_LOG                Log filter (e.g. edgequake_outline=debug)
"#;

/// Turn long documents into presentation outlines with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "outline",
    version,
    about = "Turn long documents into presentation outlines with an LLM",
    long_about = "Split a document into chunks and fold them one by one into a running \
slide outline. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI and Ollama.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to outline (.txt, .md, …).
    input: Option<PathBuf>,

    /// Write the outline JSON to this file instead of stdout.
    #[arg(short, long, env = "OUTLINE_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = "gpt-4.1-mini")]
    model: String,

    /// LLM provider: openai, anthropic, azure, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", default_value = "openai")]
    provider: LlmProviderKind,

    /// Model tried once when the primary model keeps failing.
    #[arg(long, env = "OUTLINE_FALLBACK_MODEL")]
    fallback_model: Option<String>,

    /// Slide count: "ai" (model decides), "12" (exact) or "8-15" (range).
    #[arg(long, env = "OUTLINE_PAGES", default_value = "ai")]
    pages: String,

    /// Lower slide bound when the model decides.
    #[arg(long, env = "OUTLINE_MIN_SLIDES", default_value_t = 5)]
    min_slides: usize,

    /// Upper slide bound (at most 1000).
    #[arg(long, env = "OUTLINE_MAX_SLIDES", default_value_t = 25)]
    max_slides: usize,

    /// Chunking strategy: paragraph, semantic, recursive, hybrid, fast.
    #[arg(long, env = "OUTLINE_STRATEGY", default_value = "paragraph")]
    strategy: ChunkStrategy,

    /// Target chunk size in characters.
    #[arg(long, env = "OUTLINE_CHUNK_SIZE", default_value_t = 3000)]
    chunk_size: usize,

    /// Characters repeated from the previous chunk.
    #[arg(long, env = "OUTLINE_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Max workflow transitions (default: max(100, 3 × max-slides + 50)).
    #[arg(long, env = "OUTLINE_RECURSION_LIMIT")]
    recursion_limit: Option<usize>,

    /// Language the outline is written in.
    #[arg(long, env = "OUTLINE_LANGUAGE", default_value = "zh-CN")]
    language: String,

    /// Max LLM output tokens per call.
    #[arg(long, env = "OUTLINE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "OUTLINE_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,

    /// Attempts per LLM call.
    #[arg(long, env = "OUTLINE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Stamp page_count_mode "final" on the finished outline.
    #[arg(long)]
    mark_final: bool,

    /// Presentation topic (default: the file name).
    #[arg(long)]
    topic: Option<String>,

    /// Presentation scenario, e.g. "quarterly business review".
    #[arg(long, default_value = "")]
    scenario: String,

    /// Who the deck is for.
    #[arg(long, default_value = "")]
    audience: String,

    /// Visual / tone style.
    #[arg(long, default_value = "")]
    style: String,

    /// Extra requirements passed to the model.
    #[arg(long, default_value = "")]
    requirements: String,

    /// Path to a text file with custom style instructions.
    #[arg(long)]
    style_prompt: Option<PathBuf>,

    /// Content cache directory.
    #[arg(long, env = "OUTLINE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Cache entry lifetime in days.
    #[arg(long, env = "OUTLINE_CACHE_TTL_DAYS", default_value_t = 7)]
    cache_ttl_days: u64,

    /// Do not read or write the content cache.
    #[arg(long, env = "OUTLINE_NO_CACHE")]
    no_cache: bool,

    /// Remove every cache entry and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Print cache statistics and exit.
    #[arg(long)]
    cache_stats: bool,

    /// Output the full GenerationOutput (outline, structure, stats) as JSON.
    #[arg(long, env = "OUTLINE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OUTLINE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OUTLINE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OUTLINE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Cache maintenance ────────────────────────────────────────────────
    let cache_config = build_cache_config(&cli);
    if cli.clear_cache || cli.cache_stats {
        let cache = ContentCache::open(cache_config)
            .await
            .context("Failed to open content cache")?;
        if cli.clear_cache {
            cache.clear_all().await.context("Failed to clear cache")?;
            eprintln!("{} cache cleared", green("✔"));
        }
        if cli.cache_stats {
            let stats = cache.stats().await.context("Failed to read cache")?;
            println!("Directory: {}", cache.config().dir.display());
            println!("Entries:   {}", stats.entries);
            println!("Bytes:     {}", stats.total_bytes);
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("No input document given (see --help)")?;

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let project = build_project(&cli).await?;

    let mut generator = OutlineGenerator::new(config).context("Failed to set up the LLM client")?;
    if !cli.no_cache {
        let cache = ContentCache::open(cache_config)
            .await
            .context("Failed to open content cache")?;
        let removed = cache.clear_expired().await.unwrap_or(0);
        if removed > 0 && !cli.quiet {
            eprintln!("{}", dim(&format!("removed {removed} expired cache entries")));
        }
        generator = generator.with_content_cache(cache);
    }

    // Ctrl-C stops the workflow at its next transition.
    let abort = generator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };

    if !cli.quiet {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Outlining {}…", input.display()))
        );
    }

    // ── Run generation ───────────────────────────────────────────────────
    if let (Some(output_path), false) = (&cli.output, cli.json) {
        let stats = generator
            .generate_to_file(&input, output_path, project, progress)
            .await
            .context("Outline generation failed")?;
        if !cli.quiet {
            eprintln!(
                "{}  {} chunks  {} skipped  {}ms  →  {}",
                green("✔"),
                stats.chunks,
                stats.skipped_chunks,
                stats.duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
        return Ok(());
    }

    let output = generator
        .generate_from_file(&input, project, progress)
        .await
        .context("Outline generation failed")?;

    let json = if cli.json {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.outline)
    }
    .context("Failed to serialise output")?;

    match &cli.output {
        Some(path) => tokio::fs::write(path, format!("{json}\n"))
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }

    if !cli.quiet && !cli.json {
        eprintln!(
            "   {} slides  /  {} chunks ({} skipped)  —  {}ms total",
            bold(&output.outline.total_pages.to_string()),
            output.stats.chunks,
            output.stats.skipped_chunks,
            output.stats.duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .slides(cli.min_slides, cli.max_slides)
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.chunk_overlap)
        .chunk_strategy(cli.strategy)
        .llm_provider(cli.provider)
        .llm_model(cli.model.clone())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .target_language(cli.language.clone())
        .max_retries(cli.max_retries);

    if let Some(limit) = cli.recursion_limit {
        builder = builder.recursion_limit(limit);
    }
    if let Some(ref model) = cli.fallback_model {
        builder = builder.fallback_model(model.clone());
    }
    if cli.mark_final {
        builder = builder.terminal_tagging(TerminalTagging::MarkFinal);
    }

    builder.build().context("Invalid configuration")
}

/// Map CLI args to `ProjectContext`.
async fn build_project(cli: &Cli) -> Result<ProjectContext> {
    let mut project = ProjectContext::new(cli.topic.clone().unwrap_or_default())
        .with_scenario(cli.scenario.clone())
        .with_audience(cli.audience.clone())
        .with_style(cli.style.clone())
        .with_requirements(cli.requirements.clone())
        .with_page_count(parse_pages(&cli.pages)?);

    if let Some(ref path) = cli.style_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read style prompt from {:?}", path))?;
        project = project.with_custom_style_prompt(prompt);
    }
    Ok(project)
}

fn build_cache_config(cli: &Cli) -> CacheConfig {
    let config = match cli.cache_dir {
        Some(ref dir) => CacheConfig::new(dir),
        None => CacheConfig::default(),
    };
    config.with_ttl(Duration::from_secs(cli.cache_ttl_days * 24 * 60 * 60))
}

/// Parse `--pages` into a `PageCountMode`.
fn parse_pages(s: &str) -> Result<PageCountMode> {
    let s = s.trim().to_lowercase();

    if s == "ai" || s == "auto" {
        return Ok(PageCountMode::AiDecide);
    }

    // Range: "8-15"
    if let Some((min, max)) = s.split_once('-') {
        let min: usize = min.trim().parse().context("Invalid minimum slide count")?;
        let max: usize = max.trim().parse().context("Invalid maximum slide count")?;
        if min < 1 || min > max {
            anyhow::bail!("Invalid slide range '{}-{}': need 1 ≤ min ≤ max", min, max);
        }
        return Ok(PageCountMode::CustomRange { min, max });
    }

    // Exact: "12"
    let pages: usize = s.parse().context("Invalid slide count")?;
    if pages < 1 {
        anyhow::bail!("Slide count must be at least 1 (got {})", pages);
    }
    Ok(PageCountMode::Fixed { pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_modes() {
        assert_eq!(parse_pages("ai").unwrap(), PageCountMode::AiDecide);
        assert_eq!(parse_pages(" 12 ").unwrap(), PageCountMode::Fixed { pages: 12 });
        assert_eq!(
            parse_pages("8-15").unwrap(),
            PageCountMode::CustomRange { min: 8, max: 15 }
        );
        assert!(parse_pages("15-8").is_err());
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("many").is_err());
    }

    #[test]
    fn cli_flags_map_to_config() {
        let cli = Cli::parse_from([
            "outline",
            "doc.md",
            "--provider",
            "anthropic",
            "--strategy",
            "hybrid",
            "--max-slides",
            "40",
            "--mark-final",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.llm_provider, LlmProviderKind::Anthropic);
        assert_eq!(config.chunk_strategy, ChunkStrategy::Hybrid);
        assert_eq!(config.effective_recursion_limit(), 170);
        assert_eq!(config.terminal_tagging, TerminalTagging::MarkFinal);
    }
}
