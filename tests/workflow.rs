//! Integration tests for the outline workflow.
//!
//! Every test drives the real engine with a scripted in-memory LLM, so no
//! API key or network access is needed:
//!
//!   cargo test --test workflow
//!
//! Engine logs are routed to the test writer; enable them with
//! `RUST_LOG=edgequake_outline=debug`.

use async_trait::async_trait;
use edgequake_outline::pipeline::parse::default_outline;
use edgequake_outline::{
    AbortHandle, CacheConfig, ContentCache, ConvertedDocument, DocumentConverter, LlmClientCache,
    LlmError, LlmInvoker, OutlineError, OutlineGenerator, OutlineLlm, PageCountMode,
    ProcessingConfig, ProjectContext, RetryPolicy, SkipReason, TerminalTagging, WorkflowEngine,
    WorkflowState,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replies from a fixed script, in call order; errors once the script runs out.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, i: usize) -> String {
        self.prompts.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl OutlineLlm for ScriptedLlm {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Provider("script exhausted".into())))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Same reply to every call.
struct Always {
    reply: String,
    calls: AtomicUsize,
}

impl Always {
    fn new(reply: String) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl OutlineLlm for Always {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "always"
    }
}

const STRUCTURE: &str = r#"{"title": "Doc", "type": "report", "sections": ["A", "B"], "key_concepts": [], "language": "en", "complexity": "low"}"#;

fn outline_json(title: &str, slides: usize) -> String {
    let slides: Vec<serde_json::Value> = (1..=slides)
        .map(|i| {
            serde_json::json!({
                "page_number": i,
                "title": format!("{title} {i}"),
                "content_points": [format!("point {i}")],
                "slide_type": if i == 1 { "title" } else { "content" },
                "description": ""
            })
        })
        .collect();
    serde_json::json!({"title": title, "total_pages": slides.len(), "slides": slides}).to_string()
}

fn ok(s: impl Into<String>) -> Result<String, LlmError> {
    Ok(s.into())
}

fn failure() -> Result<String, LlmError> {
    Err(LlmError::Provider("503 Service Unavailable".into()))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> ProcessingConfig {
    init_tracing();
    ProcessingConfig::builder()
        .slides(1, 10)
        .chunk_size(40)
        .chunk_overlap(0)
        .retry_backoff_ms(0)
        .build()
        .unwrap()
}

fn engine(llm: Arc<dyn OutlineLlm>, config: &ProcessingConfig) -> WorkflowEngine {
    WorkflowEngine::new(
        LlmInvoker::new(llm, RetryPolicy::from_config(config)),
        config.clone(),
    )
}

fn chunks(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Section {i} of the document.")).collect()
}

fn state(n: usize) -> WorkflowState {
    WorkflowState::new(chunks(n), ProjectContext::new("Deck")).unwrap()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fixed_page_count_over_three_chunks() {
    let llm = ScriptedLlm::new(vec![
        ok(STRUCTURE),
        ok(outline_json("Five", 5)),
        ok(outline_json("Five", 5)),
        ok(outline_json("Five", 5)),
    ]);
    let config = config();
    let project = ProjectContext::new("Deck").with_page_count(PageCountMode::Fixed { pages: 5 });
    let state = WorkflowState::new(chunks(3), project).unwrap();

    let done = engine(llm.clone(), &config).execute(state, None).await.unwrap();

    assert_eq!(done.outline.total_pages, 5);
    assert_eq!(done.current_index(), 3);
    assert_eq!(done.refined, 2);
    assert!(done.skipped.is_empty());
    assert_eq!(llm.calls(), 4);
    assert!(llm.prompt(1).contains("exactly 5 slides"));
}

#[tokio::test]
async fn malformed_bootstrap_falls_back_to_default_outline() {
    let llm = ScriptedLlm::new(vec![
        ok(STRUCTURE),
        ok("Sure! Here is your outline: {title: 'Deck', slides: [oops"),
    ]);
    let done = engine(llm, &config()).execute(state(1), None).await.unwrap();

    assert_eq!(done.outline, default_outline("estimated"));
}

#[tokio::test]
async fn slideless_bootstrap_never_yields_empty_deck() {
    let llm = ScriptedLlm::new(vec![ok(STRUCTURE), ok(r#"{"title": "Deck", "slides": []}"#)]);
    let done = engine(llm, &config()).execute(state(1), None).await.unwrap();

    assert_eq!(done.outline, default_outline("estimated"));
    assert_eq!(done.outline.total_pages, 1);
}

#[tokio::test]
async fn failed_refine_keeps_outline_and_advances() {
    let llm = ScriptedLlm::new(vec![
        ok(STRUCTURE),
        ok(outline_json("Boot", 3)),
        failure(),
        failure(),
        failure(),
        ok(outline_json("Final", 4)),
    ]);
    let done = engine(llm.clone(), &config()).execute(state(3), None).await.unwrap();

    assert_eq!(done.current_index(), 3);
    assert_eq!(
        done.skipped,
        vec![SkipReason::LlmFailed {
            chunk: 1,
            attempts: 3,
            detail: "provider error: 503 Service Unavailable".into(),
        }]
    );
    // The refine prompt for chunk 2 still carries the bootstrapped outline.
    assert!(llm.prompt(5).contains("\"Boot 3\""));
    assert!(llm.prompt(5).contains("section 3 of 3"));
    assert_eq!(done.outline.title, "Final");
    assert_eq!(done.refined, 1);
}

#[tokio::test]
async fn failed_last_refine_leaves_bootstrapped_slides() {
    let llm = ScriptedLlm::new(vec![ok(STRUCTURE), ok(outline_json("Boot", 3))]);
    let done = engine(llm, &config()).execute(state(2), None).await.unwrap();

    let titles: Vec<&str> = done.outline.slides.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, ["Boot 1", "Boot 2", "Boot 3"]);
    assert_eq!(done.current_index(), 2);
    assert_eq!(done.skipped.len(), 1);
}

#[tokio::test]
async fn unparsable_and_empty_refines_are_skipped() {
    let llm = ScriptedLlm::new(vec![
        ok(STRUCTURE),
        ok(outline_json("Boot", 2)),
        ok("I could not find anything new in this section."),
        ok(r#"{"title": "Empty", "slides": []}"#),
    ]);
    let done = engine(llm, &config()).execute(state(3), None).await.unwrap();

    assert_eq!(
        done.skipped,
        vec![
            SkipReason::UnparsableResponse { chunk: 1 },
            SkipReason::EmptyOutline { chunk: 2 },
        ]
    );
    assert_eq!(done.outline.title, "Boot");
}

#[tokio::test]
async fn identical_content_under_two_names_converts_once() {
    struct CountingConverter(AtomicUsize);

    #[async_trait]
    impl DocumentConverter for CountingConverter {
        async fn convert(&self, path: &Path) -> Result<ConvertedDocument, OutlineError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ConvertedDocument {
                text: tokio::fs::read_to_string(path).await.unwrap(),
                encoding: "UTF-8".into(),
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    let dir = TempDir::new().unwrap();
    let first = dir.path().join("q3-report.md");
    let second = dir.path().join("copy of q3-report.md");
    tokio::fs::write(&first, "Revenue grew.\n\nCosts fell.").await.unwrap();
    tokio::fs::write(&second, "Revenue grew.\n\nCosts fell.").await.unwrap();

    let cache = ContentCache::open(CacheConfig::new(dir.path().join("cache")))
        .await
        .unwrap();
    let (_, first_hash) = cache.is_cached(&first).await.unwrap();

    let converter = Arc::new(CountingConverter(AtomicUsize::new(0)));
    let llm: Arc<dyn OutlineLlm> = Always::new(outline_json("Q3", 2));
    let clients = Arc::new(LlmClientCache::with_factory(move |_| Ok(Arc::clone(&llm))));
    let generator = OutlineGenerator::with_clients(config(), clients)
        .unwrap()
        .with_content_cache(cache.clone())
        .with_converter(converter.clone());

    generator
        .generate_from_file(&first, ProjectContext::default(), None)
        .await
        .unwrap();
    let (hit, second_hash) = cache.is_cached(&second).await.unwrap();
    assert!(hit);
    assert_eq!(second_hash, first_hash);

    generator
        .generate_from_file(&second, ProjectContext::default(), None)
        .await
        .unwrap();
    assert_eq!(converter.0.load(Ordering::SeqCst), 1);
}

// ── Engine guarantees ───────────────────────────────────────────────────────

#[tokio::test]
async fn terminates_within_chunk_count_plus_two_transitions() {
    for n in [1, 2, 7] {
        let llm = Always::new(outline_json("Deck", 3));
        let done = engine(llm.clone(), &config()).execute(state(n), None).await.unwrap();

        assert_eq!(done.step_count(), n + 1);
        assert!(done.step_count() <= n + 2);
        assert_eq!(done.current_index(), n);
        assert_eq!(llm.calls.load(Ordering::SeqCst), n + 1);
    }
}

#[tokio::test]
async fn progress_is_monotone_and_ends_with_single_100() {
    let events: Arc<Mutex<Vec<(String, f32)>>> = Arc::default();
    let sink = Arc::clone(&events);
    let callback = move |step: &str, percent: f32| {
        sink.lock().unwrap().push((step.to_string(), percent));
    };

    let llm = Always::new(outline_json("Deck", 3));
    let done = engine(llm, &config())
        .execute(state(4), Some(&callback))
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), done.step_count() + 1);
    assert!(events.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(events.last().unwrap(), &("complete".to_string(), 100.0));
    assert_eq!(events.iter().filter(|(_, p)| *p >= 100.0).count(), 1);
    assert!(events.iter().all(|(_, p)| *p <= 100.0));
    assert_eq!(events[0].0, "analyze_structure");
    assert_eq!(events[1].0, "generate_initial_outline");
    assert_eq!(events[2].0, "refine_outline");
}

#[tokio::test]
async fn too_many_chunks_exceed_recursion_limit() {
    init_tracing();
    let config = ProcessingConfig::builder()
        .chunk_size(40)
        .chunk_overlap(0)
        .recursion_limit(10)
        .retry_backoff_ms(0)
        .build()
        .unwrap();
    let llm = Always::new(outline_json("Deck", 3));

    let err = engine(llm.clone(), &config)
        .execute(state(20), None)
        .await
        .unwrap_err();

    match err {
        OutlineError::RecursionLimitExceeded { limit, chunks } => {
            assert_eq!(limit, 10);
            assert_eq!(chunks, 20);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(llm.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn abort_stops_at_next_transition() {
    let llm = Always::new(outline_json("Deck", 3));
    let abort = AbortHandle::new();
    let trigger = abort.clone();
    let callback = move |step: &str, _: f32| {
        if step == "generate_initial_outline" {
            trigger.abort();
        }
    };

    let err = engine(llm.clone(), &config())
        .with_abort_handle(abort)
        .execute(state(5), Some(&callback))
        .await
        .unwrap_err();

    assert!(matches!(err, OutlineError::Cancelled { steps: 2 }));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn fallback_model_answers_when_primary_is_down() {
    let primary = ScriptedLlm::new(Vec::new());
    let fallback = Always::new(outline_json("Fallback", 2));
    let config = config();
    let invoker = LlmInvoker::new(primary.clone(), RetryPolicy::new(2, Duration::ZERO))
        .with_fallback(fallback.clone());

    let done = WorkflowEngine::new(invoker, config)
        .execute(state(2), None)
        .await
        .unwrap();

    assert_eq!(done.outline.title, "Fallback");
    assert!(done.skipped.is_empty());
    // Three LLM steps, two primary attempts each.
    assert_eq!(primary.calls(), 6);
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn terminal_tagging_is_explicit() {
    let llm = Always::new(outline_json("Deck", 3));
    let preserved = engine(llm.clone(), &config())
        .execute(state(2), None)
        .await
        .unwrap();
    assert_eq!(preserved.outline.page_count_mode, "estimated");

    let mut marking = config();
    marking.terminal_tagging = TerminalTagging::MarkFinal;
    let finalised = engine(llm, &marking).execute(state(2), None).await.unwrap();
    assert_eq!(finalised.outline.page_count_mode, "final");
}

#[tokio::test]
async fn refine_response_mode_replaces_estimated_tag() {
    let tagged = r#"{"title": "Deck", "page_count_mode": "fixed", "slides": [{"title": "One"}]}"#;
    let llm = ScriptedLlm::new(vec![ok(STRUCTURE), ok(outline_json("Boot", 2)), ok(tagged)]);
    let done = engine(llm, &config()).execute(state(2), None).await.unwrap();
    assert_eq!(done.outline.page_count_mode, "fixed");
    assert_eq!(done.outline.total_pages, 1);
}

#[tokio::test]
async fn structure_failure_does_not_stop_the_run() {
    let llm = ScriptedLlm::new(vec![
        failure(),
        failure(),
        failure(),
        ok(outline_json("Deck", 2)),
    ]);
    let done = engine(llm, &config()).execute(state(1), None).await.unwrap();
    assert_eq!(done.document_structure["title"], "Deck");
    assert_eq!(done.document_structure["complexity"], "medium");
    assert_eq!(done.outline.total_pages, 2);
}

#[tokio::test]
async fn generator_end_to_end_with_text() {
    let llm: Arc<dyn OutlineLlm> = Always::new(outline_json("Energy", 4));
    let clients = Arc::new(LlmClientCache::with_factory(move |_| Ok(Arc::clone(&llm))));
    let generator = OutlineGenerator::with_clients(config(), clients).unwrap();

    let text = "Solar capacity doubled.\r\n\r\nStorage costs fell by half.\r\n\r\nGrids adapt slowly.";
    let out = generator
        .generate(text, Some("Energy"), ProjectContext::default(), None)
        .await
        .unwrap();

    assert_eq!(out.stats.chunks, 3);
    assert_eq!(out.stats.steps, 4);
    assert_eq!(out.stats.refined_chunks, 2);
    assert_eq!(out.stats.skipped_chunks, 0);
    assert_eq!(out.outline.total_pages, 4);
    assert_eq!(out.outline.slides[0].page_number, 1);
}
