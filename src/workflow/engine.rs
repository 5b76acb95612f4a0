//! The outline state machine.
//!
//! ```text
//! AnalyzeStructure ──▶ GenerateInitialOutline ──▶ RefineOutline ─┐
//!                               │                      ▲  │      │
//!                               │                      └──┘      │
//!                               └──────────────▶ End ◀───────────┘
//! ```
//!
//! After `GenerateInitialOutline` and after every `RefineOutline` the guard
//! routes to `End` once the cursor has consumed every chunk. Each refine step
//! moves the cursor by exactly one, so a run over `n` chunks takes `n + 1`
//! transitions.

use crate::config::{ProcessingConfig, TerminalTagging};
use crate::error::OutlineError;
use crate::output::{MODE_ESTIMATED, MODE_FINAL};
use crate::pipeline::llm::LlmInvoker;
use crate::pipeline::parse::outline_from_value;
use crate::pipeline::{bootstrap, refine, structure};
use crate::progress::{step_percent, WorkflowProgressCallback};
use crate::prompts::{page_count_constraint, RefinePromptInput};
use crate::workflow::state::WorkflowState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nodes of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    AnalyzeStructure,
    GenerateInitialOutline,
    RefineOutline,
    End,
}

impl WorkflowStep {
    /// Name reported to progress callbacks.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalyzeStructure => "analyze_structure",
            Self::GenerateInitialOutline => "generate_initial_outline",
            Self::RefineOutline => "refine_outline",
            Self::End => "complete",
        }
    }
}

/// Step to run after `step`, given the state it left behind.
pub fn next_step(step: WorkflowStep, state: &WorkflowState) -> WorkflowStep {
    match step {
        WorkflowStep::AnalyzeStructure => WorkflowStep::GenerateInitialOutline,
        WorkflowStep::GenerateInitialOutline | WorkflowStep::RefineOutline => {
            if state.is_exhausted() {
                WorkflowStep::End
            } else {
                WorkflowStep::RefineOutline
            }
        }
        WorkflowStep::End => WorkflowStep::End,
    }
}

/// Cooperative cancellation flag, checked before every transition.
///
/// Clones share the flag, so a handle can be given to a signal handler while
/// the engine runs.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives one [`WorkflowState`] from `AnalyzeStructure` to `End`.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    invoker: LlmInvoker,
    config: ProcessingConfig,
    abort: AbortHandle,
}

impl WorkflowEngine {
    pub fn new(invoker: LlmInvoker, config: ProcessingConfig) -> Self {
        Self {
            invoker,
            config,
            abort: AbortHandle::new(),
        }
    }

    /// Share an existing abort flag instead of the engine's own.
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run the state machine to completion.
    ///
    /// # Errors
    /// * [`OutlineError::RecursionLimitExceeded`] — the run needed more
    ///   transitions than `config.effective_recursion_limit()`
    /// * [`OutlineError::Cancelled`] — the abort handle was triggered
    ///
    /// Every other failure degrades inside its step.
    pub async fn execute(
        &self,
        mut state: WorkflowState,
        progress: Option<&dyn WorkflowProgressCallback>,
    ) -> Result<WorkflowState, OutlineError> {
        let limit = self.config.effective_recursion_limit();
        let num_chunks = state.chunks().len();
        let constraint = page_count_constraint(&state.project.page_count, &self.config);
        info!(
            "Outline workflow: {} chunks, recursion limit {}, model {}",
            num_chunks,
            limit,
            self.invoker.model_name()
        );

        let mut step = WorkflowStep::AnalyzeStructure;
        while step != WorkflowStep::End {
            if self.abort.is_aborted() {
                warn!("Workflow aborted after {} steps", state.step_count());
                return Err(OutlineError::Cancelled {
                    steps: state.step_count(),
                });
            }
            if state.step_count() >= limit {
                return Err(OutlineError::RecursionLimitExceeded {
                    limit,
                    chunks: num_chunks,
                });
            }

            match step {
                WorkflowStep::AnalyzeStructure => self.analyze_structure(&mut state).await,
                WorkflowStep::GenerateInitialOutline => {
                    self.generate_initial_outline(&mut state, &constraint).await
                }
                WorkflowStep::RefineOutline => self.refine_outline(&mut state, &constraint).await,
                WorkflowStep::End => {}
            }
            state.record_step();

            if let Some(cb) = progress {
                cb.on_step(step.name(), step_percent(state.step_count(), num_chunks));
            }
            step = next_step(step, &state);
        }

        if self.config.terminal_tagging == TerminalTagging::MarkFinal {
            state.outline.page_count_mode = MODE_FINAL.to_string();
        }
        info!(
            "Outline complete: {} slides after {} steps ({} refined, {} skipped)",
            state.outline.total_pages,
            state.step_count(),
            state.refined,
            state.skipped.len()
        );
        if let Some(cb) = progress {
            cb.on_step(WorkflowStep::End.name(), 100.0);
        }
        Ok(state)
    }

    async fn analyze_structure(&self, state: &mut WorkflowState) {
        let first = state.first_chunk().to_string();
        state.document_structure = structure::analyze(
            &self.invoker,
            &first,
            &state.project,
            &self.config.target_language,
        )
        .await;
        state.accumulated_context = structure::seed_context(&first);
    }

    async fn generate_initial_outline(&self, state: &mut WorkflowState, constraint: &str) {
        let value = bootstrap::bootstrap(
            &self.invoker,
            &state.document_structure,
            state.first_chunk(),
            constraint,
            &state.project,
            &self.config.target_language,
        )
        .await;
        let mut outline = outline_from_value(value, MODE_ESTIMATED);
        outline.page_count_mode = MODE_ESTIMATED.to_string();
        state.outline = outline;
        state.advance();
    }

    async fn refine_outline(&self, state: &mut WorkflowState, constraint: &str) {
        let index = state.current_index();
        let Some(chunk) = state.current_chunk().map(str::to_string) else {
            return;
        };
        let outline = state.outline.to_value();
        let result = refine::refine(
            &self.invoker,
            &RefinePromptInput {
                outline: &outline,
                chunk: &chunk,
                chunk_number: index,
                total_chunks: state.chunks().len(),
                context: &state.accumulated_context,
                constraint,
                project: &state.project,
                language: &self.config.target_language,
            },
        )
        .await;

        match result {
            Ok(refined) => {
                refine::apply_refinement(&mut state.outline, refined);
                state.refined += 1;
                debug!("Chunk {}: outline now {} slides", index, state.outline.total_pages);
            }
            Err(reason) => {
                warn!("Skipping chunk {}: {}", index, reason);
                state.skipped.push(reason);
            }
        }
        state.accumulated_context = refine::extend_context(&state.accumulated_context, &chunk);
        state.advance();
    }
}
