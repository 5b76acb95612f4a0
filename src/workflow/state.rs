//! Mutable state threaded through one workflow run.

use crate::config::ProjectContext;
use crate::error::{OutlineError, SkipReason};
use crate::output::{PptOutline, MODE_ESTIMATED};
use crate::pipeline::parse::default_outline;
use serde_json::Value;

/// Everything one generation run reads and writes.
///
/// The chunk list is fixed at construction and the cursor only moves
/// forward, one chunk at a time, so `0 ≤ current_index ≤ chunks().len()`
/// always holds.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    document_chunks: Vec<String>,
    current_index: usize,
    step_count: usize,
    /// Rolling window of recent source text, at most 2000 characters.
    pub accumulated_context: String,
    /// Structure record from the analysis step (a JSON object).
    pub document_structure: Value,
    pub outline: PptOutline,
    /// Request parameters; the engine never modifies them.
    pub project: ProjectContext,
    /// Refine steps that left the outline untouched, in chunk order.
    pub skipped: Vec<SkipReason>,
    /// Refine steps whose result replaced the outline.
    pub refined: usize,
}

impl WorkflowState {
    /// Fresh state over `chunks`. An empty chunk list is rejected.
    pub fn new(chunks: Vec<String>, project: ProjectContext) -> Result<Self, OutlineError> {
        if chunks.is_empty() {
            let source_name = if project.topic.trim().is_empty() {
                "<text>".to_string()
            } else {
                project.topic.clone()
            };
            return Err(OutlineError::Chunking { source_name });
        }
        Ok(Self {
            document_chunks: chunks,
            current_index: 0,
            step_count: 0,
            accumulated_context: String::new(),
            document_structure: Value::Object(Default::default()),
            outline: default_outline(MODE_ESTIMATED),
            project,
            skipped: Vec::new(),
            refined: 0,
        })
    }

    pub fn chunks(&self) -> &[String] {
        &self.document_chunks
    }

    /// Index of the next chunk to consume.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Transitions executed so far.
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn first_chunk(&self) -> &str {
        self.document_chunks.first().map_or("", String::as_str)
    }

    /// The chunk at the cursor, if any remain.
    pub fn current_chunk(&self) -> Option<&str> {
        self.document_chunks
            .get(self.current_index)
            .map(String::as_str)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.document_chunks.len()
    }

    pub(crate) fn advance(&mut self) {
        if !self.is_exhausted() {
            self.current_index += 1;
        }
    }

    pub(crate) fn record_step(&mut self) {
        self.step_count += 1;
    }
}
