//! Progress-callback trait for workflow transitions.
//!
//! Pass an [`Arc<dyn WorkflowProgressCallback>`] to
//! [`crate::generate::OutlineGenerator::generate`] (or any closure
//! `Fn(&str, f32)`) to receive one event per state transition and a final
//! `100.0` once the outline is complete.
//!
//! # Example
//!
//! ```rust
//! use edgequake_outline::WorkflowProgressCallback;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let callback = move |step: &str, percent: f32| {
//!     sink.lock().unwrap().push((step.to_string(), percent));
//! };
//!
//! callback.on_step("analyze_structure", 33.3);
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

use std::sync::Arc;

/// Called by the workflow engine after every state transition.
///
/// The engine calls it synchronously and in strict transition order; a
/// generation request never runs two transitions at once, so implementations
/// see a totally ordered, non-decreasing sequence of percentages.
///
/// Callbacks cannot fail. A panic inside one is not caught and unwinds
/// through the engine.
pub trait WorkflowProgressCallback: Send + Sync {
    /// # Arguments
    /// * `step_name` — the transition just executed (`analyze_structure`,
    ///   `generate_initial_outline`, `refine_outline`, or `complete`)
    /// * `percent`   — 0.0–100.0; 100.0 is only ever sent for `complete`
    fn on_step(&self, step_name: &str, percent: f32);
}

impl<F> WorkflowProgressCallback for F
where
    F: Fn(&str, f32) + Send + Sync,
{
    fn on_step(&self, step_name: &str, percent: f32) {
        self(step_name, percent)
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl WorkflowProgressCallback for NoopProgressCallback {
    fn on_step(&self, _step_name: &str, _percent: f32) {}
}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn WorkflowProgressCallback>;

/// Percentage reported after `step_count` transitions of a run over
/// `num_chunks` chunks: `min(step_count / (2 + num_chunks) * 100, 95)`.
///
/// The last 5% are reserved for the explicit completion event.
pub fn step_percent(step_count: usize, num_chunks: usize) -> f32 {
    let total = (2 + num_chunks) as f32;
    (step_count as f32 / total * 100.0).min(95.0)
}
