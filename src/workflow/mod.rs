//! Sequencing of the outline stages.
//!
//! [`WorkflowState`] holds the chunks, the cursor and the running outline;
//! [`WorkflowEngine`] moves it through the [`WorkflowStep`] graph one
//! transition at a time, reporting progress after each one.

pub mod engine;
pub mod state;

pub use engine::{next_step, AbortHandle, WorkflowEngine, WorkflowStep};
pub use state::WorkflowState;
