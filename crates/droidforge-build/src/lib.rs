//! Build orchestration: a session shared by the nine build tasks, fallback
//! ladders for the tools they drive and the pipeline that runs them on a
//! background worker.

pub mod artifacts;
pub mod diagnostics;
pub mod events;
pub mod pipeline;
pub mod result;
pub mod session;
pub mod strategy;
pub mod task;
pub mod tasks;

pub use events::{BuildEvent, BuildListener};
pub use pipeline::{BuildHandle, Canceller, Pipeline, Preset};
pub use result::{BuildOutcome, BuildResult};
pub use session::BuildSession;
pub use strategy::{run_ladder, Attempt, Strategy};
pub use task::Task;
