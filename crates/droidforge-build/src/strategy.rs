//! Ordered fallback ladders: each rung either does the work, reports itself
//! unavailable so the next rung runs, or fails the task outright.

use droidforge_core::{BuildError, BuildPhase};

use crate::session::BuildSession;

#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// The rung cannot run here (missing tool, missing input); the reason is
    /// logged and the next rung is tried.
    Unavailable(String),
}

pub trait Strategy<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, session: &BuildSession) -> Result<Attempt<T>, BuildError>;
}

/// Runs `strategies` in order until one completes. `what` names the
/// capability in the failure message when every rung is unavailable.
pub fn run_ladder<T>(
    session: &BuildSession,
    phase: BuildPhase,
    what: &str,
    strategies: &[Box<dyn Strategy<T>>],
) -> Result<T, BuildError> {
    let mut reasons = Vec::new();
    for strategy in strategies {
        session.check_cancelled(phase)?;
        match strategy.attempt(session)? {
            Attempt::Done(value) => {
                session.log(format!("{}: used {}", what, strategy.name()));
                return Ok(value);
            }
            Attempt::Unavailable(reason) => {
                session.log(format!("{}: {} unavailable ({})", what, strategy.name(), reason));
                reasons.push(format!("{}: {}", strategy.name(), reason));
            }
        }
    }
    Err(BuildError::new(phase, format!("no usable {}", what)).with_details(reasons.join("\n")))
}
