use droidforge_core::{BuildError, BuildPhase};

use crate::session::BuildSession;

/// One step of the pipeline. Tasks read their inputs from the session's
/// artifact map and publish their outputs there.
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    fn phase(&self) -> BuildPhase;

    fn execute(&self, session: &BuildSession) -> Result<(), BuildError>;

    /// Broadcast when the build is cancelled; the session token is already
    /// set by then.
    fn cancel(&self) {}
}
