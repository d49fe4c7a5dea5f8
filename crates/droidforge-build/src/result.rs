use std::path::PathBuf;
use std::time::Duration;

use droidforge_core::{BuildError, BuildPhase};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    Success {
        output: PathBuf,
        elapsed: Duration,
    },
    Failed {
        phase: Option<BuildPhase>,
        message: String,
        errors: Vec<String>,
    },
    Cancelled,
}

/// Final report of one build. Warnings and log lines are kept whatever the
/// outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildResult {
    pub outcome: BuildOutcome,
    pub warnings: Vec<String>,
    pub logs: Vec<String>,
}

impl BuildResult {
    pub fn success(output: PathBuf, elapsed: Duration) -> Self {
        Self::from_outcome(BuildOutcome::Success { output, elapsed })
    }

    pub fn failed(error: &BuildError, errors: Vec<String>) -> Self {
        Self::from_outcome(BuildOutcome::Failed {
            phase: Some(error.phase),
            message: error.to_string(),
            errors,
        })
    }

    pub fn cancelled() -> Self {
        Self::from_outcome(BuildOutcome::Cancelled)
    }

    fn from_outcome(outcome: BuildOutcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, warnings: Vec<String>, logs: Vec<String>) -> Self {
        self.warnings = warnings;
        self.logs = logs;
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Cancelled)
    }

    pub fn output(&self) -> Option<&PathBuf> {
        match &self.outcome {
            BuildOutcome::Success { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match &self.outcome {
            BuildOutcome::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}
