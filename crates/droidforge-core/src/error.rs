use std::fmt;

/// Pipeline stage an error originated in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    Configuration,
    ToolchainInstall,
    DependencyResolution,
    NativeCompilation,
    KotlinCompilation,
    JavaCompilation,
    ResourceProcessing,
    DexConversion,
    Optimization,
    Packaging,
    Signing,
    Pipeline,
}

impl BuildPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildPhase::Configuration => "configuration",
            BuildPhase::ToolchainInstall => "toolchain-install",
            BuildPhase::DependencyResolution => "dependency-resolution",
            BuildPhase::NativeCompilation => "native-compilation",
            BuildPhase::KotlinCompilation => "kotlin-compilation",
            BuildPhase::JavaCompilation => "java-compilation",
            BuildPhase::ResourceProcessing => "resource-processing",
            BuildPhase::DexConversion => "dex-conversion",
            BuildPhase::Optimization => "optimization",
            BuildPhase::Packaging => "packaging",
            BuildPhase::Signing => "signing",
            BuildPhase::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Failed,
    Cancelled,
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Phase-tagged failure raised by a build task or the orchestrator.
#[derive(Debug, thiserror::Error)]
#[error("{phase}: {message}")]
pub struct BuildError {
    pub phase: BuildPhase,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
    #[source]
    pub source: Option<BoxedSource>,
}

impl BuildError {
    pub fn new(phase: BuildPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            kind: ErrorKind::Failed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn cancelled(phase: BuildPhase) -> Self {
        Self {
            phase,
            kind: ErrorKind::Cancelled,
            message: "build cancelled".to_string(),
            details: None,
            source: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        let details = details.into();
        if !details.trim().is_empty() {
            self.details = Some(details);
        }
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Message plus details and cause, for build reports.
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        if let Some(source) = &self.source {
            report.push_str(&format!(" (caused by: {})", source));
        }
        if let Some(details) = &self.details {
            report.push('\n');
            report.push_str(details.trim_end());
        }
        report
    }
}
