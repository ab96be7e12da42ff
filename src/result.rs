//! [`BuildResult`], [`FailureReason`] and [`StageInfo`].

use std::{path::PathBuf, time::SystemTime};

/// The closed set of failure tags in the build's exit taxonomy. Each
/// variant's `source` preserves the full `stacked_errors` chain that
/// produced it, so no error is silently swallowed in translation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailureReason {
    #[error("fetching source failed: {message}")]
    FetchSourceFailed { message: String },
    #[error("pulling builder image failed: {message}")]
    PullBuilderImageFailed { message: String },
    #[error("pulling runtime image failed: {message}")]
    PullRuntimeImageFailed { message: String },
    #[error("pulling previous image failed: {message}")]
    PullPreviousImageFailed { message: String },
    #[error("installing hook scripts failed: {message}")]
    InstallScriptsFailed { message: String },
    #[error("fetching caller-supplied scripts failed: {message}")]
    ScriptsFetchFailed { message: String },
    #[error("assemble failed: {message}")]
    AssembleFailed { message: String },
    #[error("committing container failed: {message}")]
    CommitContainerFailed { message: String },
    #[error("invalid artifacts mapping: {message}")]
    InvalidArtifactsMapping { message: String },
    #[error("filesystem operation failed: {message}")]
    FSOperationFailed { message: String },
    #[error("builder image declares ONBUILD instructions but the request forbids them")]
    OnBuildForbidden,
    #[error("user is not in the allowed uid list: {message}")]
    UserNotAllowed { message: String },
    #[error("build failed: {message}")]
    GenericS2IBuildFailed { message: String },
}

/// One timed step of the build, for caller-side diagnostics.
#[derive(Debug, Clone)]
pub struct StageInfo {
    pub stage: String,
    pub step: String,
    pub start: SystemTime,
    pub end: SystemTime,
}

impl StageInfo {
    pub fn duration(&self) -> std::time::Duration {
        self.end.duration_since(self.start).unwrap_or_default()
    }
}

/// A small helper an [`crate::orchestrator::Orchestrator`] uses to time a
/// single stage and push a [`StageInfo`] once it completes.
pub struct StageTimer {
    stage: String,
    step: String,
    start: SystemTime,
}

impl StageTimer {
    pub fn start(stage: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            step: step.into(),
            start: SystemTime::now(),
        }
    }

    pub fn finish(self) -> StageInfo {
        StageInfo {
            stage: self.stage,
            step: self.step,
            start: self.start,
            end: SystemTime::now(),
        }
    }
}

/// Result of a [`crate::orchestrator::Orchestrator::build`] call.
#[derive(Debug)]
pub struct BuildResult {
    pub success: bool,
    pub image_id: String,
    pub messages: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub failure: Option<FailureReason>,
    pub stages: Vec<StageInfo>,
}

impl BuildResult {
    pub fn success(image_id: impl Into<String>) -> Self {
        Self {
            success: true,
            image_id: image_id.into(),
            messages: Vec::new(),
            working_dir: None,
            failure: None,
            stages: Vec::new(),
        }
    }

    pub fn failure(failure: FailureReason) -> Self {
        Self {
            success: false,
            image_id: String::new(),
            messages: Vec::new(),
            working_dir: None,
            failure: Some(failure),
            stages: Vec::new(),
        }
    }
}
