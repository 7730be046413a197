//! Progress events emitted while an installation runs.
//!
//! The orchestrator reports every stage transition, and the fetcher reports
//! per-artifact download progress. Callers pass a [`ProgressCallback`] and
//! render whatever they like (progress bars, log lines, nothing).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

/// Stages of a single installation run. The run only ever moves forward;
/// `Failed` is reachable from every stage between `Idle` and `Done`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    Idle,
    ResolvingCatalog,
    ResolvingPlan,
    Fetching,
    Verifying,
    Writing,
    Done,
    Failed,
}

impl InstallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallState::Done | InstallState::Failed)
    }

    /// The stage that follows this one on the success path.
    pub fn next(self) -> Option<InstallState> {
        match self {
            InstallState::Idle => Some(InstallState::ResolvingCatalog),
            InstallState::ResolvingCatalog => Some(InstallState::ResolvingPlan),
            InstallState::ResolvingPlan => Some(InstallState::Fetching),
            InstallState::Fetching => Some(InstallState::Verifying),
            InstallState::Verifying => Some(InstallState::Writing),
            InstallState::Writing => Some(InstallState::Done),
            InstallState::Done | InstallState::Failed => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            InstallState::Idle => "Idle",
            InstallState::ResolvingCatalog => "Fetching version catalog",
            InstallState::ResolvingPlan => "Resolving install plan",
            InstallState::Fetching => "Downloading artifacts",
            InstallState::Verifying => "Verifying artifacts",
            InstallState::Writing => "Writing output",
            InstallState::Done => "Installation complete",
            InstallState::Failed => "Installation failed",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single progress notification.
#[derive(Debug, Clone, PartialEq)]
pub enum InstallProgress {
    /// The run entered a new stage.
    Stage(InstallState),

    /// A download began.
    ArtifactStarted {
        id: String,
        /// Expected size in bytes, when known.
        total: Option<u64>,
    },

    /// Bytes arrived for an in-flight download.
    ArtifactProgress {
        id: String,
        downloaded: u64,
        total: Option<u64>,
    },

    /// The artifact is in place and verified. `skipped` means a valid copy
    /// was already present and nothing was downloaded.
    ArtifactFinished { id: String, skipped: bool },

    /// A request failed transiently and will be tried again after `delay`.
    Retrying {
        target: String,
        attempt: u32,
        delay: Duration,
    },
}

impl InstallProgress {
    pub fn is_complete(&self) -> bool {
        matches!(self, InstallProgress::Stage(InstallState::Done))
    }
}

/// Shared progress sink. Invoked from download workers, so it must be
/// thread-safe and cheap.
pub type ProgressCallback = Arc<dyn Fn(&InstallProgress) + Send + Sync>;

/// A callback that drops every event.
pub fn silent() -> ProgressCallback {
    Arc::new(|_| {})
}
