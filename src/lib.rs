pub mod cli;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::cancel::CancelToken;
pub use crate::core::config::InstallerConfig;
pub use crate::core::error::{InstallerError, InstallerResult};
pub use crate::core::model::{InstallTarget, LoaderKind};
pub use crate::core::orchestrator::{
    InstallFailure, InstallOrchestrator, InstallOutput, InstallRequest, InstallResult,
};
pub use crate::core::progress::{InstallProgress, InstallState, ProgressCallback};

/// Structured logging for the binary. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,loader_installer_lib=debug")),
        )
        .with_target(false)
        .init();
}
