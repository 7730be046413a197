//! InstallOrchestrator: drives one installation run through
//! `Idle → ResolvingCatalog → ResolvingPlan → Fetching → Verifying → Writing → Done`,
//! dropping into `Failed` from whichever stage raised an error.
//!
//! The run is single-pass. Retries happen inside the catalog client and the
//! fetcher; the pipeline itself is never restarted.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::cancel::CancelToken;
use crate::core::catalog::{CatalogClient, VersionCatalog};
use crate::core::config::InstallerConfig;
use crate::core::downloader::ArtifactFetcher;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::{build_http_client, ReqwestTransport, Transport};
use crate::core::model::{InstallTarget, LoaderKind};
use crate::core::plan::InstallPlan;
use crate::core::progress::{InstallProgress, InstallState, ProgressCallback};
use crate::core::resolver::{LoaderResolver, ResolveRequest};
use crate::core::writer::{
    write_version_files, ClientProfileWriter, ServerBootstrapWriter, ServerLayoutDescriptor,
};

/// Everything the caller decides for one run.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub loader: LoaderKind,
    pub target: InstallTarget,
    pub game_version: Option<String>,
    pub loader_version: Option<String>,
    /// Minecraft directory for clients, server directory for servers.
    pub destination: PathBuf,
    /// Launcher profile store; defaults to `launcher_profiles.json` inside
    /// `destination`. Ignored for servers.
    pub profile_store: Option<PathBuf>,
    /// Register a launcher profile (client) or write a launch script
    /// (server). When off, only the artifacts and version files are placed.
    pub generate: bool,
}

/// What a successful run produced.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallOutput {
    Profile {
        key: String,
        store: PathBuf,
        version_dir: PathBuf,
    },
    /// Client install without a launcher profile.
    Version { id: String, version_dir: PathBuf },
    Server(ServerLayoutDescriptor),
}

#[derive(Debug)]
pub struct InstallFailure {
    /// Stage that raised the error.
    pub stage: InstallState,
    pub error: InstallerError,
}

/// Terminal outcome of a run. Built exactly once per run.
#[derive(Debug)]
pub struct InstallResult {
    pub success: bool,
    pub loader: LoaderKind,
    pub target: InstallTarget,
    /// Resolved versions; `None` when the run failed before resolution.
    pub game_version: Option<String>,
    pub loader_version: Option<String>,
    pub output: Option<InstallOutput>,
    /// Destinations of every artifact the plan placed.
    pub produced: Vec<PathBuf>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failure: Option<InstallFailure>,
}

impl InstallResult {
    pub fn is_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|f| f.error.is_cancelled())
    }
}

/// Tracks the current stage and reports every transition.
struct StageTracker {
    state: InstallState,
    progress: ProgressCallback,
}

impl StageTracker {
    fn new(progress: ProgressCallback) -> Self {
        Self {
            state: InstallState::Idle,
            progress,
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            self.state = next;
            info!("{}", next);
            (self.progress)(&InstallProgress::Stage(next));
        }
    }

    fn fail(&mut self) -> InstallState {
        let stage = self.state;
        self.state = InstallState::Failed;
        (self.progress)(&InstallProgress::Stage(InstallState::Failed));
        stage
    }
}

#[derive(Default)]
struct RunSummary {
    game_version: Option<String>,
    loader_version: Option<String>,
    produced: Vec<PathBuf>,
    downloaded: usize,
    skipped: usize,
}

pub struct InstallOrchestrator {
    config: InstallerConfig,
    transport: Arc<dyn Transport>,
    cancel: CancelToken,
}

impl InstallOrchestrator {
    /// Orchestrator backed by a real HTTP client.
    pub fn new(config: InstallerConfig) -> InstallerResult<Self> {
        config.validate()?;
        let client = build_http_client(&config.user_agent, config.request_timeout())?;
        Ok(Self::with_transport(
            config,
            Arc::new(ReqwestTransport::new(client)),
        ))
    }

    pub fn with_transport(config: InstallerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cancel: CancelToken::new(),
        }
    }

    /// Token that aborts the run in progress.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    fn catalog_client(&self, progress: ProgressCallback) -> CatalogClient {
        CatalogClient::new(
            Arc::clone(&self.transport),
            self.config.endpoints.clone(),
            self.config.retry,
            self.cancel.clone(),
        )
        .with_progress(progress)
    }

    /// Fetch a catalog outside of an install run.
    pub async fn catalog(&self, kind: LoaderKind) -> InstallerResult<VersionCatalog> {
        self.catalog_client(crate::core::progress::silent())
            .fetch_catalog(kind)
            .await
    }

    /// Run one installation to completion. Errors are reported in the
    /// returned [`InstallResult`], never as a panic or a partial success.
    pub async fn run(&self, request: InstallRequest, on_progress: ProgressCallback) -> InstallResult {
        let mut tracker = StageTracker::new(Arc::clone(&on_progress));
        let mut summary = RunSummary::default();

        info!(
            "Installing {} ({}) into {:?}",
            request.loader.display_name(),
            request.target,
            request.destination
        );

        let outcome = self
            .execute(&request, &on_progress, &mut tracker, &mut summary)
            .await;

        let (output, failure) = match outcome {
            Ok(output) => {
                tracker.advance();
                (Some(output), None)
            }
            Err(error) => {
                let stage = tracker.fail();
                if error.is_cancelled() {
                    warn!("Installation cancelled during {:?}", stage);
                } else {
                    error!("Installation failed during {:?}: {}", stage, error);
                }
                (None, Some(InstallFailure { stage, error }))
            }
        };

        InstallResult {
            success: failure.is_none(),
            loader: request.loader,
            target: request.target,
            game_version: summary.game_version,
            loader_version: summary.loader_version,
            output,
            produced: summary.produced,
            downloaded: summary.downloaded,
            skipped: summary.skipped,
            failure,
        }
    }

    async fn execute(
        &self,
        request: &InstallRequest,
        progress: &ProgressCallback,
        tracker: &mut StageTracker,
        summary: &mut RunSummary,
    ) -> InstallerResult<InstallOutput> {
        tracker.advance();
        self.cancel.check()?;
        let client = self.catalog_client(Arc::clone(progress));
        let catalog = client.fetch_catalog(request.loader).await?;

        tracker.advance();
        self.cancel.check()?;
        let resolver = LoaderResolver::new(client, self.config.server.clone());
        let plan = resolver
            .resolve(
                &catalog,
                &ResolveRequest {
                    game_version: request.game_version.clone(),
                    loader_version: request.loader_version.clone(),
                    target: request.target,
                    root: request.destination.clone(),
                },
            )
            .await?;
        summary.game_version = Some(plan.game_version().to_string());
        summary.loader_version = Some(plan.loader_version().to_string());

        tracker.advance();
        let fetcher = ArtifactFetcher::new(Arc::clone(&self.transport), self.cancel.clone())
            .with_concurrency(self.config.download_workers())
            .with_retry(self.config.retry)
            .with_min_free_bytes(self.config.min_free_disk_bytes())
            .with_progress(Arc::clone(progress));
        let fetched = fetcher.fetch(plan.root(), plan.artifacts()).await?;
        summary.skipped = fetched.iter().filter(|f| f.skipped).count();
        summary.downloaded = fetched.len() - summary.skipped;

        tracker.advance();
        self.cancel.check()?;
        fetcher.verify_all(plan.root(), plan.artifacts()).await?;
        summary.produced = plan
            .artifacts()
            .iter()
            .map(|a| a.destination(plan.root()))
            .collect();

        tracker.advance();
        self.cancel.check()?;
        self.write(request, &plan).await
    }

    async fn write(&self, request: &InstallRequest, plan: &InstallPlan) -> InstallerResult<InstallOutput> {
        match plan.target() {
            InstallTarget::Client if !request.generate => {
                let id = write_version_files(plan).await?;
                Ok(InstallOutput::Version {
                    version_dir: plan.root().join("versions").join(&id),
                    id,
                })
            }
            InstallTarget::Client => {
                let writer = match &request.profile_store {
                    Some(store) => ClientProfileWriter::new(store),
                    None => ClientProfileWriter::for_minecraft_dir(plan.root()),
                };
                let key = writer.write_profile(plan).await?;
                Ok(InstallOutput::Profile {
                    version_dir: plan.root().join("versions").join(&key),
                    store: writer.store_path().to_path_buf(),
                    key,
                })
            }
            InstallTarget::Server => {
                let mut writer = ServerBootstrapWriter::default();
                if !request.generate {
                    writer = writer.without_script();
                }
                let layout = writer.write_server(plan).await?;
                Ok(InstallOutput::Server(layout))
            }
        }
    }
}
