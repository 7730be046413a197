//! LoaderResolver: turns a catalog and a request into a validated
//! [`InstallPlan`].
//!
//! This is the only place, besides the catalog, that branches on the
//! loader. Version defaulting and compatibility rules live in one
//! [`VersionPolicy`] per loader; plan construction lives in [`meta`] (Fabric,
//! Quilt) and [`forge`].

mod forge;
mod meta;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::catalog::{CatalogClient, VersionCatalog};
use crate::core::config::ServerScriptSettings;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::maven::MavenArtifact;
use crate::core::model::{InstallTarget, LoaderKind};
use crate::core::plan::{Artifact, Checksum, InstallPlan};

const LIBRARIES_DIR: &str = "libraries";

/// Loader-specific rules for picking and validating versions.
pub trait VersionPolicy: Send + Sync {
    /// Game version used when the request names none.
    fn default_game<'a>(&self, catalog: &'a VersionCatalog) -> Option<&'a str>;

    /// Loader version used for `game` when the request names none.
    fn default_loader<'a>(&self, catalog: &'a VersionCatalog, game: &str) -> Option<&'a str>;

    /// Whether `loader` can be installed for `game`.
    fn supports(&self, catalog: &VersionCatalog, game: &str, loader: &str) -> bool {
        catalog.find_loader(loader, game).is_some()
    }
}

/// Fabric and Quilt: loader builds are independent of the game version.
pub struct MetaPolicy;

impl VersionPolicy for MetaPolicy {
    fn default_game<'a>(&self, catalog: &'a VersionCatalog) -> Option<&'a str> {
        let games = catalog.game_versions();
        games
            .iter()
            .find(|g| g.stable)
            .or_else(|| games.first())
            .map(|g| g.id.as_str())
    }

    fn default_loader<'a>(&self, catalog: &'a VersionCatalog, _game: &str) -> Option<&'a str> {
        catalog
            .recommended_loader()
            .or_else(|| catalog.loader_versions().first().map(|l| l.version.as_str()))
    }
}

/// Forge: every build targets exactly one game version; promotions mark the
/// recommended and latest build per game.
pub struct ForgePolicy;

impl VersionPolicy for ForgePolicy {
    fn default_game<'a>(&self, catalog: &'a VersionCatalog) -> Option<&'a str> {
        let games = catalog.game_versions();
        let promoted = |recommended_only: bool| {
            games.iter().find(|g| {
                catalog.promotion(&g.id).is_some_and(|p| {
                    p.recommended.is_some() || (!recommended_only && p.latest.is_some())
                })
            })
        };
        promoted(true)
            .or_else(|| promoted(false))
            .or_else(|| {
                games
                    .iter()
                    .find(|g| !catalog.loaders_for_game(&g.id).is_empty())
            })
            .map(|g| g.id.as_str())
    }

    fn default_loader<'a>(&self, catalog: &'a VersionCatalog, game: &str) -> Option<&'a str> {
        catalog
            .promotion(game)
            .and_then(|p| {
                [p.recommended.as_deref(), p.latest.as_deref()]
                    .into_iter()
                    .flatten()
                    .find(|v| catalog.find_loader(v, game).is_some())
            })
            .or_else(|| {
                catalog
                    .loaders_for_game(game)
                    .into_iter()
                    .next()
                    .map(|l| l.version.as_str())
            })
    }
}

pub fn policy_for(kind: LoaderKind) -> &'static dyn VersionPolicy {
    match kind {
        LoaderKind::Fabric | LoaderKind::Quilt => &MetaPolicy,
        LoaderKind::Forge => &ForgePolicy,
    }
}

/// The exact versions a run will install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedVersions {
    pub game_version: String,
    pub loader_version: String,
}

/// Apply defaults and compatibility checks for the catalog's loader.
pub fn select_versions(
    catalog: &VersionCatalog,
    game_version: Option<&str>,
    loader_version: Option<&str>,
) -> InstallerResult<SelectedVersions> {
    let kind = catalog.loader();
    let policy = policy_for(kind);
    let requested_loader = loader_version.unwrap_or("(default)");

    let game = match game_version {
        Some(game) => {
            if !catalog.has_game_version(game) {
                return Err(InstallerError::unsupported(
                    kind,
                    game,
                    requested_loader,
                    format!("Minecraft {} is not available for {}", game, kind.display_name()),
                ));
            }
            game.to_string()
        }
        None => policy
            .default_game(catalog)
            .ok_or_else(|| {
                InstallerError::unsupported(
                    kind,
                    "(default)",
                    requested_loader,
                    "no installable game version in the catalog",
                )
            })?
            .to_string(),
    };

    let loader = match loader_version {
        Some(loader) => {
            if !policy.supports(catalog, &game, loader) {
                let reason = match catalog
                    .loader_versions()
                    .iter()
                    .find(|l| l.version == loader)
                    .and_then(|l| l.game_version.as_deref())
                {
                    Some(other) => format!("this build targets Minecraft {}", other),
                    None => "loader version is not listed in the catalog".to_string(),
                };
                return Err(InstallerError::unsupported(kind, &game, loader, reason));
            }
            loader.to_string()
        }
        None => policy
            .default_loader(catalog, &game)
            .ok_or_else(|| {
                InstallerError::unsupported(
                    kind,
                    &game,
                    "(default)",
                    "no loader build available for this game version",
                )
            })?
            .to_string(),
    };

    Ok(SelectedVersions {
        game_version: game,
        loader_version: loader,
    })
}

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub game_version: Option<String>,
    pub loader_version: Option<String>,
    pub target: InstallTarget,
    /// Minecraft directory for clients, server directory for servers.
    pub root: PathBuf,
}

pub struct LoaderResolver {
    client: CatalogClient,
    server: ServerScriptSettings,
}

impl LoaderResolver {
    pub fn new(client: CatalogClient, server: ServerScriptSettings) -> Self {
        Self { client, server }
    }

    pub async fn resolve(
        &self,
        catalog: &VersionCatalog,
        request: &ResolveRequest,
    ) -> InstallerResult<InstallPlan> {
        let selected = select_versions(
            catalog,
            request.game_version.as_deref(),
            request.loader_version.as_deref(),
        )?;
        info!(
            "Resolved {} {} for Minecraft {} ({})",
            catalog.loader().display_name(),
            selected.loader_version,
            selected.game_version,
            request.target
        );

        let plan = match catalog.loader() {
            kind @ (LoaderKind::Fabric | LoaderKind::Quilt) => {
                meta::plan(self, kind, &selected, request).await?
            }
            LoaderKind::Forge => forge::plan(self, &selected, request).await?,
        };

        info!(
            "Plan ready: {} artifacts, {} bytes declared",
            plan.artifacts().len(),
            plan.known_download_size()
        );
        Ok(plan)
    }

    /// Checksum from metadata, else from the maven `.sha1` sidecar.
    async fn checksum_for(
        &self,
        artifact_id: &str,
        url: &str,
        sha256: Option<&str>,
        sha1: Option<&str>,
    ) -> InstallerResult<Checksum> {
        if let Some(checksum) = sha256.and_then(Checksum::sha256) {
            return Ok(checksum);
        }
        if let Some(checksum) = sha1.and_then(Checksum::sha1) {
            return Ok(checksum);
        }
        self.client
            .fetch_sha1_sidecar(url)
            .await?
            .ok_or_else(|| InstallerError::MissingChecksum {
                artifact: artifact_id.to_string(),
            })
    }
}

/// `libraries/<repository layout>` for a maven coordinate.
fn library_path(coordinate: &MavenArtifact) -> PathBuf {
    Path::new(LIBRARIES_DIR).join(coordinate.local_path())
}

/// Keep the first artifact for each destination.
fn dedup_by_path(artifacts: Vec<Artifact>) -> Vec<Artifact> {
    let mut seen = std::collections::HashSet::new();
    artifacts
        .into_iter()
        .filter(|a| seen.insert(a.path.clone()))
        .collect()
}
