// ─── Fabric / Quilt Meta ───
// Both loaders publish the same meta API shape; Quilt omits the `stable`
// flag on loader builds and ships an extra mapping library that has to go.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{CatalogClient, GameVersion, LoaderVersion, VersionCatalog};
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::RetryExhausted;
use crate::core::model::{InstallTarget, LoaderKind};

/// Libraries Quilt meta lists that break remapping when shipped alongside
/// intermediary.
const QUILT_EXCLUDED_LIBRARY: &str = "org.quiltmc:hashed";

#[derive(Debug, Deserialize)]
struct MetaGameEntry {
    version: String,
    #[serde(default)]
    stable: bool,
}

#[derive(Debug, Deserialize)]
struct MetaLoaderEntry {
    version: String,
    #[serde(default)]
    stable: Option<bool>,
}

/// Launch profile served by `versions/loader/{game}/{loader}/profile/json`
/// (and `/server/json`). Unknown fields are kept so the client version JSON
/// can be written back without losing anything the launcher needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchProfile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub libraries: Vec<ProfileLibrary>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileLibrary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub(super) async fn fetch_fabric_catalog(client: &CatalogClient) -> InstallerResult<VersionCatalog> {
    let base = client.endpoints().fabric_meta.trim_end_matches('/').to_string();
    fetch_meta_catalog(client, LoaderKind::Fabric, &base, |entry| {
        entry.stable.unwrap_or(false)
    })
    .await
}

pub(super) async fn fetch_quilt_catalog(client: &CatalogClient) -> InstallerResult<VersionCatalog> {
    let base = client.endpoints().quilt_meta.trim_end_matches('/').to_string();
    fetch_meta_catalog(client, LoaderKind::Quilt, &base, |entry| {
        entry.stable.unwrap_or_else(|| quilt_is_stable(&entry.version))
    })
    .await
}

/// Quilt marks pre-releases only in the version string.
pub fn quilt_is_stable(version: &str) -> bool {
    let lower = version.to_ascii_lowercase();
    !lower.contains("beta") && !lower.contains("pre")
}

async fn fetch_meta_catalog(
    client: &CatalogClient,
    kind: LoaderKind,
    base: &str,
    is_stable: impl Fn(&MetaLoaderEntry) -> bool,
) -> InstallerResult<VersionCatalog> {
    let game_url = format!("{}/versions/game", base);
    let loader_url = format!("{}/versions/loader", base);

    let games: Vec<MetaGameEntry> = client.get_json(&game_url).await?;
    let loaders: Vec<MetaLoaderEntry> = client.get_json(&loader_url).await?;

    let game_versions = games
        .into_iter()
        .map(|g| GameVersion {
            id: g.version,
            stable: g.stable,
        })
        .collect();

    let loader_versions = loaders
        .iter()
        .map(|l| LoaderVersion {
            version: l.version.clone(),
            stable: is_stable(l),
            game_version: None,
        })
        .collect();

    VersionCatalog::new(kind, base, game_versions, loader_versions, BTreeMap::new())
}

impl CatalogClient {
    /// Fetch the launch profile of a Fabric or Quilt loader build.
    pub async fn fetch_launch_profile(
        &self,
        kind: LoaderKind,
        game_version: &str,
        loader_version: &str,
        target: InstallTarget,
    ) -> InstallerResult<LaunchProfile> {
        let base = match kind {
            LoaderKind::Fabric => &self.endpoints().fabric_meta,
            LoaderKind::Quilt => &self.endpoints().quilt_meta,
            LoaderKind::Forge => {
                return Err(InstallerError::unsupported(
                    kind,
                    game_version,
                    loader_version,
                    "Forge does not publish meta launch profiles",
                ))
            }
        };
        let side = match target {
            InstallTarget::Client => "profile",
            InstallTarget::Server => "server",
        };
        let url = format!(
            "{}/versions/loader/{}/{}/{}/json",
            base.trim_end_matches('/'),
            game_version,
            loader_version,
            side
        );

        let mut profile: LaunchProfile = match self.fetch_raw(&url).await {
            Ok(bytes) => Self::decode(&url, &bytes)?,
            // Meta answers 400/404 for combinations it does not know.
            Err(RetryExhausted {
                error: InstallerError::DownloadFailed {
                    status: status @ (400 | 404),
                    ..
                },
                ..
            }) => {
                return Err(InstallerError::unsupported(
                    kind,
                    game_version,
                    loader_version,
                    format!("no launch profile published (HTTP {})", status),
                ))
            }
            Err(exhausted) => return Err(Self::unavailable(&url, exhausted)),
        };

        if profile.main_class.trim().is_empty() {
            return Err(InstallerError::CatalogParse {
                url,
                reason: "launch profile has an empty mainClass".into(),
            });
        }

        if kind == LoaderKind::Quilt {
            profile
                .libraries
                .retain(|lib| !lib.name.starts_with(QUILT_EXCLUDED_LIBRARY));
        }

        Ok(profile)
    }
}
