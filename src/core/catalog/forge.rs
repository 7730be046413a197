// ─── Forge ───
// Versions come from the maven metadata (`GAME-LOADER` entries), markers from
// promotions_slim.json, and per-build library lists from the installer jar.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use super::{CatalogClient, GameVersion, LoaderVersion, Promotion, VersionCatalog};
use crate::core::downloader::digest_bytes;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::maven::{MavenArtifact, MavenMetadata};
use crate::core::model::LoaderKind;
use crate::core::plan::Checksum;
use crate::core::version::{version_sort_key, LibraryEntry};

const FORGE_GROUP_PATH: &str = "net/minecraftforge/forge";

#[derive(Debug, Deserialize)]
struct PromotionsSlim {
    promos: BTreeMap<String, String>,
}

/// Subset of `install_profile.json` (profile format 1).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallProfile {
    #[serde(default)]
    minecraft: Option<String>,
    /// Path of the version JSON inside the jar, e.g. `/version.json`.
    #[serde(default)]
    json: Option<String>,
    #[serde(default)]
    libraries: Vec<LibraryEntry>,
}

#[derive(Debug, Deserialize)]
struct EmbeddedVersion {
    #[serde(default)]
    libraries: Vec<LibraryEntry>,
}

/// Everything the resolver needs from one Forge installer jar.
#[derive(Debug, Clone)]
pub struct ForgeInstallerManifest {
    pub installer: MavenArtifact,
    pub installer_url: String,
    pub installer_checksum: Checksum,
    pub installer_size: u64,
    /// Game version the installer declares, if any.
    pub minecraft: Option<String>,
    /// Pre-1.13 installers (`versionInfo` layout).
    pub legacy: bool,
    /// Libraries from the install profile and the embedded version JSON.
    pub libraries: Vec<LibraryEntry>,
    /// Verified installer bytes when they came over the network rather
    /// than from the cached copy.
    pub downloaded: Option<Vec<u8>>,
}

/// Where a Forge library comes from once OS rules have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeLibrarySource {
    pub path: String,
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl ForgeInstallerManifest {
    /// Downloadable libraries for the host OS, deduplicated by path.
    pub fn downloadable_libraries(&self) -> Vec<ForgeLibrarySource> {
        let mut seen = BTreeSet::new();
        self.libraries
            .iter()
            .filter(|lib| lib.is_allowed_for_current_os())
            .filter_map(|lib| lib.remote_artifact())
            .filter(|artifact| seen.insert(artifact.path.clone()))
            .map(|artifact| ForgeLibrarySource {
                path: artifact.path.clone(),
                url: artifact.url.clone(),
                sha1: artifact.sha1.clone().filter(|s| !s.is_empty()),
                size: artifact.size.filter(|s| *s > 0),
            })
            .collect()
    }
}

/// Split a maven version string into game and loader parts
/// (`1.20.1-47.2.0` → `("1.20.1", "47.2.0")`).
pub fn split_version(full: &str) -> Option<(&str, &str)> {
    full.split_once('-')
        .filter(|(game, loader)| !game.is_empty() && !loader.is_empty())
}

pub fn installer_artifact(game_version: &str, loader_version: &str) -> MavenArtifact {
    MavenArtifact {
        group_id: "net.minecraftforge".into(),
        artifact_id: "forge".into(),
        version: format!("{}-{}", game_version, loader_version),
        classifier: Some("installer".into()),
        extension: "jar".into(),
    }
}

pub(super) async fn fetch_catalog(client: &CatalogClient) -> InstallerResult<VersionCatalog> {
    let endpoints = client.endpoints();
    let metadata_url = format!(
        "{}/{}/maven-metadata.xml",
        endpoints.forge_maven.trim_end_matches('/'),
        FORGE_GROUP_PATH
    );

    let xml = client.get_text(&metadata_url).await?;
    let metadata = MavenMetadata::parse(&xml).map_err(|e| InstallerError::CatalogParse {
        url: metadata_url.clone(),
        reason: e.to_string(),
    })?;

    let slim: PromotionsSlim = client.get_json(&endpoints.forge_promotions).await?;
    let promotions = parse_promotions(&slim.promos);

    let (game_versions, loader_versions) = build_versions(metadata.versions(), &promotions);
    VersionCatalog::new(
        LoaderKind::Forge,
        &metadata_url,
        game_versions,
        loader_versions,
        promotions,
    )
}

fn parse_promotions(promos: &BTreeMap<String, String>) -> BTreeMap<String, Promotion> {
    let mut out: BTreeMap<String, Promotion> = BTreeMap::new();
    for (key, loader) in promos {
        let Some((game, marker)) = key.rsplit_once('-') else {
            continue;
        };
        let entry = out.entry(game.to_string()).or_default();
        match marker {
            "recommended" => entry.recommended = Some(loader.clone()),
            "latest" => entry.latest = Some(loader.clone()),
            _ => {}
        }
    }
    out
}

fn build_versions(
    versions: &[String],
    promotions: &BTreeMap<String, Promotion>,
) -> (Vec<GameVersion>, Vec<LoaderVersion>) {
    let mut games = BTreeSet::new();
    let mut loaders = Vec::new();

    for full in versions {
        let Some((game, loader)) = split_version(full) else {
            debug!("Skipping unrecognised Forge version {}", full);
            continue;
        };
        games.insert(game.to_string());
        let recommended = promotions
            .get(game)
            .and_then(|p| p.recommended.as_deref())
            == Some(loader);
        loaders.push(LoaderVersion {
            version: loader.to_string(),
            stable: recommended,
            game_version: Some(game.to_string()),
        });
    }

    let mut game_versions: Vec<GameVersion> = games
        .into_iter()
        .map(|id| GameVersion {
            stable: !id.contains("pre"),
            id,
        })
        .collect();
    game_versions.sort_by(|a, b| version_sort_key(&b.id).cmp(&version_sort_key(&a.id)));

    loaders.sort_by(|a, b| {
        let game_a = a.game_version.as_deref().unwrap_or_default();
        let game_b = b.game_version.as_deref().unwrap_or_default();
        version_sort_key(game_b)
            .cmp(&version_sort_key(game_a))
            .then_with(|| version_sort_key(&b.version).cmp(&version_sort_key(&a.version)))
    });

    (game_versions, loaders)
}

impl CatalogClient {
    /// Read the install manifest out of the Forge installer for one build.
    ///
    /// When `cached` points at an installer that still matches the published
    /// checksum it is read from disk instead of downloaded again.
    pub async fn fetch_forge_installer(
        &self,
        game_version: &str,
        loader_version: &str,
        cached: Option<&Path>,
    ) -> InstallerResult<ForgeInstallerManifest> {
        let installer = installer_artifact(game_version, loader_version);
        let url = installer.url(&self.endpoints().forge_maven);

        let checksum = self.fetch_sha1_sidecar(&url).await?.ok_or_else(|| {
            InstallerError::MissingChecksum {
                artifact: installer.to_string(),
            }
        })?;

        let local = match cached {
            Some(path) => read_if_matches(path, &checksum).await,
            None => None,
        };
        let (bytes, fresh) = match local {
            Some(bytes) => {
                debug!("Reusing Forge installer at {:?}", cached);
                (bytes, false)
            }
            None => {
                info!("Downloading Forge installer {}", installer);
                (self.fetch_verified(&url, &checksum).await?, true)
            }
        };

        let parsed = read_installer(&bytes).map_err(|e| InstallerError::CatalogParse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(ForgeInstallerManifest {
            installer,
            installer_url: url,
            installer_checksum: checksum,
            installer_size: bytes.len() as u64,
            minecraft: parsed.minecraft,
            legacy: parsed.legacy,
            libraries: parsed.libraries,
            downloaded: fresh.then_some(bytes),
        })
    }

    async fn fetch_verified(&self, url: &str, checksum: &Checksum) -> InstallerResult<Vec<u8>> {
        let result = self
            .retry_policy()
            .run(self.cancel_token(), |_, _, _| {}, |_| async move {
                let bytes = self.get_bytes(url).await?;
                let actual = digest_bytes(checksum.algorithm(), &bytes);
                if actual != checksum.hex() {
                    return Err(InstallerError::CorruptArtifact {
                        path: url.into(),
                        expected: checksum.hex().to_string(),
                        actual,
                    });
                }
                Ok(bytes)
            })
            .await;
        result.map_err(|exhausted| exhausted.error)
    }
}

async fn read_if_matches(path: &Path, checksum: &Checksum) -> Option<Vec<u8>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    (digest_bytes(checksum.algorithm(), &bytes) == checksum.hex()).then_some(bytes)
}

struct ParsedInstaller {
    minecraft: Option<String>,
    legacy: bool,
    libraries: Vec<LibraryEntry>,
}

fn read_installer(bytes: &[u8]) -> InstallerResult<ParsedInstaller> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

    let raw: serde_json::Value = {
        let file = archive.by_name("install_profile.json")?;
        serde_json::from_reader(file)?
    };

    if raw.get("versionInfo").is_some() {
        let minecraft = raw
            .pointer("/install/minecraft")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        return Ok(ParsedInstaller {
            minecraft,
            legacy: true,
            libraries: Vec::new(),
        });
    }

    let profile: InstallProfile = serde_json::from_value(raw)?;
    let version_path = profile
        .json
        .as_deref()
        .unwrap_or("version.json")
        .trim_start_matches('/')
        .to_string();

    let mut contents = String::new();
    archive.by_name(&version_path)?.read_to_string(&mut contents)?;
    let embedded: EmbeddedVersion = serde_json::from_str(&contents)?;

    let mut libraries = profile.libraries;
    libraries.extend(embedded.libraries);

    Ok(ParsedInstaller {
        minecraft: profile.minecraft,
        legacy: false,
        libraries,
    })
}
