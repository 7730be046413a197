//! VersionCatalogClient: fetches and normalizes upstream version metadata.
//!
//! Each loader publishes its own formats; they are parsed in [`meta`] (Fabric
//! and Quilt) and [`forge`] and normalized into one [`VersionCatalog`]. All
//! requests go through the shared retry policy and honour cancellation.

pub mod forge;
pub mod meta;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::cancel::CancelToken;
use crate::core::config::Endpoints;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::{RetryExhausted, RetryPolicy, Transport};
use crate::core::model::LoaderKind;
use crate::core::plan::Checksum;
use crate::core::progress::{self, InstallProgress, ProgressCallback};
use crate::core::version::{DownloadArtifact, VersionJson, VersionManifest};

pub use forge::{ForgeInstallerManifest, ForgeLibrarySource};
pub use meta::{LaunchProfile, ProfileLibrary};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GameVersion {
    pub id: String,
    pub stable: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LoaderVersion {
    pub version: String,
    pub stable: bool,
    /// Set when the loader build is tied to one game version (Forge).
    pub game_version: Option<String>,
}

/// Per-game promotion markers (Forge `promotions_slim.json`).
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Promotion {
    pub recommended: Option<String>,
    pub latest: Option<String>,
}

/// Snapshot of one loader's available versions, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct VersionCatalog {
    loader: LoaderKind,
    game_versions: Vec<GameVersion>,
    loader_versions: Vec<LoaderVersion>,
    recommended_loader: Option<String>,
    promotions: BTreeMap<String, Promotion>,
}

impl VersionCatalog {
    /// Build a catalog. Empty version lists mean upstream sent something we
    /// cannot resolve against, which is reported as a parse error for `source`.
    pub fn new(
        loader: LoaderKind,
        source: &str,
        game_versions: Vec<GameVersion>,
        loader_versions: Vec<LoaderVersion>,
        promotions: BTreeMap<String, Promotion>,
    ) -> InstallerResult<Self> {
        if game_versions.is_empty() {
            return Err(InstallerError::CatalogParse {
                url: source.to_string(),
                reason: format!("no game versions listed for {}", loader),
            });
        }
        if loader_versions.is_empty() {
            return Err(InstallerError::CatalogParse {
                url: source.to_string(),
                reason: format!("no loader versions listed for {}", loader),
            });
        }

        let recommended_loader = loader_versions
            .iter()
            .find(|v| v.stable && v.game_version.is_none())
            .map(|v| v.version.clone());

        Ok(Self {
            loader,
            game_versions,
            loader_versions,
            recommended_loader,
            promotions,
        })
    }

    pub fn loader(&self) -> LoaderKind {
        self.loader
    }

    pub fn game_versions(&self) -> &[GameVersion] {
        &self.game_versions
    }

    pub fn loader_versions(&self) -> &[LoaderVersion] {
        &self.loader_versions
    }

    /// The game-independent recommended loader (first stable build), if any.
    pub fn recommended_loader(&self) -> Option<&str> {
        self.recommended_loader.as_deref()
    }

    pub fn promotion(&self, game_version: &str) -> Option<&Promotion> {
        self.promotions.get(game_version)
    }

    pub fn has_game_version(&self, id: &str) -> bool {
        self.game_versions.iter().any(|g| g.id == id)
    }

    pub fn find_loader(&self, version: &str, game_version: &str) -> Option<&LoaderVersion> {
        self.loader_versions
            .iter()
            .find(|l| l.version == version && l.serves(game_version))
    }

    /// Loader builds usable with `game_version`, newest first.
    pub fn loaders_for_game(&self, game_version: &str) -> Vec<&LoaderVersion> {
        self.loader_versions
            .iter()
            .filter(|l| l.serves(game_version))
            .collect()
    }
}

impl LoaderVersion {
    fn serves(&self, game_version: &str) -> bool {
        self.game_version
            .as_deref()
            .map_or(true, |g| g == game_version)
    }
}

/// Fetches catalogs and per-version manifests from the configured endpoints.
#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    retry: RetryPolicy,
    cancel: CancelToken,
    progress: ProgressCallback,
}

impl CatalogClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
        retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Self {
        Self {
            transport,
            endpoints,
            retry,
            cancel,
            progress: progress::silent(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch the current catalog for `kind`. Never cached across runs.
    pub async fn fetch_catalog(&self, kind: LoaderKind) -> InstallerResult<VersionCatalog> {
        info!("Fetching {} version catalog", kind.display_name());
        let catalog = match kind {
            LoaderKind::Fabric => meta::fetch_fabric_catalog(self).await?,
            LoaderKind::Quilt => meta::fetch_quilt_catalog(self).await?,
            LoaderKind::Forge => forge::fetch_catalog(self).await?,
        };
        debug!(
            "{} catalog: {} game versions, {} loader versions",
            kind,
            catalog.game_versions().len(),
            catalog.loader_versions().len()
        );
        Ok(catalog)
    }

    /// Vanilla dedicated server download for `game_version`, or `None` when
    /// Mojang publishes no server jar for it.
    pub async fn fetch_vanilla_server(
        &self,
        game_version: &str,
    ) -> InstallerResult<Option<DownloadArtifact>> {
        let manifest: VersionManifest = self.get_json(&self.endpoints.mojang_manifest).await?;
        let Some(entry) = manifest.find_version(game_version) else {
            return Ok(None);
        };
        let version: VersionJson = self.get_json(&entry.url).await?;
        Ok(version.downloads.and_then(|d| d.server))
    }

    /// Read the `.sha1` sidecar published next to a maven artifact.
    /// A missing sidecar (HTTP 404) is `None`, not an error.
    pub async fn fetch_sha1_sidecar(&self, artifact_url: &str) -> InstallerResult<Option<Checksum>> {
        let url = format!("{}.sha1", artifact_url);
        match self.fetch_raw(&url).await {
            Ok(bytes) => {
                let body = String::from_utf8_lossy(&bytes);
                Checksum::from_sidecar(&body)
                    .map(Some)
                    .ok_or_else(|| InstallerError::CatalogParse {
                        url,
                        reason: "sidecar does not hold a SHA-1 digest".into(),
                    })
            }
            Err(RetryExhausted {
                error: InstallerError::DownloadFailed { status: 404, .. },
                ..
            }) => Ok(None),
            Err(exhausted) => Err(Self::unavailable(&url, exhausted)),
        }
    }

    pub(crate) async fn get_bytes(&self, url: &str) -> InstallerResult<Vec<u8>> {
        self.fetch_raw(url)
            .await
            .map_err(|exhausted| Self::unavailable(url, exhausted))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> InstallerResult<T> {
        let bytes = self.get_bytes(url).await?;
        Self::decode(url, &bytes)
    }

    fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> InstallerResult<T> {
        serde_json::from_slice(bytes).map_err(|e| InstallerError::CatalogParse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    pub(crate) async fn get_text(&self, url: &str) -> InstallerResult<String> {
        let bytes = self.get_bytes(url).await?;
        String::from_utf8(bytes).map_err(|e| InstallerError::CatalogParse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_raw(&self, url: &str) -> Result<Vec<u8>, RetryExhausted> {
        debug!("GET {}", url);
        let progress = self.progress.as_ref();
        self.retry
            .run(
                &self.cancel,
                |attempt, delay, _| {
                    progress(&InstallProgress::Retrying {
                        target: url.to_string(),
                        attempt,
                        delay,
                    })
                },
                |_| async move {
                    let request = async { self.transport.get(url).await?.collect().await };
                    tokio::select! {
                        _ = self.cancel.cancelled() => Err(InstallerError::Cancelled),
                        body = request => body,
                    }
                },
            )
            .await
    }

    fn unavailable(url: &str, exhausted: RetryExhausted) -> InstallerError {
        match exhausted.error {
            InstallerError::Cancelled => InstallerError::Cancelled,
            error => InstallerError::CatalogUnavailable {
                url: url.to_string(),
                attempts: exhausted.attempts,
                reason: error.to_string(),
            },
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::core::http::HttpBody;

    /// In-memory transport: unknown URLs answer 404, queued failures are
    /// served before the stored body.
    #[derive(Default)]
    pub(crate) struct MapTransport {
        pub bodies: Mutex<HashMap<String, Vec<u8>>>,
        pub failures: Mutex<HashMap<String, Vec<u16>>>,
        pub hits: Mutex<HashMap<String, u32>>,
    }

    impl MapTransport {
        pub fn with(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.lock().unwrap().insert(url.to_string(), body.into());
            self
        }

        pub fn failing(self, url: &str, statuses: &[u16]) -> Self {
            self.failures
                .lock()
                .unwrap()
                .insert(url.to_string(), statuses.to_vec());
            self
        }

        pub fn hits(&self, url: &str) -> u32 {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Transport for MapTransport {
        async fn get(&self, url: &str) -> InstallerResult<HttpBody> {
            *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;
            if let Some(queue) = self.failures.lock().unwrap().get_mut(url) {
                if !queue.is_empty() {
                    let status = queue.remove(0);
                    return Err(InstallerError::DownloadFailed {
                        url: url.to_string(),
                        status,
                    });
                }
            }
            match self.bodies.lock().unwrap().get(url) {
                Some(body) => Ok(HttpBody::from_bytes(body.clone())),
                None => Err(InstallerError::DownloadFailed {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    pub(crate) fn client(transport: MapTransport) -> (Arc<MapTransport>, CatalogClient) {
        let transport = Arc::new(transport);
        let client = CatalogClient::new(
            transport.clone(),
            Endpoints::default(),
            RetryPolicy::immediate(3),
            CancelToken::new(),
        );
        (transport, client)
    }

    #[test]
    fn empty_lists_are_rejected() {
        let err = VersionCatalog::new(
            LoaderKind::Fabric,
            "https://meta",
            vec![],
            vec![LoaderVersion {
                version: "0.15.0".into(),
                stable: true,
                game_version: None,
            }],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, InstallerError::CatalogParse { .. }));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let url = "https://example.com/data.json";
        let (transport, client) =
            client(MapTransport::default().with(url, "[1]").failing(url, &[503, 502]));
        let value: Vec<u32> = client.get_json(url).await.unwrap();
        assert_eq!(value, vec![1]);
        assert_eq!(transport.hits(url), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_become_catalog_unavailable() {
        let url = "https://example.com/data.json";
        let (transport, client) =
            client(MapTransport::default().with(url, "[]").failing(url, &[500, 500, 500]));
        let err = client.get_bytes(url).await.unwrap_err();
        match err {
            InstallerError::CatalogUnavailable { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.hits(url), 3);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let url = "https://example.com/data.json";
        let (_, client) = client(MapTransport::default().with(url, "{not json"));
        let err = client.get_json::<Vec<u32>>(url).await.unwrap_err();
        assert!(matches!(err, InstallerError::CatalogParse { .. }));
    }

    #[tokio::test]
    async fn missing_sidecar_is_none() {
        let (_, client) = client(MapTransport::default().with(
            "https://m/a.jar.sha1",
            "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12  a.jar\n",
        ));
        let found = client.fetch_sha1_sidecar("https://m/a.jar").await.unwrap();
        assert_eq!(
            found.unwrap().hex(),
            "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12"
        );
        assert!(client
            .fetch_sha1_sidecar("https://m/b.jar")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn vanilla_server_lookup() {
        let manifest = serde_json::json!({
            "versions": [{ "id": "1.20.1", "type": "release", "url": "https://p/1.20.1.json" }]
        });
        let version = serde_json::json!({
            "downloads": { "server": { "sha1": "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12", "size": 5, "url": "https://p/server.jar" } }
        });
        let (_, client) = client(
            MapTransport::default()
                .with(&Endpoints::default().mojang_manifest, manifest.to_string())
                .with("https://p/1.20.1.json", version.to_string()),
        );
        let server = client.fetch_vanilla_server("1.20.1").await.unwrap().unwrap();
        assert_eq!(server.url, "https://p/server.jar");
        assert!(client.fetch_vanilla_server("1.2.5").await.unwrap().is_none());
    }
}
