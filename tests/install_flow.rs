//! End-to-end runs of the install pipeline against an in-memory upstream.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use serde_json::{json, Value};

use loader_installer_lib::core::downloader::digest_bytes;
use loader_installer_lib::core::http::{HttpBody, RetryPolicy, Transport};
use loader_installer_lib::core::plan::HashAlgorithm;
use loader_installer_lib::{
    InstallOrchestrator, InstallOutput, InstallProgress, InstallRequest, InstallState,
    InstallTarget, InstallerConfig, InstallerError, LoaderKind, ProgressCallback,
};

const FABRIC_LOADER_JAR: &str =
    "https://maven.fabricmc.net/net/fabricmc/fabric-loader/0.14.22/fabric-loader-0.14.22.jar";
const INTERMEDIARY_JAR: &str =
    "https://maven.fabricmc.net/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar";
const QUILT_LOADER_JAR: &str =
    "https://maven.quiltmc.org/repository/release/org/quiltmc/quilt-loader/0.19.2/quilt-loader-0.19.2.jar";
const SERVER_JAR: &str = "https://piston-data.mojang.com/server-1.20.1.jar";

/// Upstream double: fixed bodies per URL, optional stalls, and hit counts.
#[derive(Default)]
struct Upstream {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    stalls: Mutex<BTreeSet<String>>,
    hits: Mutex<HashMap<String, u32>>,
}

impl Upstream {
    fn serve(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    /// Send one chunk for `url`, then never finish.
    fn stall(&self, url: &str) {
        self.stalls.lock().unwrap().insert(url.to_string());
    }

    fn hits(&self, url: &str) -> u32 {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_hits(&self) -> u32 {
        self.hits.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for Upstream {
    async fn get(&self, url: &str) -> Result<HttpBody, InstallerError> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

        if self.stalls.lock().unwrap().contains(url) {
            let first = stream::iter(vec![Ok::<_, InstallerError>(b"partial".to_vec())]);
            let chunks = futures_util::StreamExt::chain(first, stream::pending());
            return Ok(HttpBody {
                content_length: Some(1024),
                chunks: Box::pin(chunks),
            });
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

fn sha1(bytes: &[u8]) -> String {
    digest_bytes(HashAlgorithm::Sha1, bytes)
}

fn config() -> InstallerConfig {
    InstallerConfig {
        retry: RetryPolicy::immediate(2),
        min_free_disk_mb: 0,
        ..InstallerConfig::default()
    }
}

fn orchestrator(upstream: &Arc<Upstream>) -> InstallOrchestrator {
    InstallOrchestrator::with_transport(config(), Arc::clone(upstream) as Arc<dyn Transport>)
}

fn silent() -> ProgressCallback {
    Arc::new(|_: &InstallProgress| {})
}

fn request(loader: LoaderKind, target: InstallTarget, dest: &Path) -> InstallRequest {
    InstallRequest {
        loader,
        target,
        game_version: Some("1.20.1".into()),
        loader_version: None,
        destination: dest.to_path_buf(),
        profile_store: None,
        generate: true,
    }
}

/// Every regular file under `root`, relative and `/`-separated.
fn files_under(root: &Path) -> BTreeSet<String> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeSet<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap();
                out.insert(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = BTreeSet::new();
    if root.exists() {
        walk(root, root, &mut out);
    }
    out
}

// ── Fabric client ───────────────────────────────────

fn fabric_upstream() -> Arc<Upstream> {
    let upstream = Upstream::default();
    upstream.serve(
        "https://meta.fabricmc.net/v2/versions/game",
        json!([
            { "version": "23w31a", "stable": false },
            { "version": "1.20.1", "stable": true }
        ])
        .to_string(),
    );
    upstream.serve(
        "https://meta.fabricmc.net/v2/versions/loader",
        json!([
            { "separator": ".", "build": 23, "maven": "net.fabricmc:fabric-loader:0.15.0-beta.1", "version": "0.15.0-beta.1", "stable": false },
            { "separator": ".", "build": 22, "maven": "net.fabricmc:fabric-loader:0.14.22", "version": "0.14.22", "stable": true },
            { "separator": ".", "build": 21, "maven": "net.fabricmc:fabric-loader:0.14.21", "version": "0.14.21", "stable": true }
        ])
        .to_string(),
    );

    let loader_jar = b"fabric loader classes".to_vec();
    let intermediary_jar = b"intermediary mappings".to_vec();
    upstream.serve(
        "https://meta.fabricmc.net/v2/versions/loader/1.20.1/0.14.22/profile/json",
        json!({
            "id": "fabric-loader-0.14.22-1.20.1",
            "inheritsFrom": "1.20.1",
            "type": "release",
            "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
            "arguments": { "game": [], "jvm": [] },
            "libraries": [
                { "name": "net.fabricmc:fabric-loader:0.14.22", "url": "https://maven.fabricmc.net/",
                  "sha1": sha1(&loader_jar), "size": loader_jar.len() },
                { "name": "net.fabricmc:intermediary:1.20.1", "url": "https://maven.fabricmc.net/" }
            ]
        })
        .to_string(),
    );
    upstream.serve(FABRIC_LOADER_JAR, loader_jar);
    upstream.serve(&format!("{}.sha1", INTERMEDIARY_JAR), sha1(&intermediary_jar));
    upstream.serve(INTERMEDIARY_JAR, intermediary_jar);
    Arc::new(upstream)
}

#[tokio::test]
async fn fabric_client_defaults_to_recommended_loader() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fabric_upstream();

    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let progress: ProgressCallback = Arc::new(move |event: &InstallProgress| {
        if let InstallProgress::Stage(state) = event {
            sink.lock().unwrap().push(*state);
        }
    });

    let result = orchestrator(&upstream)
        .run(request(LoaderKind::Fabric, InstallTarget::Client, dir.path()), progress)
        .await;

    assert!(result.success, "{:?}", result.failure);
    assert_eq!(result.loader_version.as_deref(), Some("0.14.22"));
    assert_eq!(result.downloaded, 2);
    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            InstallState::ResolvingCatalog,
            InstallState::ResolvingPlan,
            InstallState::Fetching,
            InstallState::Verifying,
            InstallState::Writing,
            InstallState::Done,
        ]
    );

    let Some(InstallOutput::Profile { key, store, .. }) = &result.output else {
        panic!("expected a profile output");
    };
    assert_eq!(key, "fabric-loader-0.14.22-1.20.1");
    let store: Value = serde_json::from_slice(&std::fs::read(store).unwrap()).unwrap();
    assert_eq!(store["profiles"][key]["lastVersionId"], "fabric-loader-0.14.22-1.20.1");

    let files = files_under(dir.path());
    assert!(files.contains("libraries/net/fabricmc/fabric-loader/0.14.22/fabric-loader-0.14.22.jar"));
    assert!(files.contains("libraries/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar"));
    assert!(files.contains("versions/fabric-loader-0.14.22-1.20.1/fabric-loader-0.14.22-1.20.1.json"));
}

#[tokio::test]
async fn rerun_downloads_nothing_and_keeps_files_identical() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fabric_upstream();
    let orchestrator = orchestrator(&upstream);
    let req = request(LoaderKind::Fabric, InstallTarget::Client, dir.path());

    let first = orchestrator.run(req.clone(), silent()).await;
    assert!(first.success, "{:?}", first.failure);
    let library = dir
        .path()
        .join("libraries/net/fabricmc/fabric-loader/0.14.22/fabric-loader-0.14.22.jar");
    let before = std::fs::read(&library).unwrap();

    let second = orchestrator.run(req, silent()).await;
    assert!(second.success, "{:?}", second.failure);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(upstream.hits(FABRIC_LOADER_JAR), 1);
    assert_eq!(upstream.hits(INTERMEDIARY_JAR), 1);
    assert_eq!(std::fs::read(&library).unwrap(), before);
}

#[tokio::test]
async fn rerun_leaves_profile_store_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fabric_upstream();
    let orchestrator = orchestrator(&upstream);
    let req = request(LoaderKind::Fabric, InstallTarget::Client, dir.path());
    let store = dir.path().join("launcher_profiles.json");

    let first = orchestrator.run(req.clone(), silent()).await;
    assert!(first.success, "{:?}", first.failure);
    let before = std::fs::read(&store).unwrap();

    let second = orchestrator.run(req, silent()).await;
    assert!(second.success, "{:?}", second.failure);
    assert_eq!(std::fs::read(&store).unwrap(), before);
}

#[tokio::test]
async fn client_without_profile_skips_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut req = request(LoaderKind::Fabric, InstallTarget::Client, dir.path());
    req.generate = false;

    let result = orchestrator(&fabric_upstream()).run(req, silent()).await;
    assert!(result.success, "{:?}", result.failure);

    let Some(InstallOutput::Version { id, version_dir }) = &result.output else {
        panic!("expected version files only");
    };
    assert_eq!(id, "fabric-loader-0.14.22-1.20.1");
    assert!(version_dir.join(format!("{}.json", id)).exists());
    assert!(!dir.path().join("launcher_profiles.json").exists());
    assert!(!dir.path().join("launcher_profiles.json.lock").exists());
}

#[tokio::test]
async fn profile_store_keeps_existing_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("launcher_profiles.json");
    std::fs::write(
        &store_path,
        json!({
            "profiles": {
                "release": { "name": "", "type": "latest-release", "lastVersionId": "latest-release" },
                "modded": { "name": "Modded", "type": "custom", "javaArgs": "-Xmx6G" }
            },
            "settings": { "crashAssistance": true },
            "version": 3
        })
        .to_string(),
    )
    .unwrap();

    let result = orchestrator(&fabric_upstream())
        .run(request(LoaderKind::Fabric, InstallTarget::Client, dir.path()), silent())
        .await;
    assert!(result.success, "{:?}", result.failure);

    let store: Value = serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    let profiles = store["profiles"].as_object().unwrap();
    assert_eq!(profiles.len(), 3);
    assert_eq!(profiles["modded"]["javaArgs"], "-Xmx6G");
    assert_eq!(store["settings"]["crashAssistance"], true);
    assert!(profiles.contains_key("fabric-loader-0.14.22-1.20.1"));
}

#[tokio::test]
async fn corrupt_download_never_reaches_destination() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fabric_upstream();
    upstream.serve(FABRIC_LOADER_JAR, b"tampered bytes".to_vec());

    let result = orchestrator(&upstream)
        .run(request(LoaderKind::Fabric, InstallTarget::Client, dir.path()), silent())
        .await;

    assert!(!result.success);
    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, InstallState::Fetching);
    match &failure.error {
        InstallerError::ArtifactFetchFailed { artifact, attempts, .. } => {
            assert_eq!(artifact, "net.fabricmc:fabric-loader:0.14.22");
            assert_eq!(*attempts, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(upstream.hits(FABRIC_LOADER_JAR), 2);

    let files = files_under(dir.path());
    assert!(!files.contains("libraries/net/fabricmc/fabric-loader/0.14.22/fabric-loader-0.14.22.jar"));
    assert!(files.iter().all(|f| !f.ends_with(".part")));
    assert!(!dir.path().join("launcher_profiles.json").exists());
}

#[tokio::test]
async fn cancelling_mid_download_leaves_no_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = fabric_upstream();
    upstream.stall(FABRIC_LOADER_JAR);
    let orchestrator = orchestrator(&upstream);

    let cancel = orchestrator.cancel_token();
    let progress: ProgressCallback = Arc::new(move |event: &InstallProgress| {
        if let InstallProgress::ArtifactProgress { id, .. } = event {
            if id == "net.fabricmc:fabric-loader:0.14.22" {
                cancel.cancel();
            }
        }
    });

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        orchestrator.run(request(LoaderKind::Fabric, InstallTarget::Client, dir.path()), progress),
    )
    .await
    .expect("cancellation should end the run promptly");

    assert!(result.is_cancelled());
    assert_eq!(result.failure.as_ref().unwrap().stage, InstallState::Fetching);
    let files = files_under(dir.path());
    assert!(!files.contains("libraries/net/fabricmc/fabric-loader/0.14.22/fabric-loader-0.14.22.jar"));
    assert!(files.iter().all(|f| !f.ends_with(".part")));
}

// ── Forge ───────────────────────────────────────────

#[tokio::test]
async fn forge_rejects_loader_built_for_another_game_version() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Upstream::default();
    upstream.serve(
        "https://maven.minecraftforge.net/net/minecraftforge/forge/maven-metadata.xml",
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <groupId>net.minecraftforge</groupId>
  <artifactId>forge</artifactId>
  <versioning>
    <versions>
      <version>1.16.5-36.2.39</version>
      <version>1.20.1-47.2.0</version>
    </versions>
  </versioning>
</metadata>"#,
    );
    upstream.serve(
        "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json",
        json!({ "promos": { "1.20.1-recommended": "47.2.0", "1.16.5-recommended": "36.2.39" } })
            .to_string(),
    );
    let upstream = Arc::new(upstream);

    let mut req = request(LoaderKind::Forge, InstallTarget::Server, dir.path());
    req.loader_version = Some("36.2.39".into());
    let result = orchestrator(&upstream).run(req, silent()).await;

    let failure = result.failure.as_ref().unwrap();
    assert_eq!(failure.stage, InstallState::ResolvingPlan);
    match &failure.error {
        InstallerError::UnsupportedVersionCombination {
            loader,
            game_version,
            loader_version,
            ..
        } => {
            assert_eq!(*loader, LoaderKind::Forge);
            assert_eq!(game_version, "1.20.1");
            assert_eq!(loader_version, "36.2.39");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(files_under(dir.path()).is_empty());
}

// ── Quilt server ────────────────────────────────────

fn quilt_upstream() -> Arc<Upstream> {
    let upstream = Upstream::default();

    upstream.serve(
        "https://meta.quiltmc.org/v3/versions/game",
        json!([{ "version": "1.20.1", "stable": true }]).to_string(),
    );
    upstream.serve(
        "https://meta.quiltmc.org/v3/versions/loader",
        json!([
            { "separator": ".", "build": 2, "maven": "org.quiltmc:quilt-loader:0.20.0-beta.9", "version": "0.20.0-beta.9" },
            { "separator": ".", "build": 1, "maven": "org.quiltmc:quilt-loader:0.19.2", "version": "0.19.2" }
        ])
        .to_string(),
    );

    let loader_jar = b"quilt loader".to_vec();
    let intermediary_jar = b"intermediary".to_vec();
    let server_jar = b"vanilla server".to_vec();
    upstream.serve(
        "https://meta.quiltmc.org/v3/versions/loader/1.20.1/0.19.2/server/json",
        json!({
            "id": "quilt-loader-0.19.2-1.20.1",
            "inheritsFrom": "1.20.1",
            "mainClass": "org.quiltmc.loader.impl.launch.knot.KnotServer",
            "launcherMainClass": "net.minecraft.server.Main",
            "libraries": [
                { "name": "org.quiltmc:hashed:1.20.1", "url": "https://maven.quiltmc.org/repository/release/" },
                { "name": "net.fabricmc:intermediary:1.20.1", "url": "https://maven.fabricmc.net/", "sha1": sha1(&intermediary_jar) },
                { "name": "org.quiltmc:quilt-loader:0.19.2", "url": "https://maven.quiltmc.org/repository/release/", "sha1": sha1(&loader_jar) }
            ]
        })
        .to_string(),
    );
    upstream.serve(
        "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json",
        json!({
            "latest": { "release": "1.20.1", "snapshot": "1.20.1" },
            "versions": [{ "id": "1.20.1", "type": "release", "url": "https://piston-meta.mojang.com/v1/packages/1.20.1.json" }]
        })
        .to_string(),
    );
    upstream.serve(
        "https://piston-meta.mojang.com/v1/packages/1.20.1.json",
        json!({
            "id": "1.20.1",
            "downloads": { "server": { "sha1": sha1(&server_jar), "size": server_jar.len(), "url": SERVER_JAR } },
            "libraries": []
        })
        .to_string(),
    );
    upstream.serve(QUILT_LOADER_JAR, loader_jar);
    upstream.serve(INTERMEDIARY_JAR, intermediary_jar);
    upstream.serve(SERVER_JAR, server_jar);
    Arc::new(upstream)
}

#[tokio::test]
async fn quilt_server_into_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("server");
    let upstream = quilt_upstream();

    let result = orchestrator(&upstream)
        .run(request(LoaderKind::Quilt, InstallTarget::Server, &root), silent())
        .await;
    assert!(result.success, "{:?}", result.failure);
    assert_eq!(result.loader_version.as_deref(), Some("0.19.2"));

    let script = if cfg!(windows) { "start.bat" } else { "start.sh" };
    let expected: BTreeSet<String> = [
        "server.jar",
        "libraries/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar",
        "libraries/org/quiltmc/quilt-loader/0.19.2/quilt-loader-0.19.2.jar",
        script,
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(files_under(&root), expected);

    let contents = std::fs::read_to_string(root.join(script)).unwrap();
    assert!(contents.contains("org.quiltmc.loader.impl.launch.knot.KnotServer"));
    assert!(contents.contains("-Dloader.gameJarPath=server.jar"));
    assert!(contents.contains("libraries/org/quiltmc/quilt-loader/0.19.2/quilt-loader-0.19.2.jar"));
    assert!(contents.contains("libraries/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar"));
    assert_eq!(
        upstream.hits(
            "https://maven.quiltmc.org/repository/release/org/quiltmc/hashed/1.20.1/hashed-1.20.1.jar"
        ),
        0
    );

    let Some(InstallOutput::Server(layout)) = &result.output else {
        panic!("expected a server layout");
    };
    assert_eq!(layout.root, root);
    assert_eq!(layout.script, Some(root.join(script)));
    assert!(upstream.total_hits() > 0);
}

#[tokio::test]
async fn server_without_script_places_artifacts_only() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("server");
    let upstream = quilt_upstream();
    let mut req = request(LoaderKind::Quilt, InstallTarget::Server, &root);
    req.generate = false;

    let result = orchestrator(&upstream).run(req, silent()).await;
    assert!(result.success, "{:?}", result.failure);

    let expected: BTreeSet<String> = [
        "server.jar",
        "libraries/net/fabricmc/intermediary/1.20.1/intermediary-1.20.1.jar",
        "libraries/org/quiltmc/quilt-loader/0.19.2/quilt-loader-0.19.2.jar",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(files_under(&root), expected);

    let Some(InstallOutput::Server(layout)) = &result.output else {
        panic!("expected a server layout");
    };
    assert_eq!(layout.script, None);
}
