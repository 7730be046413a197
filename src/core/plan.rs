// ─── Install Plan ───
// The fully resolved description of one installation run. Built once by the
// resolver, consumed read-only by the fetcher and the writers.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::model::{InstallTarget, LoaderKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub const fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

/// A well-formed, lowercase hex digest. Cannot be empty.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
pub struct Checksum {
    algorithm: HashAlgorithm,
    hex: String,
}

impl Checksum {
    /// Returns `None` unless `hex` is a digest of the right length.
    pub fn new(algorithm: HashAlgorithm, hex: &str) -> Option<Self> {
        let hex = hex.trim().to_ascii_lowercase();
        if hex.len() != algorithm.hex_len() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self { algorithm, hex })
    }

    pub fn sha1(hex: &str) -> Option<Self> {
        Self::new(HashAlgorithm::Sha1, hex)
    }

    pub fn sha256(hex: &str) -> Option<Self> {
        Self::new(HashAlgorithm::Sha256, hex)
    }

    /// Parse a maven `.sha1` sidecar. Some repositories append the file name
    /// after the digest.
    pub fn from_sidecar(body: &str) -> Option<Self> {
        body.split_whitespace().next().and_then(Self::sha1)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.algorithm {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        };
        write!(f, "{}:{}", tag, self.hex)
    }
}

/// One file the run must place, with the data needed to verify it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Artifact {
    pub id: String,
    pub url: String,
    pub checksum: Checksum,
    pub size: Option<u64>,
    /// Destination relative to the plan root, using `/` separators.
    pub path: PathBuf,
}

impl Artifact {
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }

    /// Classpath-style rendering of the relative path.
    pub fn relative_display(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

/// What the JVM is pointed at.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LaunchEntry {
    MainClass {
        main_class: String,
        classpath: Vec<PathBuf>,
    },
    Jar {
        jar: PathBuf,
    },
    /// JVM `@argfile`s, one per platform family.
    ArgFiles { unix: PathBuf, windows: PathBuf },
}

/// Loader-agnostic description of one `java` invocation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JavaInvocation {
    pub jvm_args: Vec<String>,
    pub entry: LaunchEntry,
    pub program_args: Vec<String>,
}

/// A command the launch script runs once before the first start.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SetupStep {
    pub invocation: JavaInvocation,
    /// Created after the step succeeds; its presence skips the step.
    pub marker: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientLayout {
    pub version_id: String,
    /// Launcher version JSON written to `versions/<id>/<id>.json`.
    pub version_manifest: serde_json::Value,
    pub profile_key: String,
    pub profile_name: String,
    /// Built-in launcher icon name.
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ServerLayout {
    pub java: String,
    pub launch: JavaInvocation,
    pub setup: Option<SetupStep>,
    /// Script file name without extension.
    pub script_stem: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PlanOutput {
    Client(ClientLayout),
    Server(ServerLayout),
}

impl PlanOutput {
    fn target(&self) -> InstallTarget {
        match self {
            PlanOutput::Client(_) => InstallTarget::Client,
            PlanOutput::Server(_) => InstallTarget::Server,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstallPlan {
    loader: LoaderKind,
    target: InstallTarget,
    game_version: String,
    loader_version: String,
    root: PathBuf,
    artifacts: Vec<Artifact>,
    output: PlanOutput,
}

impl InstallPlan {
    /// Build a plan, rejecting anything the downstream stages could not
    /// act on safely.
    pub fn new(
        loader: LoaderKind,
        game_version: impl Into<String>,
        loader_version: impl Into<String>,
        root: impl Into<PathBuf>,
        artifacts: Vec<Artifact>,
        output: PlanOutput,
    ) -> InstallerResult<Self> {
        let root = root.into();
        let mut seen = HashSet::new();

        for artifact in &artifacts {
            if artifact.checksum.hex().is_empty() {
                return Err(InstallerError::MissingChecksum {
                    artifact: artifact.id.clone(),
                });
            }
            if artifact.path.is_absolute()
                || artifact
                    .path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(InstallerError::write_failed(
                    &artifact.path,
                    format!("artifact {} escapes the install root", artifact.id),
                ));
            }
            if !seen.insert(artifact.path.clone()) {
                return Err(InstallerError::write_failed(
                    &artifact.path,
                    format!("artifact {} shares its destination with another", artifact.id),
                ));
            }
        }

        Ok(Self {
            loader,
            target: output.target(),
            game_version: game_version.into(),
            loader_version: loader_version.into(),
            root,
            artifacts,
            output,
        })
    }

    pub fn loader(&self) -> LoaderKind {
        self.loader
    }

    pub fn target(&self) -> InstallTarget {
        self.target
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn loader_version(&self) -> &str {
        &self.loader_version
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn output(&self) -> &PlanOutput {
        &self.output
    }

    /// Sum of the declared sizes; unknown sizes count as zero.
    pub fn known_download_size(&self) -> u64 {
        self.artifacts.iter().filter_map(|a| a.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA1: &str = "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12";

    fn artifact(path: &str) -> Artifact {
        Artifact {
            id: path.to_string(),
            url: format!("https://example.com/{}", path),
            checksum: Checksum::sha1(SHA1).unwrap(),
            size: Some(10),
            path: PathBuf::from(path),
        }
    }

    fn server_output() -> PlanOutput {
        PlanOutput::Server(ServerLayout {
            java: "java".into(),
            launch: JavaInvocation {
                jvm_args: vec![],
                entry: LaunchEntry::Jar {
                    jar: PathBuf::from("server.jar"),
                },
                program_args: vec![],
            },
            setup: None,
            script_stem: "start".into(),
        })
    }

    #[test]
    fn checksum_rejects_empty_and_malformed_digests() {
        assert!(Checksum::sha1("").is_none());
        assert!(Checksum::sha1("abc").is_none());
        assert!(Checksum::sha1(&"z".repeat(40)).is_none());
        assert!(Checksum::sha256(SHA1).is_none());
        assert!(Checksum::sha1(&SHA1.to_uppercase()).is_some());
    }

    #[test]
    fn checksum_is_normalized_to_lowercase() {
        let sum = Checksum::sha1(&SHA1.to_uppercase()).unwrap();
        assert_eq!(sum.hex(), SHA1);
    }

    #[test]
    fn sidecar_may_carry_a_file_name() {
        let sum = Checksum::from_sidecar(&format!("{}  fabric-loader-0.15.11.jar\n", SHA1)).unwrap();
        assert_eq!(sum.hex(), SHA1);
        assert!(Checksum::from_sidecar("<html>not found</html>").is_none());
    }

    #[test]
    fn plan_target_follows_output() {
        let plan = InstallPlan::new(
            LoaderKind::Quilt,
            "1.20.1",
            "0.26.0",
            "/srv/mc",
            vec![artifact("server.jar")],
            server_output(),
        )
        .unwrap();
        assert_eq!(plan.target(), InstallTarget::Server);
        assert_eq!(plan.known_download_size(), 10);
    }

    #[test]
    fn plan_rejects_duplicate_destinations() {
        let err = InstallPlan::new(
            LoaderKind::Fabric,
            "1.20.1",
            "0.15.11",
            "/srv/mc",
            vec![artifact("server.jar"), artifact("server.jar")],
            server_output(),
        )
        .unwrap_err();
        assert!(matches!(err, InstallerError::WriteFailed { .. }));
    }

    #[test]
    fn plan_rejects_paths_outside_root() {
        let err = InstallPlan::new(
            LoaderKind::Fabric,
            "1.20.1",
            "0.15.11",
            "/srv/mc",
            vec![artifact("../evil.jar")],
            server_output(),
        )
        .unwrap_err();
        assert!(matches!(err, InstallerError::WriteFailed { .. }));
    }
}
