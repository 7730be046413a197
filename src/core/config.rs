use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::{RetryPolicy, APP_USER_AGENT};

const APP_DIR_NAME: &str = "loader-installer";
const CONFIG_FILE: &str = "config.json";
const MAX_CONCURRENCY: usize = 16;

/// Remote metadata and repository locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Endpoints {
    pub fabric_meta: String,
    pub fabric_maven: String,
    pub quilt_meta: String,
    pub quilt_maven: String,
    pub forge_maven: String,
    pub forge_promotions: String,
    pub mojang_manifest: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fabric_meta: "https://meta.fabricmc.net/v2".into(),
            fabric_maven: "https://maven.fabricmc.net".into(),
            quilt_meta: "https://meta.quiltmc.org/v3".into(),
            quilt_maven: "https://maven.quiltmc.org/repository/release".into(),
            forge_maven: "https://maven.minecraftforge.net".into(),
            forge_promotions:
                "https://files.minecraftforge.net/net/minecraftforge/forge/promotions_slim.json"
                    .into(),
            mojang_manifest: "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json"
                .into(),
        }
    }
}

impl Endpoints {
    fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("fabric_meta", &self.fabric_meta),
            ("fabric_maven", &self.fabric_maven),
            ("quilt_meta", &self.quilt_meta),
            ("quilt_maven", &self.quilt_maven),
            ("forge_maven", &self.forge_maven),
            ("forge_promotions", &self.forge_promotions),
            ("mojang_manifest", &self.mojang_manifest),
        ]
    }
}

/// How generated server launch scripts start Java.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerScriptSettings {
    pub java: String,
    pub jvm_args: Vec<String>,
    pub nogui: bool,
}

impl Default for ServerScriptSettings {
    fn default() -> Self {
        Self {
            java: "java".into(),
            jvm_args: vec!["-Xmx2G".into()],
            nogui: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallerConfig {
    pub endpoints: Endpoints,
    /// Maximum number of parallel downloads.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Free space to keep on the destination disk beyond the download size.
    pub min_free_disk_mb: u64,
    pub server: ServerScriptSettings,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            concurrency: 8,
            retry: RetryPolicy::default(),
            request_timeout_secs: 120,
            user_agent: APP_USER_AGENT.into(),
            min_free_disk_mb: 256,
            server: ServerScriptSettings::default(),
        }
    }
}

impl InstallerConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Without one, the per-user
    /// config file is used when present and defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> InstallerResult<Self> {
        let config = match explicit {
            Some(path) => Self::read_from(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read_from(&path).unwrap_or_else(|e| {
                    warn!("Ignoring unreadable config at {:?}: {}", path, e);
                    Self::default()
                }),
                _ => Self::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn read_from(path: &Path) -> InstallerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| InstallerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: InstallerConfig = serde_json::from_str(&raw)
            .map_err(|e| InstallerError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> InstallerResult<()> {
        for (name, url) in self.endpoints.entries() {
            if url.trim().is_empty() {
                return Err(InstallerError::InvalidConfig(format!(
                    "endpoint '{}' is empty",
                    name
                )));
            }
        }

        if self.retry.attempts == 0 {
            return Err(InstallerError::InvalidConfig(
                "retry.attempts must be at least 1".into(),
            ));
        }

        if self.server.java.trim().is_empty() {
            return Err(InstallerError::InvalidConfig(
                "server.java must name a Java executable".into(),
            ));
        }

        Ok(())
    }

    /// Concurrency clamped to a sane worker pool size.
    pub fn download_workers(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn min_free_disk_bytes(&self) -> u64 {
        self.min_free_disk_mb.saturating_mul(1024 * 1024)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE))
}

/// The official launcher's game directory for the current platform.
pub fn default_minecraft_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        dirs::data_dir().map(|dir| dir.join(".minecraft"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir().map(|dir| dir.join("minecraft"))
    } else {
        dirs::home_dir().map(|dir| dir.join(".minecraft"))
    }
}
