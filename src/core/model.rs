use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported mod loaders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LoaderKind {
    Fabric,
    Forge,
    Quilt,
}

impl LoaderKind {
    /// Prefix used for version ids and launcher profile keys.
    pub const fn artifact_name(self) -> &'static str {
        match self {
            LoaderKind::Fabric => "fabric-loader",
            LoaderKind::Forge => "forge",
            LoaderKind::Quilt => "quilt-loader",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            LoaderKind::Fabric => "Fabric",
            LoaderKind::Forge => "Forge",
            LoaderKind::Quilt => "Quilt",
        }
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderKind::Fabric => write!(f, "fabric"),
            LoaderKind::Forge => write!(f, "forge"),
            LoaderKind::Quilt => write!(f, "quilt"),
        }
    }
}

impl FromStr for LoaderKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fabric" => Ok(LoaderKind::Fabric),
            "forge" => Ok(LoaderKind::Forge),
            "quilt" => Ok(LoaderKind::Quilt),
            other => Err(ParseKindError {
                expected: "fabric, forge or quilt",
                found: other.to_string(),
            }),
        }
    }
}

/// Where the loader is installed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstallTarget {
    #[default]
    Client,
    Server,
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallTarget::Client => write!(f, "client"),
            InstallTarget::Server => write!(f, "server"),
        }
    }
}

impl FromStr for InstallTarget {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(InstallTarget::Client),
            "server" => Ok(InstallTarget::Server),
            other => Err(ParseKindError {
                expected: "client or server",
                found: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("expected {expected}, found '{found}'")]
pub struct ParseKindError {
    expected: &'static str,
    found: String,
}
