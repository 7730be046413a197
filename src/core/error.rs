use std::path::PathBuf;
use thiserror::Error;

use crate::core::model::LoaderKind;

/// Central error type for the installer engine.
/// Every module returns `Result<T, InstallerError>`.
#[derive(Debug, Error)]
pub enum InstallerError {
    // ── Catalog ─────────────────────────────────────────
    #[error("Version metadata unavailable at {url} after {attempts} attempt(s): {reason}")]
    CatalogUnavailable {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Malformed version metadata from {url}: {reason}")]
    CatalogParse { url: String, reason: String },

    // ── Resolution ──────────────────────────────────────
    #[error("{loader} {loader_version} cannot be installed for Minecraft {game_version}: {reason}")]
    UnsupportedVersionCombination {
        loader: LoaderKind,
        game_version: String,
        loader_version: String,
        reason: String,
    },

    #[error("No checksum published for artifact {artifact}")]
    MissingChecksum { artifact: String },

    // ── Fetch / Integrity ───────────────────────────────
    #[error("Failed to fetch {artifact} after {attempts} attempt(s): {reason}")]
    ArtifactFetchFailed {
        artifact: String,
        attempts: u32,
        reason: String,
    },

    #[error("Corrupt artifact at {path:?}: expected {expected}, got {actual}")]
    CorruptArtifact {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Output ──────────────────────────────────────────
    #[error("Failed to write {path:?}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Installation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Formats ─────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Convenience alias used throughout the crate.
pub type InstallerResult<T> = Result<T, InstallerError>;

impl From<std::io::Error> for InstallerError {
    fn from(source: std::io::Error) -> Self {
        InstallerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl InstallerError {
    /// Errors worth another attempt: network hiccups, throttling, server
    /// side failures and downloads whose bytes did not verify.
    pub fn is_transient(&self) -> bool {
        match self {
            InstallerError::Http(err) => !err.is_builder() && !err.is_redirect(),
            InstallerError::DownloadFailed { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            InstallerError::CorruptArtifact { .. } => true,
            InstallerError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallerError::Cancelled)
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InstallerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        InstallerError::WriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(
        loader: LoaderKind,
        game_version: &str,
        loader_version: &str,
        reason: impl Into<String>,
    ) -> Self {
        InstallerError::UnsupportedVersionCombination {
            loader,
            game_version: game_version.to_string(),
            loader_version: loader_version.to_string(),
            reason: reason.into(),
        }
    }
}
