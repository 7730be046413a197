//! Output stage: turns a fetched [`InstallPlan`](crate::core::plan::InstallPlan)
//! into something a launcher or an operator can start.

mod lock;
mod profile;
mod server;

use std::path::Path;

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::core::error::{InstallerError, InstallerResult};

pub use lock::{FileLock, DEFAULT_LOCK_WAIT};
pub use profile::{write_version_files, ClientProfileWriter, PROFILE_STORE_FILE};
pub use server::{ServerBootstrapWriter, ServerLayoutDescriptor};

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> InstallerResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| InstallerError::write_failed(path, "path has no parent directory"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| InstallerError::write_failed(parent, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));

    let written = async {
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(InstallerError::write_failed(path, e));
    }
    Ok(())
}

/// Fails unless every planned artifact sits at its destination.
pub(crate) async fn ensure_present(
    root: &Path,
    artifacts: &[crate::core::plan::Artifact],
) -> InstallerResult<()> {
    for artifact in artifacts {
        let path = artifact.destination(root);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(InstallerError::write_failed(
                &path,
                format!("artifact {} has not been fetched", artifact.id),
            ));
        }
    }
    Ok(())
}
