use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{InstallerError, InstallerResult};

const LOCK_STALE_SECS: i64 = 60;
const LOCK_POLL: Duration = Duration::from_millis(250);
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    timestamp: i64,
}

/// Exclusive advisory lock held as a create-new file next to the resource.
/// Released when dropped.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// `<resource>.lock`, waiting up to `wait` for another holder to finish.
    pub async fn acquire(resource: &Path, wait: Duration) -> InstallerResult<Self> {
        let path = lock_path_for(resource);
        let deadline = Instant::now() + wait;
        let mut attempts = 0_u32;

        loop {
            attempts += 1;
            match tokio::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let payload = LockPayload {
                        pid: std::process::id(),
                        timestamp: Utc::now().timestamp(),
                    };
                    let body = serde_json::to_vec(&payload)?;
                    let lock = FileLock { path };
                    file.write_all(&body)
                        .await
                        .map_err(|e| InstallerError::io(&lock.path, e))?;
                    debug!("Acquired lock {:?}", lock.path);
                    return Ok(lock);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if remove_if_stale(&path).await {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(InstallerError::write_failed(
                            resource,
                            format!("another installer holds {:?}", path),
                        ));
                    }
                    if attempts % 20 == 0 {
                        info!("Waiting for lock at {:?}", path);
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(source) => return Err(InstallerError::io(&path, source)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {:?}: {}", self.path, source);
        }
    }
}

fn lock_path_for(resource: &Path) -> PathBuf {
    let mut name = resource
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    resource.with_file_name(name)
}

/// Expired or owned by a dead process. An unreadable payload counts as
/// stale only once the file itself is old enough.
async fn is_stale(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str::<LockPayload>(&content) {
            Ok(payload) => payload_is_stale(&payload),
            Err(_) => file_is_old(path).await,
        },
        Err(_) => false,
    }
}

/// Take a stale lock out of the way. The file is first renamed to a name
/// only this caller knows, so two waiters cannot both delete it; a failed
/// rename means another waiter got there first.
async fn remove_if_stale(path: &Path) -> bool {
    if !is_stale(path).await {
        return false;
    }

    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.stale", Uuid::new_v4()));
    let claimed = path.with_file_name(name);
    if tokio::fs::rename(path, &claimed).await.is_err() {
        return false;
    }

    // The lock may have been replaced between the read and the rename.
    if !is_stale(&claimed).await {
        debug!("Lock {:?} was renewed, putting it back", path);
        if let Err(source) = tokio::fs::hard_link(&claimed, path).await {
            warn!("Failed to restore lock {:?}: {}", path, source);
        }
        let _ = tokio::fs::remove_file(&claimed).await;
        return false;
    }

    warn!("Removing stale lock {:?}", path);
    let _ = tokio::fs::remove_file(&claimed).await;
    true
}

fn payload_is_stale(payload: &LockPayload) -> bool {
    let expired = Utc::now().timestamp().saturating_sub(payload.timestamp) > LOCK_STALE_SECS;

    #[cfg(target_os = "linux")]
    let dead = !PathBuf::from(format!("/proc/{}", payload.pid)).exists();
    #[cfg(not(target_os = "linux"))]
    let dead = false;

    expired || dead
}

async fn file_is_old(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age.as_secs() as i64 > LOCK_STALE_SECS)
}
