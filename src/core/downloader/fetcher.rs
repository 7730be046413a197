use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use super::verify::{is_valid, verify};
use crate::core::cancel::CancelToken;
use crate::core::error::{InstallerError, InstallerResult};
use crate::core::http::{RetryExhausted, RetryPolicy, Transport};
use crate::core::plan::Artifact;
use crate::core::progress::{self, InstallProgress, ProgressCallback};

/// Outcome for one artifact of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub id: String,
    pub path: PathBuf,
    /// A verified copy was already in place; nothing was downloaded.
    pub skipped: bool,
}

/// Concurrent, checksum-verified artifact downloader.
///
/// Every download lands in a temporary file next to its destination and is
/// renamed into place only after verification, so a destination path never
/// holds partial or unverified bytes.
pub struct ArtifactFetcher {
    transport: Arc<dyn Transport>,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancelToken,
    /// Free space to keep on the target disk beyond the download itself.
    min_free_bytes: u64,
    progress: ProgressCallback,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn Transport>, cancel: CancelToken) -> Self {
        Self {
            transport,
            concurrency: 8,
            retry: RetryPolicy::default(),
            cancel,
            min_free_bytes: 0,
            progress: progress::silent(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    // ── Batch fetch ─────────────────────────────────────

    /// Place every artifact under `root`.
    ///
    /// Artifacts already present with a matching checksum are skipped. The
    /// first artifact that exhausts its retries fails the whole batch;
    /// artifacts placed before that stay, so a later run resumes.
    pub async fn fetch(
        &self,
        root: &Path,
        artifacts: &[Artifact],
    ) -> InstallerResult<Vec<FetchedArtifact>> {
        self.cancel.check()?;

        let checked: Vec<(&Artifact, bool)> = stream::iter(artifacts)
            .map(|artifact| async move {
                let present = already_present(root, artifact).await;
                (artifact, present)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut results = Vec::with_capacity(artifacts.len());
        let mut pending = Vec::new();
        for (artifact, present) in checked {
            if present {
                debug!("Already present: {}", artifact.id);
                (self.progress)(&InstallProgress::ArtifactFinished {
                    id: artifact.id.clone(),
                    skipped: true,
                });
                results.push(FetchedArtifact {
                    id: artifact.id.clone(),
                    path: artifact.destination(root),
                    skipped: true,
                });
            } else {
                pending.push(artifact);
            }
        }

        if pending.is_empty() {
            info!("All {} artifacts already present", artifacts.len());
            return Ok(results);
        }

        let needed: u64 = pending.iter().filter_map(|a| a.size).sum();
        ensure_free_space(root, needed.saturating_add(self.min_free_bytes))?;

        info!(
            "Downloading {} of {} artifacts, concurrency={}",
            pending.len(),
            artifacts.len(),
            self.concurrency
        );

        let downloaded: Vec<FetchedArtifact> = stream::iter(pending)
            .map(|artifact| self.fetch_one(root, artifact))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        results.extend(downloaded);
        Ok(results)
    }

    /// Re-check every artifact at its destination.
    pub async fn verify_all(&self, root: &Path, artifacts: &[Artifact]) -> InstallerResult<()> {
        stream::iter(artifacts)
            .map(|artifact| async move {
                self.cancel.check()?;
                let dest = artifact.destination(root);
                let checksum = artifact.checksum.clone();
                let size = artifact.size;
                let check_path = dest.clone();
                let outcome = tokio::task::spawn_blocking(move || verify(&check_path, &checksum, size))
                    .await
                    .map_err(|e| InstallerError::io(&dest, std::io::Error::other(e)))?;
                match outcome {
                    Err(InstallerError::Io { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        Err(InstallerError::CorruptArtifact {
                            path: dest,
                            expected: artifact.checksum.hex().to_string(),
                            actual: "missing file".into(),
                        })
                    }
                    other => other,
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    // ── Single artifact ─────────────────────────────────

    async fn fetch_one(&self, root: &Path, artifact: &Artifact) -> InstallerResult<FetchedArtifact> {
        let dest = artifact.destination(root);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| InstallerError::io(parent, e))?;
        }

        let progress = self.progress.as_ref();
        let outcome = self
            .retry
            .run(
                &self.cancel,
                |attempt, delay, _| {
                    progress(&InstallProgress::Retrying {
                        target: artifact.id.clone(),
                        attempt,
                        delay,
                    })
                },
                |_| self.download_attempt(artifact, &dest),
            )
            .await;

        match outcome {
            Ok(()) => {
                debug!("Downloaded: {} -> {:?}", artifact.url, dest);
                progress(&InstallProgress::ArtifactFinished {
                    id: artifact.id.clone(),
                    skipped: false,
                });
                Ok(FetchedArtifact {
                    id: artifact.id.clone(),
                    path: dest,
                    skipped: false,
                })
            }
            Err(RetryExhausted {
                error: InstallerError::Cancelled,
                ..
            }) => Err(InstallerError::Cancelled),
            Err(RetryExhausted { attempts, error }) => Err(InstallerError::ArtifactFetchFailed {
                artifact: artifact.id.clone(),
                attempts,
                reason: error.to_string(),
            }),
        }
    }

    async fn download_attempt(&self, artifact: &Artifact, dest: &Path) -> InstallerResult<()> {
        let temp = TempFile::beside(dest);

        let mut body = tokio::select! {
            _ = self.cancel.cancelled() => return Err(InstallerError::Cancelled),
            response = self.transport.get(&artifact.url) => response?,
        };
        let total = artifact.size.or(body.content_length);
        (self.progress)(&InstallProgress::ArtifactStarted {
            id: artifact.id.clone(),
            total,
        });

        // Scoped so the handle is closed before the rename (Windows).
        {
            let mut file = tokio::fs::File::create(temp.path())
                .await
                .map_err(|e| InstallerError::io(temp.path(), e))?;
            let mut downloaded = 0u64;
            loop {
                let next = tokio::select! {
                    _ = self.cancel.cancelled() => return Err(InstallerError::Cancelled),
                    chunk = body.chunks.next() => chunk,
                };
                let Some(chunk) = next else {
                    break;
                };
                let chunk = chunk?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| InstallerError::io(temp.path(), e))?;
                downloaded += chunk.len() as u64;
                (self.progress)(&InstallProgress::ArtifactProgress {
                    id: artifact.id.clone(),
                    downloaded,
                    total,
                });
            }
            file.flush()
                .await
                .map_err(|e| InstallerError::io(temp.path(), e))?;
        }

        let check_path = temp.path().to_path_buf();
        let checksum = artifact.checksum.clone();
        let size = artifact.size;
        tokio::task::spawn_blocking(move || verify(&check_path, &checksum, size))
            .await
            .map_err(|e| InstallerError::io(temp.path(), std::io::Error::other(e)))??;

        self.cancel.check()?;
        tokio::fs::rename(temp.path(), dest)
            .await
            .map_err(|e| InstallerError::write_failed(dest, e))?;
        temp.keep();
        Ok(())
    }
}

async fn already_present(root: &Path, artifact: &Artifact) -> bool {
    let dest = artifact.destination(root);
    let checksum = artifact.checksum.clone();
    let size = artifact.size;
    tokio::task::spawn_blocking(move || is_valid(&dest, &checksum, size))
        .await
        .unwrap_or(false)
}

/// Download staging file, removed on drop unless promoted.
struct TempFile {
    path: PathBuf,
    keep: bool,
}

impl TempFile {
    fn beside(dest: &Path) -> Self {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "artifact".into());
        Self {
            path: dest.with_file_name(format!(".{}.{}.part", name, Uuid::new_v4())),
            keep: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file has been renamed away; nothing left to clean.
    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Fail early when the disk holding `path` cannot take `required` more bytes.
pub fn ensure_free_space(path: &Path, required: u64) -> InstallerResult<()> {
    if required == 0 {
        return Ok(());
    }
    let target = existing_ancestor(path);
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if target.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    match available {
        Some(bytes) if bytes < required => Err(InstallerError::write_failed(
            path,
            format!(
                "not enough disk space: available={} required={}",
                bytes, required
            ),
        )),
        _ => Ok(()),
    }
}

fn existing_ancestor(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute
        .ancestors()
        .find_map(|p| std::fs::canonicalize(p).ok())
        .unwrap_or(absolute)
}
