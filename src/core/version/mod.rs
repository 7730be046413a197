pub mod manifest;
pub mod version_file;

pub use manifest::{VersionEntry, VersionManifest};
pub use version_file::{current_os_name, DownloadArtifact, LibraryEntry, VersionJson};

/// Numeric sort key for dotted game/loader versions (`1.20.1` → `[1, 20, 1]`).
/// Non-numeric parts sort as zero.
pub fn version_sort_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

/// `true` when `version` is at least `major.minor` on the `1.x` line.
pub fn is_at_least(version: &str, minor: u64) -> bool {
    let key = version_sort_key(version);
    match key.as_slice() {
        [1, m, ..] => *m >= minor,
        [major, ..] => *major > 1,
        [] => false,
    }
}
