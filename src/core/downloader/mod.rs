mod fetcher;
mod verify;

pub use fetcher::{ensure_free_space, ArtifactFetcher, FetchedArtifact};
pub use verify::{digest_bytes, digest_file, is_valid, verify};
