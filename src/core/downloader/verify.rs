use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::core::error::{InstallerError, InstallerResult};
use crate::core::plan::{Checksum, HashAlgorithm};

const READ_BUFFER: usize = 64 * 1024;

/// Check a file on disk against its expected size and checksum.
///
/// The size is compared first so a truncated transfer is rejected without
/// hashing. Only reads the file.
pub fn verify(path: &Path, expected: &Checksum, expected_size: Option<u64>) -> InstallerResult<()> {
    if let Some(size) = expected_size {
        let actual = std::fs::metadata(path)
            .map_err(|e| InstallerError::io(path, e))?
            .len();
        if actual != size {
            return Err(InstallerError::CorruptArtifact {
                path: path.to_path_buf(),
                expected: format!("{} bytes", size),
                actual: format!("{} bytes", actual),
            });
        }
    }

    let actual = digest_file(expected.algorithm(), path)?;
    if actual != expected.hex() {
        return Err(InstallerError::CorruptArtifact {
            path: path.to_path_buf(),
            expected: expected.hex().to_string(),
            actual,
        });
    }
    Ok(())
}

/// `true` when `path` exists and passes [`verify`].
pub fn is_valid(path: &Path, expected: &Checksum, expected_size: Option<u64>) -> bool {
    path.is_file() && verify(path, expected, expected_size).is_ok()
}

/// Lowercase hex digest of a file, streamed.
pub fn digest_file(algorithm: HashAlgorithm, path: &Path) -> InstallerResult<String> {
    let file = File::open(path).map_err(|e| InstallerError::io(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    match algorithm {
        HashAlgorithm::Sha1 => hash_reader::<Sha1>(&mut reader, path),
        HashAlgorithm::Sha256 => hash_reader::<Sha256>(&mut reader, path),
    }
}

/// Lowercase hex digest of an in-memory buffer.
pub fn digest_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
    }
}

fn hash_reader<D: Digest>(reader: &mut impl Read, path: &Path) -> InstallerResult<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buf).map_err(|e| InstallerError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
