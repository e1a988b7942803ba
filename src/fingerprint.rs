//! Content-addressed identity: streaming file hashing and deterministic
//! chunk id derivation.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use uuid::Uuid;

const BLOCK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 digest of file bytes.
pub type FileHash = String;
/// Hex-encoded SHA-256 digest of a chunk's text payload.
pub type ChunkHash = String;

/// Streams a file through SHA-256 in fixed 64 KiB blocks so memory use is
/// O(1) regardless of file size.
pub fn hash_file(path: &Path) -> std::io::Result<FileHash> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes an in-memory chunk of text.
pub fn hash_text(text: &str) -> ChunkHash {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `ChunkId = uuid5(NAMESPACE_DNS, "<hex_file_hash>_<index>")`. Two runs over
/// identical file bytes MUST produce identical ids in the same order; this is
/// what makes upserts idempotent.
pub fn chunk_id(file_hash: &FileHash, index: usize) -> Uuid {
    let name = format!("{file_hash}_{index}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

/// The reserved all-zeros id for a collection's metadata point.
pub fn metadata_point_id() -> Uuid {
    Uuid::nil()
}
