//! Wire payload and helpers for broadcast file transfer.
//!
//! # Wire Protocol
//!
//! ```text
//! Sender ──[FileChunk + chunk bytes]──► every connected peer   (one per tick)
//!   Payload: FileChunkMeta (CBOR)
//! ```
//!
//! A file is identified by the MD5 of its full contents, computed
//! before the first chunk leaves the sender. Receivers key reassembly
//! on that digest and rename to `filename` only after the final chunk,
//! so concurrent transfers of different files never collide on disk.

use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;

use crate::error::LanternError;

/// Bytes of file content carried per chunk.
pub const CHUNK_SIZE: usize = 200_000;

/// Read granularity for the up-front digest pass.
pub const DIGEST_BLOCK_SIZE: usize = 4096;

// ── File Chunk ────────────────────────────────────────────────────

/// Metadata for one slice of a file in flight.
///
/// The slice's bytes ride in the frame's binary attachment. Every
/// chunk repeats the full metadata, so a receiver can join a transfer
/// it never saw the start of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunkMeta {
    /// Hex MD5 of the complete file.
    pub hash: String,

    /// Total file size in bytes.
    pub total_size: u64,

    /// Name the receiver renames the finished file to.
    pub filename: String,

    /// Byte count of this chunk's attachment.
    pub chunk_size: u64,
}

impl FileChunkMeta {
    pub fn new(hash: String, total_size: u64, filename: String, chunk_size: u64) -> Self {
        Self {
            hash,
            total_size,
            filename,
            chunk_size,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────

/// How many chunks a file of `total_size` bytes splits into.
pub fn chunk_count(total_size: u64) -> u64 {
    total_size.div_ceil(CHUNK_SIZE as u64)
}

/// Hex MD5 of a file's contents, streamed in [`DIGEST_BLOCK_SIZE`]
/// blocks so large files never sit in memory whole.
pub async fn file_md5(path: impl AsRef<Path>) -> Result<String, LanternError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut block = [0u8; DIGEST_BLOCK_SIZE];

    loop {
        let n = file.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
