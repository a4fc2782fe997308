//! Broadcast file transfer: paced sending and keyed reassembly.
//!
//! Sending walks the file on a 200 ms timer, one chunk per tick, and
//! hands every chunk to every connected link. The file's MD5 is
//! computed before the first chunk leaves, so all chunks carry the
//! final digest.
//!
//! Receiving appends chunks to a scratch file named after the digest
//! inside the download directory. Once the byte count reaches the
//! advertised total the scratch file is renamed to the advertised
//! filename, retrying for as long as the target stays unwritable.
//! A transfer that dies mid-flight leaves its scratch file behind.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::LanternError;
use crate::frame::Frame;
use crate::message::Message;
use crate::protocol::file::{CHUNK_SIZE, FileChunkMeta, file_md5};

/// Pace of the sending loop, one chunk per tick.
pub const CHUNK_INTERVAL: Duration = Duration::from_millis(200);

/// Pause between attempts to rename a finished file.
pub const RENAME_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Progress notifications for both directions of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    ChunkSent {
        filename: String,
        sent: u64,
        total_size: u64,
    },
    SendFinished {
        filename: String,
    },
    ReceiveStarted {
        filename: String,
        total_size: u64,
    },
    ChunkReceived {
        filename: String,
        received: u64,
        total_size: u64,
    },
    ReceiveFinished {
        filename: String,
        path: PathBuf,
    },
}

// ── Sending ───────────────────────────────────────────────────────

/// Stream a file to every link, one chunk per timer tick.
///
/// Links that close mid-transfer are skipped, not retried; the
/// remaining links keep receiving.
pub async fn send_file(
    path: PathBuf,
    links: Vec<mpsc::Sender<Frame>>,
    events: mpsc::Sender<TransferEvent>,
) -> Result<(), LanternError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| LanternError::Other(format!("no file name in {}", path.display())))?;

    let hash = file_md5(&path).await?;
    let total_size = tokio::fs::metadata(&path).await?.len();
    let mut file = tokio::fs::File::open(&path).await?;

    let mut ticker = tokio::time::interval(CHUNK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    info!(%filename, total_size, %hash, "file transfer started");

    loop {
        ticker.tick().await;

        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        let meta = FileChunkMeta::new(hash.clone(), total_size, filename.clone(), n as u64);
        let frame = Message::FileChunk(meta)
            .into_frame_with_attachment(Bytes::copy_from_slice(&buf[..n]))?;

        let mut delivered = 0usize;
        for link in &links {
            if link.send(frame.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        sent += n as u64;
        debug!(%filename, sent, total_size, delivered, "chunk sent");
        let _ = events
            .send(TransferEvent::ChunkSent {
                filename: filename.clone(),
                sent,
                total_size,
            })
            .await;
    }

    info!(%filename, sent, "file transfer finished");
    let _ = events.send(TransferEvent::SendFinished { filename }).await;
    Ok(())
}

// ── Receiving ─────────────────────────────────────────────────────

struct IncomingFile {
    file: tokio::fs::File,
    filename: String,
    received: u64,
}

/// Reassembles inbound files, keyed by content digest.
///
/// Chunks for the same digest may arrive interleaved with other
/// transfers; each digest gets its own scratch file and byte count.
pub struct TransferTable {
    download_dir: PathBuf,
    incoming: HashMap<String, IncomingFile>,
    events: mpsc::Sender<TransferEvent>,
}

impl TransferTable {
    pub fn new(download_dir: impl Into<PathBuf>, events: mpsc::Sender<TransferEvent>) -> Self {
        Self {
            download_dir: download_dir.into(),
            incoming: HashMap::new(),
            events,
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Number of transfers still being assembled.
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }

    /// Append one chunk to its transfer, starting the transfer on the
    /// first chunk seen for a digest. Progress counts the bytes that
    /// actually arrived, not the advertised chunk size.
    pub async fn accept_chunk(
        &mut self,
        meta: FileChunkMeta,
        attachment: Bytes,
    ) -> Result<(), LanternError> {
        if meta.chunk_size != attachment.len() as u64 {
            debug!(
                declared = meta.chunk_size,
                actual = attachment.len(),
                "chunk size mismatch, trusting the attachment"
            );
        }

        let entry = match self.incoming.entry(meta.hash.clone()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                tokio::fs::create_dir_all(&self.download_dir).await?;
                let scratch = self.download_dir.join(&meta.hash);
                let file = tokio::fs::File::create(&scratch).await?;
                info!(
                    filename = %meta.filename,
                    total_size = meta.total_size,
                    "receiving file"
                );
                let _ = self
                    .events
                    .send(TransferEvent::ReceiveStarted {
                        filename: meta.filename.clone(),
                        total_size: meta.total_size,
                    })
                    .await;
                vacant.insert(IncomingFile {
                    file,
                    filename: meta.filename.clone(),
                    received: 0,
                })
            }
        };

        entry.file.write_all(&attachment).await?;
        entry.received += attachment.len() as u64;

        debug!(
            filename = %entry.filename,
            received = entry.received,
            total_size = meta.total_size,
            "chunk received"
        );
        let _ = self
            .events
            .send(TransferEvent::ChunkReceived {
                filename: entry.filename.clone(),
                received: entry.received,
                total_size: meta.total_size,
            })
            .await;

        if entry.received >= meta.total_size {
            entry.file.flush().await?;
            self.incoming.remove(&meta.hash);

            let scratch = self.download_dir.join(&meta.hash);
            let target = self.download_dir.join(&meta.filename);
            let filename = meta.filename.clone();
            let events = self.events.clone();
            info!(%filename, "file complete, renaming");

            // The scratch handle may still be closing; the retry
            // loop absorbs that.
            tokio::spawn(async move {
                rename_with_retry(&scratch, &target).await;
                let _ = events
                    .send(TransferEvent::ReceiveFinished {
                        filename,
                        path: target,
                    })
                    .await;
            });
        }

        Ok(())
    }
}

/// Rename, pausing and retrying until the target becomes writable.
async fn rename_with_retry(from: &Path, to: &Path) {
    loop {
        match tokio::fs::rename(from, to).await {
            Ok(()) => return,
            Err(e) => {
                warn!("rename to {} failed, retrying: {e}", to.display());
                tokio::time::sleep(RENAME_RETRY_PAUSE).await;
            }
        }
    }
}
