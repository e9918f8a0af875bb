//! Piece storage
//!
//! The scheduler hands verified pieces to a [`PieceStore`]; the store
//! decides the on-disk layout. [`FileStore`] implements the single-file
//! layout with positional writes, [`MemoryStore`] keeps pieces in memory
//! for tests and tooling.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::bitfield::Bitfield;
use crate::error::{ClientError, Result};
use crate::metainfo::{Metainfo, Sha1Hash};

/// Durable storage for verified pieces.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Durably write one verified piece.
    async fn flush(&self, index: u32, data: &[u8]) -> Result<()>;

    /// Report which pieces are already present and valid, for resuming an
    /// earlier download. Stores without resume support return all-zero.
    async fn load_bitfield(&self) -> Result<Bitfield>;
}

/// Stores the torrent content as a single file, each piece written at
/// `index * piece_length`.
pub struct FileStore {
    path: PathBuf,
    metainfo: Arc<Metainfo>,
}

impl FileStore {
    /// Create a store writing `metainfo`'s content into `save_dir`.
    pub fn new(save_dir: impl AsRef<Path>, metainfo: Arc<Metainfo>) -> Self {
        Self {
            path: save_dir.as_ref().join(&metainfo.name),
            metainfo,
        }
    }

    /// Path of the target file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hash one piece read from disk against its expected digest.
    async fn piece_on_disk_matches(
        file: &mut File,
        offset: u64,
        size: u64,
        expected: &Sha1Hash,
    ) -> bool {
        if file.seek(SeekFrom::Start(offset)).await.is_err() {
            return false;
        }
        let mut buf = vec![0u8; size as usize];
        if file.read_exact(&mut buf).await.is_err() {
            return false;
        }
        let digest: Sha1Hash = Sha1::digest(&buf).into();
        digest == *expected
    }
}

#[async_trait]
impl PieceStore for FileStore {
    async fn flush(&self, index: u32, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::storage(format!("create dir failed: {}", e)))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await
            .map_err(|e| ClientError::storage(format!("open failed: {}", e)))?;

        let offset = index as u64 * self.metainfo.piece_length;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| ClientError::storage(format!("seek failed: {}", e)))?;
        file.write_all(data)
            .await
            .map_err(|e| ClientError::storage(format!("write failed: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ClientError::storage(format!("flush failed: {}", e)))?;

        tracing::debug!(piece = index, bytes = data.len(), "piece flushed to disk");
        Ok(())
    }

    async fn load_bitfield(&self) -> Result<Bitfield> {
        let num_pieces = self.metainfo.num_pieces();
        let mut bitfield = Bitfield::new(num_pieces);

        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            // Nothing on disk yet; fresh download.
            Err(_) => return Ok(bitfield),
        };

        for index in 0..num_pieces as u32 {
            let size = self
                .metainfo
                .piece_size(index)
                .ok_or_else(|| ClientError::storage("piece index out of range"))?;
            let offset = index as u64 * self.metainfo.piece_length;
            let expected = self
                .metainfo
                .piece_hash(index)
                .ok_or_else(|| ClientError::storage("piece hash out of range"))?;

            if Self::piece_on_disk_matches(&mut file, offset, size, expected).await {
                bitfield.set(index);
            }
        }

        let have = bitfield.count_ones();
        if have > 0 {
            tracing::info!(pieces = have, total = num_pieces, "resuming from existing data");
        }

        Ok(bitfield)
    }
}

/// In-memory piece store.
#[derive(Default)]
pub struct MemoryStore {
    pieces: Mutex<HashMap<u32, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored piece.
    pub fn piece(&self, index: u32) -> Option<Vec<u8>> {
        self.pieces.lock().get(&index).cloned()
    }

    /// Number of stored pieces.
    pub fn len(&self) -> usize {
        self.pieces.lock().len()
    }

    /// True when nothing has been flushed yet.
    pub fn is_empty(&self) -> bool {
        self.pieces.lock().is_empty()
    }

    /// Concatenate all pieces in index order.
    pub fn contents(&self) -> Vec<u8> {
        let pieces = self.pieces.lock();
        let mut indices: Vec<u32> = pieces.keys().copied().collect();
        indices.sort_unstable();

        let mut data = Vec::new();
        for index in indices {
            data.extend_from_slice(&pieces[&index]);
        }
        data
    }
}

#[async_trait]
impl PieceStore for MemoryStore {
    async fn flush(&self, index: u32, data: &[u8]) -> Result<()> {
        self.pieces.lock().insert(index, data.to_vec());
        Ok(())
    }

    async fn load_bitfield(&self) -> Result<Bitfield> {
        // No piece count knowledge; memory stores always start fresh.
        Ok(Bitfield::new(0))
    }
}
