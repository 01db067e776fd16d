//! Index synchronizer: snapshot persistence, validation, and rebuild.
//!
//! The vector index is a derived cache of the relational store. This module
//! owns the persisted snapshot (written via atomic replace after adds),
//! validates it at load time, and transparently falls back to a full rebuild
//! from the relational store whenever the snapshot is missing, unreadable,
//! or inconsistent. Corruption never propagates to the caller; only a failed
//! rebuild does.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};
use crate::index::{DistanceMetric, IndexBackend, IndexKind, new_backend};

use super::entry_ops::blob_to_embedding;

/// Snapshot document format version.
const SNAPSHOT_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Flush Policy
// ─────────────────────────────────────────────────────────────────────────────

/// When to persist the index snapshot to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Write the snapshot after every successful add.
    ///
    /// The default: crash consistency matching the relational store, at the
    /// cost of O(index size) extra I/O per entry.
    #[default]
    EveryAdd,
    /// Write the snapshot once every `every` adds.
    ///
    /// Leaves a bounded window of postings that exist only in the relational
    /// store after a crash; the load-time consistency check detects the gap
    /// and rebuilds.
    Batched {
        /// Flush interval in adds, >= 1.
        every: usize,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot Document
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPosting {
    id: i64,
    vector: Vec<f32>,
}

/// On-disk snapshot of the index: a header plus all postings in id order.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    kind: IndexKind,
    metric: DistanceMetric,
    dims: usize,
    postings: Vec<SnapshotPosting>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Index State
// ─────────────────────────────────────────────────────────────────────────────

/// The live index plus its persistence state.
///
/// All mutation goes through the store's write gate, so this struct assumes
/// single-writer access.
pub(crate) struct IndexState {
    pub(crate) backend: Box<dyn IndexBackend>,
    snapshot_path: Option<PathBuf>,
    flush: FlushPolicy,
    /// Adds since the last flush.
    pending: usize,
}

impl IndexState {
    /// Open the index: load a valid snapshot, or rebuild from the store.
    ///
    /// This is the only construction path. It always produces a usable
    /// index; snapshot problems are logged and recovered here.
    pub(crate) fn open(
        conn: &Connection,
        snapshot_path: Option<PathBuf>,
        kind: IndexKind,
        metric: DistanceMetric,
        dims: usize,
        flush: FlushPolicy,
    ) -> Result<Self> {
        if let Some(ref path) = snapshot_path
            && path.exists()
        {
            match Self::try_load(path, conn, kind, metric, dims) {
                Ok(backend) => {
                    info!(postings = backend.len(), "loaded index snapshot");
                    return Ok(Self {
                        backend,
                        snapshot_path,
                        flush,
                        pending: 0,
                    });
                }
                Err(e) => {
                    warn!("index snapshot rejected ({e}); rebuilding from relational store");
                }
            }
        }

        let backend = Self::rebuild_from_store(conn, kind, metric, dims)?;
        info!(postings = backend.len(), "rebuilt index from relational store");

        let mut state = Self {
            backend,
            snapshot_path,
            flush,
            pending: 0,
        };
        state.flush_now()?;
        Ok(state)
    }

    /// Load and validate a snapshot file.
    ///
    /// Rejects (as [`MemoryError::IndexCorrupt`]) any unreadable file, format
    /// mismatch, configuration mismatch, malformed posting, or id set that
    /// differs from the relational store's.
    fn try_load(
        path: &Path,
        conn: &Connection,
        kind: IndexKind,
        metric: DistanceMetric,
        dims: usize,
    ) -> Result<Box<dyn IndexBackend>> {
        let raw = fs::read_to_string(path)
            .map_err(|e| MemoryError::IndexCorrupt(format!("unreadable snapshot: {e}")))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| MemoryError::IndexCorrupt(format!("malformed snapshot: {e}")))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(MemoryError::IndexCorrupt(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        if snapshot.kind != kind || snapshot.metric != metric || snapshot.dims != dims {
            return Err(MemoryError::IndexCorrupt(format!(
                "snapshot configuration mismatch: {:?}/{:?}/{} vs {:?}/{:?}/{}",
                snapshot.kind, snapshot.metric, snapshot.dims, kind, metric, dims
            )));
        }
        if let Some(bad) = snapshot.postings.iter().find(|p| p.vector.len() != dims) {
            return Err(MemoryError::IndexCorrupt(format!(
                "posting {} has dimension {}, expected {}",
                bad.id,
                bad.vector.len(),
                dims
            )));
        }

        // Referential integrity: the snapshot must hold exactly the ids the
        // relational store holds. Extra ids mean a corrupt snapshot; missing
        // ids mean a crash between commit and flush. Both force a rebuild.
        let store_ids = store_ids(conn)?;
        let snapshot_ids: Vec<i64> = snapshot.postings.iter().map(|p| p.id).collect();
        if snapshot_ids != store_ids {
            return Err(MemoryError::IndexCorrupt(format!(
                "snapshot id set diverged from store ({} vs {} postings)",
                snapshot_ids.len(),
                store_ids.len()
            )));
        }

        let mut backend = new_backend(kind, metric, dims);
        for posting in snapshot.postings {
            backend.add(posting.id, posting.vector)?;
        }
        Ok(backend)
    }

    /// Rebuild the index by replaying the relational store in id order.
    fn rebuild_from_store(
        conn: &Connection,
        kind: IndexKind,
        metric: DistanceMetric,
        dims: usize,
    ) -> Result<Box<dyn IndexBackend>> {
        let mut backend = new_backend(kind, metric, dims);

        let mut stmt = conn.prepare("SELECT id, embedding FROM memories ORDER BY id ASC")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            backend.add(id, blob_to_embedding(&blob)?)?;
        }

        Ok(backend)
    }

    /// Insert a posting and persist per the flush policy.
    pub(crate) fn add(&mut self, id: i64, vector: Vec<f32>) -> Result<()> {
        self.backend.add(id, vector)?;
        self.pending += 1;

        let due = match self.flush {
            FlushPolicy::EveryAdd => true,
            FlushPolicy::Batched { every } => self.pending >= every.max(1),
        };
        if due {
            self.flush_now()?;
        }
        Ok(())
    }

    /// Write the snapshot via atomic replace (temp file + rename).
    pub(crate) fn flush_now(&mut self) -> Result<()> {
        let Some(ref path) = self.snapshot_path else {
            self.pending = 0;
            return Ok(());
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            kind: self.backend.kind(),
            metric: self.backend.metric(),
            dims: self.backend.dims(),
            postings: self
                .backend
                .postings()
                .into_iter()
                .map(|(id, vector)| SnapshotPosting { id, vector })
                .collect(),
        };

        let tmp_path = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(serde_json::to_string(&snapshot)?.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        debug!(postings = snapshot.postings.len(), "flushed index snapshot");
        self.pending = 0;
        Ok(())
    }

    /// Adds not yet reflected in the persisted snapshot.
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.pending
    }
}

/// All entry ids in the relational store, ascending.
fn store_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM memories ORDER BY id ASC")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}
