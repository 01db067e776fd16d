//! Relational reads and writes for memory entries.

use chrono::{DateTime, SecondsFormat, Utc};
use elara_types::{EmotionSnapshot, Role};
use rusqlite::{Connection, Row, params};
use zerocopy::IntoBytes;

use crate::error::{MemoryError, Result};
use crate::types::{Category, MemoryEntry};

use super::MemoryStore;

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Blob Codec
// ─────────────────────────────────────────────────────────────────────────────

/// Serialize an embedding to its native-endian byte representation.
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> &[u8] {
    embedding.as_bytes()
}

/// Deserialize an embedding blob written by [`embedding_to_blob`].
///
/// Reads byte by byte rather than reinterpreting the slice; blobs coming out
/// of SQLite carry no alignment guarantee.
pub(crate) fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % size_of::<f32>() != 0 {
        return Err(MemoryError::InvalidData(format!(
            "embedding blob length {} is not a multiple of {}",
            blob.len(),
            size_of::<f32>()
        )));
    }
    Ok(blob
        .chunks_exact(size_of::<f32>())
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Render a timestamp in the fixed-width RFC 3339 form stored in SQLite.
///
/// Microsecond precision with a `Z` suffix keeps lexicographic order equal to
/// chronological order, so timestamp columns can be compared as text.
pub(crate) fn timestamp_to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp_from_text(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| MemoryError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Map a full `memories` row into a [`MemoryEntry`].
///
/// Column order: id, timestamp, role, text, category, importance,
/// emotion_json, embedding. Unparseable stored values surface as
/// [`MemoryError::InvalidData`] rather than being coerced to defaults.
fn row_to_entry(row: &Row<'_>) -> Result<MemoryEntry> {
    let id: i64 = row.get(0)?;
    let timestamp_raw: String = row.get(1)?;
    let role_raw: String = row.get(2)?;
    let text: String = row.get(3)?;
    let category_raw: String = row.get(4)?;
    let importance: f64 = row.get(5)?;
    let emotion_json: String = row.get(6)?;
    let embedding_blob: Vec<u8> = row.get(7)?;

    let role: Role = role_raw
        .parse()
        .map_err(|e| MemoryError::InvalidData(format!("entry {id}: {e}")))?;
    let category: Category = category_raw
        .parse()
        .map_err(|e| MemoryError::InvalidData(format!("entry {id}: {e}")))?;
    let emotion: EmotionSnapshot = serde_json::from_str(&emotion_json)?;

    Ok(MemoryEntry {
        id,
        timestamp: timestamp_from_text(&timestamp_raw)?,
        role,
        text,
        embedding: blob_to_embedding(&embedding_blob)?,
        category,
        importance: importance as f32,
        emotion,
    })
}

const ENTRY_COLUMNS: &str =
    "id, timestamp, role, text, category, importance, emotion_json, embedding";

// ─────────────────────────────────────────────────────────────────────────────
// Store Operations
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Insert a fully scored entry and return its assigned id.
    ///
    /// Runs inside the caller's transaction; the id comes from SQLite's
    /// monotonic rowid allocator.
    pub(crate) fn insert_entry(
        conn: &Connection,
        timestamp: DateTime<Utc>,
        role: Role,
        text: &str,
        category: Category,
        importance: f32,
        emotion: &EmotionSnapshot,
        embedding: &[f32],
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO memories (timestamp, role, text, category, importance, emotion_json, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                timestamp_to_text(timestamp),
                role.as_str(),
                text,
                category.as_str(),
                importance as f64,
                serde_json::to_string(emotion)?,
                embedding_to_blob(embedding),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Fetch entries by id, preserving the order of `ids`.
    ///
    /// Ids with no matching row are silently omitted, so the result may be
    /// shorter than the input.
    pub(crate) fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<MemoryEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM memories WHERE id IN ({placeholders})");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(ids.iter()))?;

        let mut by_id = std::collections::HashMap::with_capacity(ids.len());
        while let Some(row) = rows.next()? {
            let entry = row_to_entry(row)?;
            by_id.insert(entry.id, entry);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM memories ORDER BY id DESC LIMIT ?1"
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    /// All entries recorded at or after `since`, oldest first.
    pub fn entries_since(&self, since: DateTime<Utc>) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM memories WHERE timestamp >= ?1 ORDER BY id ASC"
        ))?;
        let mut rows = stmt.query(params![timestamp_to_text(since)])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }
}
