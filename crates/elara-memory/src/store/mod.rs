//! Durable memory store: append-only relational log plus a derived vector
//! index.
//!
//! The SQLite database is the source of truth; the index is a cache that can
//! always be reconstructed from it. Writes go through a single gate so the
//! commit order matches the id order, and every save folds its emotion
//! snapshot into the per-day trend rollup inside the same transaction.

mod entry_ops;
mod recall;
mod sync;
mod trend_ops;

pub use sync::FlushPolicy;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use elara_types::{EmotionSnapshot, Role};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use crate::embedding::{EmbeddingProvider, encode_checked};
use crate::error::{MemoryError, Result};
use crate::index::{DistanceMetric, IndexKind};
use crate::scoring;
use crate::types::{Category, StoreStats};
use crate::validation::{validate_entry_text, validate_intensity};

use entry_ops::timestamp_to_text;
use sync::IndexState;

/// Current on-disk schema version, stored in SQLite's `user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Database file name inside the store directory.
const DB_FILE: &str = "memories.db";

/// Index snapshot file name inside the store directory.
const INDEX_FILE: &str = "index.json";

/// Window for [`StoreStats::recent_activity_count`].
const RECENT_ACTIVITY_DAYS: i64 = 7;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Store construction options.
///
/// Index kind and metric are fixed for the lifetime of the store directory;
/// reopening with different values invalidates the snapshot and triggers a
/// rebuild under the new configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreConfig {
    /// Which index backend to use.
    pub index: IndexKind,
    /// Distance metric for nearest-neighbor ranking.
    pub metric: DistanceMetric,
    /// When to persist the index snapshot.
    pub flush: FlushPolicy,
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe semantic memory store.
///
/// Lock order is write gate, then connection, then index; the connection
/// lock is released before the index lock is taken. Readers take at most one
/// lock at a time. Embedding inference always happens before any lock.
pub struct MemoryStore {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) index: Mutex<IndexState>,
    /// Serializes the save path so index adds happen in id order.
    write_gate: Mutex<()>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl MemoryStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// Creates the directory, the `memories.db` database, and the
    /// `index.json` snapshot as needed. A stale or corrupt snapshot is
    /// rebuilt from the database transparently.
    pub fn open(
        dir: impl AsRef<Path>,
        provider: Arc<dyn EmbeddingProvider>,
        config: StoreConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let conn = Connection::open(dir.join(DB_FILE))?;
        Self::init_connection(&conn)?;

        let dims = provider.dimensions();
        let index = IndexState::open(
            &conn,
            Some(dir.join(INDEX_FILE)),
            config.index,
            config.metric,
            dims,
            config.flush,
        )?;

        info!(path = %dir.display(), dims, "memory store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            index: Mutex::new(index),
            write_gate: Mutex::new(()),
            provider,
        })
    }

    /// Open an ephemeral in-memory store. No snapshot is persisted.
    pub fn open_in_memory(
        provider: Arc<dyn EmbeddingProvider>,
        config: StoreConfig,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;

        let dims = provider.dimensions();
        let index = IndexState::open(&conn, None, config.index, config.metric, dims, config.flush)?;

        Ok(Self {
            conn: Mutex::new(conn),
            index: Mutex::new(index),
            write_gate: Mutex::new(()),
            provider,
        })
    }

    fn init_connection(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(MemoryError::InvalidData(format!(
                "database schema version {version} is newer than supported {SCHEMA_VERSION}"
            )));
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp    TEXT NOT NULL,
                role         TEXT NOT NULL,
                text         TEXT NOT NULL,
                category     TEXT NOT NULL,
                importance   REAL NOT NULL,
                emotion_json TEXT NOT NULL,
                embedding    BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_timestamp ON memories(timestamp);
            CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category);

            CREATE TABLE IF NOT EXISTS daily_trends (
                date                   TEXT PRIMARY KEY,
                sentiment              TEXT NOT NULL,
                avg_intensity          REAL NOT NULL,
                dominant_emotions_json TEXT NOT NULL,
                count                  INTEGER NOT NULL
            );",
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Append
    // ─────────────────────────────────────────────────────────────────────

    /// Commit a conversation turn and return its assigned id.
    ///
    /// Scores the text, encodes it, then atomically appends the entry and
    /// folds the emotion into the day's trend. The index add and snapshot
    /// flush follow the commit; a crash between them is healed by the
    /// load-time consistency check.
    ///
    /// On any error, nothing is persisted: a failed save never advances ids
    /// or trends.
    pub fn save(&self, role: Role, text: &str, emotion: &EmotionSnapshot) -> Result<i64> {
        validate_entry_text(text)?;
        validate_intensity(emotion.intensity)?;

        // Inference before any lock.
        let embedding = encode_checked(self.provider.as_ref(), text)?;
        let (category, importance) = scoring::score(text, None, emotion);

        let _gate = self.write_gate.lock().unwrap();

        let timestamp = Utc::now();
        let id = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let id = Self::insert_entry(
                &tx, timestamp, role, text, category, importance, emotion, &embedding,
            )?;
            trend_ops::apply_to_trend(&tx, timestamp.date_naive(), emotion)?;
            tx.commit()?;
            id
        };

        {
            let mut index = self.index.lock().unwrap();
            index.add(id, embedding)?;
        }

        debug!(id, category = %category, importance, "memory entry saved");
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stats
    // ─────────────────────────────────────────────────────────────────────

    /// Aggregate statistics over the whole store.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();

        let total_count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| {
            row.get(0)
        })?;

        let mut category_histogram = Vec::new();
        {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) AS n FROM memories
                 GROUP BY category ORDER BY n DESC, category ASC",
            )?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let raw: String = row.get(0)?;
                let category: Category = raw
                    .parse()
                    .map_err(|e| MemoryError::InvalidData(format!("stats: {e}")))?;
                let count: i64 = row.get(1)?;
                category_histogram.push((category, count as usize));
            }
        }

        let average_importance: f64 = conn.query_row(
            "SELECT COALESCE(AVG(importance), 0.0) FROM memories",
            [],
            |row| row.get(0),
        )?;

        let cutoff = timestamp_to_text(Utc::now() - Duration::days(RECENT_ACTIVITY_DAYS));
        let recent_activity_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE timestamp >= ?1",
            params![cutoff],
            |row| row.get(0),
        )?;

        Ok(StoreStats {
            total_count: total_count as usize,
            category_histogram,
            average_importance: (average_importance * 100.0).round() / 100.0,
            recent_activity_count: recent_activity_count as usize,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────

    /// Flush any pending index state and close the store.
    ///
    /// Dropping without `close` loses at most the un-flushed tail of a
    /// batched snapshot, which the next open rebuilds.
    pub fn close(self) -> Result<()> {
        {
            let mut index = self.index.lock().unwrap();
            index.flush_now()?;
        }
        info!("memory store closed");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use elara_types::Sentiment;
    use std::fs;

    fn test_store() -> MemoryStore {
        MemoryStore::open_in_memory(Arc::new(HashingEmbedder::new(32)), StoreConfig::default())
            .unwrap()
    }

    fn neutral() -> EmotionSnapshot {
        EmotionSnapshot::neutral()
    }

    #[test]
    fn test_save_assigns_strictly_increasing_ids() {
        let store = test_store();
        let a = store.save(Role::User, "first message", &neutral()).unwrap();
        let b = store.save(Role::Agent, "second message", &neutral()).unwrap();
        let c = store.save(Role::User, "third message", &neutral()).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_save_rejects_empty_text() {
        let store = test_store();
        assert!(store.save(Role::User, "", &neutral()).is_err());
        assert!(store.save(Role::User, "   \n\t", &neutral()).is_err());
        assert_eq!(store.stats().unwrap().total_count, 0);
    }

    #[test]
    fn test_save_rejects_out_of_range_intensity() {
        let store = test_store();
        let bad = EmotionSnapshot::new(Sentiment::Neutral, 11);
        assert!(store.save(Role::User, "hello", &bad).is_err());
    }

    #[test]
    fn test_failed_encode_persists_nothing() {
        struct FailingProvider;
        impl EmbeddingProvider for FailingProvider {
            fn dimensions(&self) -> usize {
                8
            }
            fn encode(&self, _text: &str) -> Result<Vec<f32>> {
                Err(MemoryError::Encoding("model unavailable".into()))
            }
        }

        let store =
            MemoryStore::open_in_memory(Arc::new(FailingProvider), StoreConfig::default())
                .unwrap();
        assert!(store.save(Role::User, "hello", &neutral()).is_err());

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_count, 0);
        assert!(store.trends(1).unwrap().is_empty());
    }

    #[test]
    fn test_saved_entry_round_trips() {
        let store = test_store();
        let emotion = EmotionSnapshot::new(Sentiment::Positive, 8).with_emotion("joy");
        let id = store
            .save(Role::User, "I'm really excited about my new job!", &emotion)
            .unwrap();

        let entries = store.recent(1).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, id);
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.text, "I'm really excited about my new job!");
        assert_eq!(entry.category, Category::Work);
        assert!((entry.importance - 9.5).abs() < f32::EPSILON);
        assert_eq!(entry.emotion, emotion);
        assert_eq!(entry.embedding.len(), 32);
    }

    #[test]
    fn test_recent_returns_newest_first() {
        let store = test_store();
        store.save(Role::User, "alpha", &neutral()).unwrap();
        store.save(Role::Agent, "beta", &neutral()).unwrap();
        store.save(Role::User, "gamma", &neutral()).unwrap();

        let entries = store.recent(2).unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["gamma", "beta"]);
    }

    #[test]
    fn test_entries_since_filters_and_orders() {
        let store = test_store();
        store.save(Role::User, "old message", &neutral()).unwrap();

        let cutoff = Utc::now() - Duration::days(1);
        let entries = store.entries_since(cutoff).unwrap();
        assert_eq!(entries.len(), 1);

        let future = Utc::now() + Duration::days(1);
        assert!(store.entries_since(future).unwrap().is_empty());
    }

    #[test]
    fn test_relevant_context_finds_similar_entry() {
        let store = test_store();
        store
            .save(Role::User, "my new job at the office is great", &neutral())
            .unwrap();
        store
            .save(Role::User, "the doctor said I should sleep more", &neutral())
            .unwrap();
        store
            .save(Role::User, "we watched a movie about space travel", &neutral())
            .unwrap();

        let hits = store
            .relevant_context("how is the new job at the office", 1, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "my new job at the office is great");
    }

    #[test]
    fn test_relevant_context_empty_store() {
        let store = test_store();
        assert!(store.relevant_context("anything", 5, None).unwrap().is_empty());
    }

    #[test]
    fn test_relevant_context_zero_k() {
        let store = test_store();
        store.save(Role::User, "something", &neutral()).unwrap();
        assert!(store.relevant_context("something", 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_relevant_context_category_filter() {
        let store = test_store();
        store
            .save(Role::User, "my job interview went well", &neutral())
            .unwrap();
        store
            .save(Role::User, "my doctor visit went well", &neutral())
            .unwrap();

        let hits = store
            .relevant_context("how did it go", 5, Some(Category::Health))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].category, Category::Health);
    }

    #[test]
    fn test_search_distances_ascend() {
        let store = test_store();
        store.save(Role::User, "cats and dogs", &neutral()).unwrap();
        store.save(Role::User, "cats and birds", &neutral()).unwrap();
        store.save(Role::User, "quantum field theory", &neutral()).unwrap();

        let matches = store.search("cats and dogs", None, 3).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].entry.text, "cats and dogs");
        assert!(matches[0].distance < 1e-6);
        for pair in matches.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_trend_running_mean() {
        let store = test_store();
        for intensity in [4u8, 6, 8] {
            let emotion = EmotionSnapshot::new(Sentiment::Positive, intensity);
            store.save(Role::User, "checking in", &emotion).unwrap();
        }

        let trends = store.trends(1).unwrap();
        assert_eq!(trends.len(), 1);
        let today = &trends[0];
        assert_eq!(today.count, 3);
        assert!((today.avg_intensity - 6.0).abs() < 1e-9);
        assert_eq!(today.date, Utc::now().date_naive());
    }

    #[test]
    fn test_trend_sentiment_last_write_wins() {
        let store = test_store();
        store
            .save(
                Role::User,
                "great morning",
                &EmotionSnapshot::new(Sentiment::Positive, 7).with_emotion("joy"),
            )
            .unwrap();
        store
            .save(
                Role::User,
                "rough evening",
                &EmotionSnapshot::new(Sentiment::Negative, 4).with_emotion("sadness"),
            )
            .unwrap();

        let trends = store.trends(1).unwrap();
        assert_eq!(trends[0].sentiment, Sentiment::Negative);
        assert_eq!(trends[0].dominant_emotions, vec!["sadness"]);
        assert_eq!(trends[0].count, 2);
    }

    #[test]
    fn test_trends_empty_store() {
        let store = test_store();
        assert!(store.trends(30).unwrap().is_empty());
    }

    #[test]
    fn test_stats_histogram_and_rounding() {
        let store = test_store();
        store.save(Role::User, "my job is busy", &neutral()).unwrap();
        store.save(Role::User, "work was long today", &neutral()).unwrap();
        store.save(Role::User, "saw the doctor", &neutral()).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.recent_activity_count, 3);
        assert_eq!(stats.category_histogram[0].0, Category::Work);
        assert_eq!(stats.category_histogram[0].1, 2);

        // Two decimal places.
        let scaled = stats.average_importance * 100.0;
        assert!((scaled - scaled.round()).abs() < 1e-9);
    }

    #[test]
    fn test_stats_empty_store() {
        let store = test_store();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_count, 0);
        assert!(stats.category_histogram.is_empty());
        assert_eq!(stats.average_importance, 0.0);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence and recovery
    // ─────────────────────────────────────────────────────────────────────

    fn open_at(dir: &Path, config: StoreConfig) -> MemoryStore {
        MemoryStore::open(dir, Arc::new(HashingEmbedder::new(32)), config).unwrap()
    }

    #[test]
    fn test_reopen_loads_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default();

        let store = open_at(dir.path(), config);
        store.save(Role::User, "my favorite hiking trail", &neutral()).unwrap();
        store.save(Role::User, "a recipe for lentil soup", &neutral()).unwrap();
        store.close().unwrap();

        let reopened = open_at(dir.path(), config);
        let hits = reopened
            .relevant_context("favorite hiking trail", 1, None)
            .unwrap();
        assert_eq!(hits[0].text, "my favorite hiking trail");
    }

    #[test]
    fn test_corrupt_snapshot_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default();

        let store = open_at(dir.path(), config);
        store.save(Role::User, "my favorite hiking trail", &neutral()).unwrap();
        store.save(Role::User, "a recipe for lentil soup", &neutral()).unwrap();
        store.close().unwrap();

        fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();

        let reopened = open_at(dir.path(), config);
        let hits = reopened
            .relevant_context("lentil soup recipe", 1, None)
            .unwrap();
        assert_eq!(hits[0].text, "a recipe for lentil soup");
    }

    #[test]
    fn test_missing_snapshot_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::default();

        let store = open_at(dir.path(), config);
        store.save(Role::User, "remember the garden plan", &neutral()).unwrap();
        store.close().unwrap();

        fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();

        let reopened = open_at(dir.path(), config);
        let hits = reopened
            .relevant_context("the garden plan", 1, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
        // Rebuild rewrote the snapshot.
        assert!(dir.path().join(INDEX_FILE).exists());
    }

    #[test]
    fn test_stale_snapshot_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            flush: FlushPolicy::Batched { every: 100 },
            ..StoreConfig::default()
        };

        // Drop without close: the entry commits but the snapshot never
        // reflects it, mimicking a crash between commit and flush.
        {
            let store = open_at(dir.path(), config);
            store.save(Role::User, "first entry", &neutral()).unwrap();
            store.save(Role::User, "unflushed entry", &neutral()).unwrap();
        }

        let reopened = open_at(dir.path(), config);
        let hits = reopened.relevant_context("unflushed entry", 1, None).unwrap();
        assert_eq!(hits[0].text, "unflushed entry");
    }

    #[test]
    fn test_config_change_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();

        let store = open_at(dir.path(), StoreConfig::default());
        store.save(Role::User, "a note about sourdough", &neutral()).unwrap();
        store.close().unwrap();

        // Same data, different metric: the snapshot header mismatch forces a
        // rebuild under the new configuration.
        let config = StoreConfig {
            metric: DistanceMetric::Cosine,
            ..StoreConfig::default()
        };
        let reopened = open_at(dir.path(), config);
        let hits = reopened
            .relevant_context("a note about sourdough", 1, None)
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_batched_flush_defers_snapshot_writes() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            flush: FlushPolicy::Batched { every: 3 },
            ..StoreConfig::default()
        };

        let store = open_at(dir.path(), config);
        store.save(Role::User, "one", &neutral()).unwrap();
        store.save(Role::User, "two", &neutral()).unwrap();
        assert_eq!(store.index.lock().unwrap().pending(), 2);

        store.save(Role::User, "three", &neutral()).unwrap();
        assert_eq!(store.index.lock().unwrap().pending(), 0);
    }

    #[test]
    fn test_close_flushes_pending_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            flush: FlushPolicy::Batched { every: 100 },
            ..StoreConfig::default()
        };

        let store = open_at(dir.path(), config);
        store.save(Role::User, "pending entry", &neutral()).unwrap();
        store.close().unwrap();

        let raw = fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        assert!(raw.contains("\"postings\""));

        let reopened = open_at(dir.path(), config);
        let hits = reopened.relevant_context("pending entry", 1, None).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_nsw_backend_end_to_end() {
        let store = MemoryStore::open_in_memory(
            Arc::new(HashingEmbedder::new(32)),
            StoreConfig {
                index: IndexKind::Nsw,
                ..StoreConfig::default()
            },
        )
        .unwrap();

        for text in [
            "planning a trip to the coast",
            "my job review is next week",
            "started a new exercise routine",
        ] {
            store.save(Role::User, text, &neutral()).unwrap();
        }

        let hits = store
            .relevant_context("my job review is next week", 1, None)
            .unwrap();
        assert_eq!(hits[0].text, "my job review is next week");
    }

    #[test]
    fn test_fetch_by_ids_preserves_order_and_omits_missing() {
        let store = test_store();
        let a = store.save(Role::User, "alpha", &neutral()).unwrap();
        let b = store.save(Role::User, "beta", &neutral()).unwrap();

        let entries = store.fetch_by_ids(&[b, 9999, a]).unwrap();
        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b, a]);
    }
}
