//! Semantic memory store for conversational agents.
//!
//! Persists conversation turns durably in SQLite and keeps a derived vector
//! index over their embeddings for similarity retrieval. Every saved turn is
//! scored deterministically (topic category plus a 1-10 importance score)
//! and folded into a per-day emotion trend rollup.
//!
//! The relational store is the single source of truth; the index is a cache
//! that is rebuilt from it whenever its snapshot is missing, corrupt, or out
//! of date. Embedding models are injected through [`EmbeddingProvider`], so
//! the store never performs inference itself.
//!
//! ```no_run
//! use std::sync::Arc;
//! use elara_memory::{HashingEmbedder, MemoryStore, StoreConfig};
//! use elara_types::{EmotionSnapshot, Role, Sentiment};
//!
//! # fn main() -> elara_memory::Result<()> {
//! let store = MemoryStore::open(
//!     "./memory",
//!     Arc::new(HashingEmbedder::new(384)),
//!     StoreConfig::default(),
//! )?;
//!
//! let emotion = EmotionSnapshot::new(Sentiment::Positive, 8).with_emotion("joy");
//! store.save(Role::User, "I'm really excited about my new job!", &emotion)?;
//!
//! let context = store.relevant_context("how is work going", 5, None)?;
//! # let _ = context;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod index;
pub mod scoring;
pub mod store;
pub mod types;
pub mod validation;

pub use embedding::{EmbeddingProvider, HashingEmbedder};
pub use error::{MemoryError, Result};
pub use index::{DistanceMetric, IndexKind};
pub use store::{FlushPolicy, MemoryStore, StoreConfig};
pub use types::{Category, ContextMatch, DailyTrend, MemoryEntry, StoreStats};
