//! Core data types for the memory store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use elara_types::{EmotionSnapshot, Role, Sentiment};

// ─────────────────────────────────────────────────────────────────────────────
// Category
// ─────────────────────────────────────────────────────────────────────────────

/// Topic category assigned to an entry by the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Personal,
    Work,
    Health,
    Emotions,
    Goals,
    Experiences,
    /// Fallback when no category keyword matches.
    General,
}

impl Category {
    /// Stable string form used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Health => "health",
            Self::Emotions => "emotions",
            Self::Goals => "goals",
            Self::Experiences => "experiences",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Category`] from its stored string form.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "work" => Ok(Self::Work),
            "health" => Ok(Self::Health),
            "emotions" => Ok(Self::Emotions),
            "goals" => Ok(Self::Goals),
            "experiences" => Ok(Self::Experiences),
            "general" => Ok(Self::General),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Entry
// ─────────────────────────────────────────────────────────────────────────────

/// A committed conversation entry.
///
/// Entries are immutable once committed: the store assigns the id, records
/// the timestamp, and never mutates or deletes a row afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Store-assigned id, strictly increasing across the store's lifetime.
    pub id: i64,
    /// Commit time (store wall clock, UTC).
    pub timestamp: DateTime<Utc>,
    /// Who produced the text.
    pub role: Role,
    /// The conversation text.
    pub text: String,
    /// Embedding of the text, fixed dimension for the store's lifetime.
    pub embedding: Vec<f32>,
    /// Topic category from the scoring engine.
    pub category: Category,
    /// Importance score in [1.0, 10.0].
    pub importance: f32,
    /// Emotional reading attached at save time.
    pub emotion: EmotionSnapshot,
}

/// A retrieval result: an entry plus its distance to the query embedding.
#[derive(Debug, Clone)]
pub struct ContextMatch {
    /// The matched entry.
    pub entry: MemoryEntry,
    /// Distance from the query vector (lower = more similar).
    pub distance: f32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Daily Trend
// ─────────────────────────────────────────────────────────────────────────────

/// Per-calendar-day rollup of emotional readings.
///
/// Exactly one row exists per date. `avg_intensity` is the running mean of
/// every intensity contributed to that date; `sentiment` and
/// `dominant_emotions` carry the most recent contribution (last-write-wins,
/// not a statistical aggregate).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    /// Calendar date key (UTC).
    pub date: NaiveDate,
    /// Sentiment of the most recent contribution.
    pub sentiment: Sentiment,
    /// Running mean of all intensities contributed to this date.
    pub avg_intensity: f64,
    /// Emotion tags of the most recent contribution.
    pub dominant_emotions: Vec<String>,
    /// Number of contributions, always >= 1.
    pub count: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Statistics about the memory store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Total number of committed entries.
    pub total_count: usize,
    /// Entry count per category, ordered by count descending.
    pub category_histogram: Vec<(Category, usize)>,
    /// Mean importance across all entries, rounded to two decimals.
    pub average_importance: f64,
    /// Entries committed in the last seven days.
    pub recent_activity_count: usize,
}
