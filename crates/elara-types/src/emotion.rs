//! Emotion detection output types.
//!
//! An [`EmotionSnapshot`] is produced by the emotion detector for every
//! conversation turn and attached to the entry when it is committed to the
//! memory store. The store treats it as opaque input to scoring and trend
//! aggregation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Overall sentiment of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    /// Stable string form used for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a [`Sentiment`] from its stored string form.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown sentiment: {0}")]
pub struct ParseSentimentError(pub String);

impl FromStr for Sentiment {
    type Err = ParseSentimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(ParseSentimentError(other.to_string())),
        }
    }
}

/// Emotional reading for a single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    /// Overall sentiment label.
    pub sentiment: Sentiment,
    /// Detected emotion tags (e.g. "joy", "fear").
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub emotions: Vec<String>,
    /// Emotional intensity on a 1-10 scale.
    pub intensity: u8,
}

impl EmotionSnapshot {
    /// Create a snapshot with a sentiment and intensity.
    pub fn new(sentiment: Sentiment, intensity: u8) -> Self {
        Self {
            sentiment,
            emotions: Vec::new(),
            intensity,
        }
    }

    /// A neutral snapshot at mid intensity, for turns where detection
    /// produced nothing.
    pub fn neutral() -> Self {
        Self::new(Sentiment::Neutral, 5)
    }

    /// Add an emotion tag.
    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotions.push(emotion.into());
        self
    }
}

impl Default for EmotionSnapshot {
    fn default() -> Self {
        Self::neutral()
    }
}
