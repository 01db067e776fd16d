//! Scoring engine: category classification and importance scoring.
//!
//! Pure and deterministic. No I/O, no clock, no randomness: re-scoring the
//! same inputs always yields the same `(category, importance)` pair.

use elara_types::EmotionSnapshot;

use crate::types::Category;

// ─────────────────────────────────────────────────────────────────────────────
// Keyword Tables
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered category keyword table.
///
/// Classification walks this slice front to back and returns the first
/// category with a keyword match, so the slice order is the tie-break and
/// must stay stable.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Personal,
        &["family", "friends", "relationships", "personal"],
    ),
    (
        Category::Work,
        &["job", "work", "career", "office", "colleague"],
    ),
    (
        Category::Health,
        &["health", "doctor", "medicine", "exercise", "sleep"],
    ),
    (
        Category::Emotions,
        &["feeling", "emotion", "mood", "happy", "sad", "angry"],
    ),
    (
        Category::Goals,
        &["goal", "dream", "aspiration", "want", "hope", "plan"],
    ),
    (
        Category::Experiences,
        &["experience", "memory", "remember", "happened", "event"],
    ),
];

/// Emotion tags that make an entry more memorable.
const MEMORABLE_EMOTIONS: &[&str] = &["love", "fear", "anger", "joy", "sadness"];

/// Personal-topic keywords that raise importance.
const PERSONAL_TOPICS: &[&str] = &[
    "family", "love", "death", "birth", "marriage", "divorce", "job", "health",
];

/// Combined text length beyond which the length bonus applies.
const LONG_EXCHANGE_CHARS: usize = 200;

// ─────────────────────────────────────────────────────────────────────────────
// Classification
// ─────────────────────────────────────────────────────────────────────────────

/// Classify text into a [`Category`].
///
/// Case-insensitive substring match against [`CATEGORY_KEYWORDS`]; the first
/// matching category wins. Defaults to [`Category::General`].
pub fn classify(text: &str) -> Category {
    let lowered = text.to_lowercase();

    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|kw| lowered.contains(kw)) {
            return *category;
        }
    }

    Category::General
}

// ─────────────────────────────────────────────────────────────────────────────
// Importance
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the importance score for an entry, clamped to [1.0, 10.0].
///
/// `paired_text` is the other half of an exchange (e.g. the agent response
/// paired with a user turn); it only contributes to the length bonus.
pub fn importance(text: &str, paired_text: Option<&str>, emotion: &EmotionSnapshot) -> f32 {
    let mut score = 5.0f32;

    // High intensity emotions are more important.
    if emotion.intensity >= 8 {
        score += 2.0;
    } else if emotion.intensity >= 6 {
        score += 1.0;
    } else if emotion.intensity <= 3 {
        score -= 1.0;
    }

    // Certain emotions are more memorable.
    if emotion
        .emotions
        .iter()
        .any(|e| MEMORABLE_EMOTIONS.contains(&e.as_str()))
    {
        score += 1.0;
    }

    // Long exchanges carry more context.
    let combined_len = text.len() + paired_text.map_or(0, str::len);
    if combined_len > LONG_EXCHANGE_CHARS {
        score += 0.5;
    }

    // Personal topics matter more.
    let lowered = text.to_lowercase();
    if PERSONAL_TOPICS.iter().any(|kw| lowered.contains(kw)) {
        score += 1.5;
    }

    score.clamp(1.0, 10.0)
}

/// Classify and score in one call.
pub fn score(text: &str, paired_text: Option<&str>, emotion: &EmotionSnapshot) -> (Category, f32) {
    (classify(text), importance(text, paired_text, emotion))
}
