//! Per-day emotion trend rollups.

use chrono::{Duration, NaiveDate, Utc};
use elara_types::{EmotionSnapshot, Sentiment};
use rusqlite::{Connection, params};

use crate::error::{MemoryError, Result};
use crate::types::DailyTrend;

use super::MemoryStore;

/// Fold one emotion snapshot into the rollup row for `date`.
///
/// Runs inside the same transaction as the entry insert, so the rollup can
/// never drift from the entries it summarizes. The intensity average is a
/// running mean over the day's count; sentiment and dominant emotions are
/// last-write-wins within the day.
pub(crate) fn apply_to_trend(
    conn: &Connection,
    date: NaiveDate,
    emotion: &EmotionSnapshot,
) -> Result<()> {
    let date_text = date.format("%Y-%m-%d").to_string();
    let emotions_json = serde_json::to_string(&emotion.emotions)?;

    let existing: Option<(f64, u32)> = {
        let mut stmt =
            conn.prepare("SELECT avg_intensity, count FROM daily_trends WHERE date = ?1")?;
        let mut rows = stmt.query(params![date_text])?;
        match rows.next()? {
            Some(row) => Some((row.get(0)?, row.get(1)?)),
            None => None,
        }
    };

    match existing {
        Some((avg, count)) => {
            let new_count = count + 1;
            let new_avg =
                (avg * f64::from(count) + f64::from(emotion.intensity)) / f64::from(new_count);
            conn.execute(
                "UPDATE daily_trends
                 SET sentiment = ?2, avg_intensity = ?3, dominant_emotions_json = ?4, count = ?5
                 WHERE date = ?1",
                params![
                    date_text,
                    emotion.sentiment.as_str(),
                    new_avg,
                    emotions_json,
                    new_count,
                ],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO daily_trends (date, sentiment, avg_intensity, dominant_emotions_json, count)
                 VALUES (?1, ?2, ?3, ?4, 1)",
                params![
                    date_text,
                    emotion.sentiment.as_str(),
                    f64::from(emotion.intensity),
                    emotions_json,
                ],
            )?;
        }
    }

    Ok(())
}

impl MemoryStore {
    /// Daily trend rows from the last `days` days, newest first.
    ///
    /// Days with no saved entries have no row; callers see gaps, not zeroed
    /// placeholders.
    pub fn trends(&self, days: u32) -> Result<Vec<DailyTrend>> {
        let cutoff = (Utc::now().date_naive() - Duration::days(i64::from(days)))
            .format("%Y-%m-%d")
            .to_string();

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT date, sentiment, avg_intensity, dominant_emotions_json, count
             FROM daily_trends WHERE date >= ?1 ORDER BY date DESC",
        )?;
        let mut rows = stmt.query(params![cutoff])?;

        let mut trends = Vec::new();
        while let Some(row) = rows.next()? {
            let date_raw: String = row.get(0)?;
            let sentiment_raw: String = row.get(1)?;

            let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
                .map_err(|e| MemoryError::InvalidData(format!("bad trend date {date_raw:?}: {e}")))?;
            let sentiment: Sentiment = sentiment_raw
                .parse()
                .map_err(|e| MemoryError::InvalidData(format!("trend {date_raw}: {e}")))?;
            let emotions_json: String = row.get(3)?;

            trends.push(DailyTrend {
                date,
                sentiment,
                avg_intensity: row.get(2)?,
                dominant_emotions: serde_json::from_str(&emotions_json)?,
                count: row.get(4)?,
            });
        }
        Ok(trends)
    }
}
