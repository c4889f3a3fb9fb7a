use chrono::{DateTime, Utc};
use serde::Serialize;

/// One item read from a feed, in feed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Text the relevance check looks at.
    pub fn relevance_text(&self) -> String {
        format!("{} {}", self.title, self.summary)
    }

    /// First 300 characters of the feed snippet, as listed before summarizing.
    pub fn preview(&self) -> String {
        let head: String = self.summary.chars().take(300).collect();
        format!("{head}...")
    }
}

/// A feed entry that passed the relevance filter.
pub type RelevantArticle = FeedEntry;
