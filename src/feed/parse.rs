use anyhow::Result;
use chrono::{DateTime, Utc};
use rss::{Channel, Item};

use super::types::FeedEntry;

pub fn parse_channel(xml: &[u8]) -> Result<Channel> {
    let ch = Channel::read_from(xml)?;
    Ok(ch)
}

/// Turn the first `limit` channel items into entries. Items without a link are skipped.
pub fn entries_from_channel(channel: &Channel, source: &str, limit: usize) -> Vec<FeedEntry> {
    channel
        .items()
        .iter()
        .take(limit)
        .filter_map(|item| {
            let link = item.link()?.trim();
            if link.is_empty() { return None; }
            Some(FeedEntry {
                title: item.title().unwrap_or("").trim().to_string(),
                link: link.to_string(),
                summary: item.description().unwrap_or("").to_string(),
                source: source.to_string(),
                published_at: extract_published_at(item),
            })
        })
        .collect()
}

pub fn extract_published_at(item: &Item) -> Option<DateTime<Utc>> {
    if let Some(pub_date) = item.pub_date() {
        if let Ok(dt) = DateTime::parse_from_rfc2822(pub_date) { return Some(dt.with_timezone(&Utc)); }
    }
    // Attempt Dublin Core date if available (RFC3339)
    if let Some(dc) = item.dublin_core_ext() {
        if let Some(first) = dc.dates().first() {
            if let Ok(dt) = DateTime::parse_from_rfc3339(first) { return Some(dt.with_timezone(&Utc)); }
        }
    }
    None
}
