use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::Instrument;

use crate::telemetry;
use crate::telemetry::ops::fetch::Phase as FetchPhase;

mod fetch;
pub(crate) mod parse;
pub mod types;

pub use types::{FeedEntry, RelevantArticle};

/// Reads entries from one feed URL, in feed order.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn entries(&self, url: &str, limit: usize) -> Result<Vec<FeedEntry>>;
}

/// Downloads the feed over HTTP and parses it as RSS.
pub struct RssFeedSource {
    client: Client,
}

impl RssFeedSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn entries(&self, url: &str, limit: usize) -> Result<Vec<FeedEntry>> {
        let log = telemetry::fetch();
        let xml = fetch::fetch_rss(&self.client, url)
            .instrument(log.span_kv(&FetchPhase::FetchRss, [("url", url.to_string())]))
            .await?;
        let channel = { let _s = log.span(&FetchPhase::ParseRss).entered(); parse::parse_channel(&xml)? };
        Ok(parse::entries_from_channel(&channel, url, limit))
    }
}
