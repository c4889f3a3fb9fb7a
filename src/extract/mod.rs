use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::outcome::{FailureKind, Stage, StageFailure, StageResult};

mod readable;

/// Fetches an article page and pulls out its readable text.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn extract(&self, url: &str) -> StageResult;

    /// Same as [`ArticleSource::extract`], with failures replaced by the fixed placeholder.
    async fn extract_text_or_sentinel(&self, url: &str) -> String {
        match self.extract(url).await {
            Ok(text) => text,
            Err(failure) => failure.sentinel().to_string(),
        }
    }
}

pub struct HttpArticleExtractor {
    client: Client,
}

impl HttpArticleExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArticleSource for HttpArticleExtractor {
    async fn extract(&self, url: &str) -> StageResult {
        let parsed = Url::parse(url).map_err(|e| fail(FailureKind::InvalidInput, format!("invalid url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(fail(FailureKind::InvalidInput, format!("unsupported scheme {}", parsed.scheme())));
        }

        let resp = self.client
            .get(parsed)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(FailureKind::Unreachable, e.to_string()))?;
        // decoded with the charset from Content-Type, utf-8 when absent
        let html = resp.text().await.map_err(|e| {
            if e.is_decode() {
                fail(FailureKind::Unparseable, format!("undecodable body: {e}"))
            } else {
                fail(FailureKind::Unreachable, e.to_string())
            }
        })?;

        extract_from_html(&html)
    }
}

pub fn extract_from_html(html: &str) -> StageResult {
    match readable::article_text(html) {
        Some(t) if !t.trim().is_empty() => Ok(t),
        _ => Err(fail(FailureKind::NoContent, "no readable text on page")),
    }
}

fn fail(kind: FailureKind, reason: impl Into<String>) -> StageFailure {
    StageFailure::new(Stage::Extract, kind, reason)
}
