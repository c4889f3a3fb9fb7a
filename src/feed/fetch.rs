use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Client;

pub async fn fetch_rss(client: &Client, url: &str) -> Result<Bytes> {
    let bytes = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("download feed {url}"))?
        .bytes()
        .await?;
    Ok(bytes)
}
