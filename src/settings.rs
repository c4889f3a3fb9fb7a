use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use reqwest::Client;

use crate::encoder::{Device, OnnxEncoder};
use crate::extract::HttpArticleExtractor;
use crate::feed::RssFeedSource;
use crate::llm::{ChatClient, ChatClientConfig};
use crate::relevance::{RelevanceFilter, DEFAULT_THRESHOLD};
use crate::shell::{Shell, DEFAULT_MAX_ENTRIES};
use crate::summarize::Summarizer;

pub const DEFAULT_EMBED_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Pipeline knobs shared by `fetch` and `serve`.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)] pub threshold: f32, // similarity must be strictly above this
    #[arg(long, default_value_t = DEFAULT_MAX_ENTRIES)] pub max_entries: usize, // entries read per feed
    #[arg(long, default_value = DEFAULT_EMBED_MODEL)] pub embed_model: String,
    #[arg(long)] pub onnx_filename: Option<String>,
    #[arg(long, value_enum, default_value_t = Device::Cpu)] pub device: Device,
    #[arg(long, default_value_t = 20)] pub http_timeout_secs: u64, // feeds and article pages
}

impl PipelineArgs {
    pub fn log_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("threshold", self.threshold.to_string()),
            ("max_entries", self.max_entries.to_string()),
            ("embed_model", self.embed_model.clone()),
            ("device", format!("{:?}", self.device)),
        ]
    }
}

/// Builds the long-lived collaborators once and wires them into a [`Shell`].
pub fn build_shell(args: &PipelineArgs) -> Result<Shell> {
    let http = Client::builder()
        .timeout(Duration::from_secs(args.http_timeout_secs))
        .build()
        .context("build http client")?;

    let encoder = OnnxEncoder::new(&args.embed_model, args.onnx_filename.as_deref(), args.device)
        .with_context(|| format!("init encoder {}", args.embed_model))?;
    let llm = ChatClient::retrying(ChatClientConfig::from_env()).context("init model client")?;
    tracing::info!(embed_model = %args.embed_model, llm_model = %llm.inner().model(), "🧩 pipeline ready");

    Ok(Shell::new(
        Arc::new(RssFeedSource::new(http.clone())),
        RelevanceFilter::new(Box::new(encoder), args.threshold),
        Arc::new(HttpArticleExtractor::new(http)),
        Summarizer::new(Arc::new(llm)),
        args.max_entries,
    ))
}
