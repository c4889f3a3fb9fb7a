use std::sync::Arc;

use serde::Serialize;

use crate::feed::RelevantArticle;
use crate::llm::openai::UsageMetrics;
use crate::llm::{ChatCompletionRequest, ChatMessage, ChatRole, LlmClient, LlmError};
use crate::outcome::{text_or_sentinel, FailureKind, Stage, StageFailure, StageResult};
use crate::telemetry;

/// One newsletter entry: the feed fields plus the generated summary (or why there is none).
#[derive(Debug, Clone, Serialize)]
pub struct SummarizedArticle {
    pub title: String,
    pub link: String,
    pub source: String,
    pub summary: StageResult,
}

impl SummarizedArticle {
    pub fn new(article: &RelevantArticle, summary: StageResult) -> Self {
        Self {
            title: article.title.clone(),
            link: article.link.clone(),
            source: article.source.clone(),
            summary,
        }
    }

    pub fn summary_text(&self) -> &str {
        text_or_sentinel(&self.summary)
    }
}

/// Single-shot prompts against the hosted model: per-article summaries and the trends paragraph.
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn summarize(&self, content: &str) -> StageResult {
        self.ask(Stage::Summarize, summary_prompt(content)).await
    }

    pub async fn summarize_or_sentinel(&self, content: &str) -> String {
        text_or_sentinel(&self.summarize(content).await).to_string()
    }

    /// Runs once, after every article has its summary.
    pub async fn highlights(&self, summaries: &[SummarizedArticle]) -> StageResult {
        self.ask(Stage::Highlights, highlights_prompt(summaries)).await
    }

    async fn ask(&self, stage: Stage, prompt: String) -> StageResult {
        let request = ChatCompletionRequest {
            model: None,
            messages: vec![ChatMessage::new(ChatRole::System, prompt)],
            max_tokens: None,
            temperature: None,
        };
        let resp = self.llm.chat_completion(request).await.map_err(|err| failure_from(stage, &err))?;
        if let Some(usage) = &resp.usage {
            telemetry::fetch().debug_kv("model usage", usage_fields(stage, usage));
        }
        Ok(resp.content)
    }
}

pub fn summary_prompt(content: &str) -> String {
    format!(
        "Summarize the following article in 3-4 concise sentences:\n\n{content}\n\nOnly provide the summary, nothing else."
    )
}

pub fn highlights_prompt(summaries: &[SummarizedArticle]) -> String {
    let joined = summaries
        .iter()
        .map(|s| format!("Title: {}\nSummary: {}", s.title, s.summary_text()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Given the following list of summarized articles, write a short highlight section summarizing the key trends or stories:\n{joined}"
    )
}

fn usage_fields(stage: Stage, usage: &UsageMetrics) -> Vec<(&'static str, String)> {
    let count = |n: Option<u32>| n.map_or_else(|| "-".to_string(), |n| n.to_string());
    vec![
        ("stage", stage.name().to_string()),
        ("prompt_tokens", count(usage.prompt_tokens)),
        ("completion_tokens", count(usage.completion_tokens)),
        ("total_tokens", count(usage.total_tokens)),
    ]
}

fn failure_from(stage: Stage, err: &LlmError) -> StageFailure {
    let kind = match err {
        LlmError::EmptyMessages => FailureKind::InvalidInput,
        LlmError::Decode(_) => FailureKind::Unparseable,
        _ => FailureKind::ModelUnavailable,
    };
    StageFailure::new(stage, kind, err.to_string())
}
