use serde::Serialize;

use crate::telemetry;

/// Stage boundaries the user sees a progress indicator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    FetchAndFilter,
    Summarize,
    Highlights,
}

impl PipelineStage {
    pub fn message(&self) -> &'static str {
        match self {
            PipelineStage::FetchAndFilter => "🔎 Fetching and filtering articles...",
            PipelineStage::Summarize => "🧠 Extracting & summarizing articles...",
            PipelineStage::Highlights => "✨ Generating highlights...",
        }
    }
}

pub trait Progress: Send {
    fn stage(&mut self, stage: PipelineStage);
}

/// Reports each stage on the log stream.
pub struct LogProgress;

impl Progress for LogProgress {
    fn stage(&mut self, stage: PipelineStage) {
        telemetry::fetch().info(stage.message());
    }
}

/// Keeps the stages for display after the run (web page, tests).
#[derive(Debug, Default)]
pub struct RecordedProgress {
    pub stages: Vec<PipelineStage>,
}

impl Progress for RecordedProgress {
    fn stage(&mut self, stage: PipelineStage) {
        tracing::info!("{}", stage.message());
        self.stages.push(stage);
    }
}
