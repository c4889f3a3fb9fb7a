use serde::Serialize;

/// Pipeline stage whose failure is substituted with placeholder text in the newsletter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Summarize,
    Highlights,
}

impl Stage {
    pub fn sentinel(&self) -> &'static str {
        match self {
            Stage::Extract => "⚠️ Failed to extract article content.",
            Stage::Summarize => "⚠️ Summary could not be generated.",
            Stage::Highlights => "⚠️ Highlights unavailable.",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Summarize => "summarize",
            Stage::Highlights => "highlights",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Fetched and parsed, but nothing usable came out.
    NoContent,
    /// Bytes arrived but could not be decoded.
    Unparseable,
    /// Network error, timeout or non-success HTTP status.
    Unreachable,
    /// Hosted model refused or could not be reached (missing key, API error, timeout).
    ModelUnavailable,
    /// Caller handed over something that can never succeed.
    InvalidInput,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NoContent => "no_content",
            FailureKind::Unparseable => "unparseable",
            FailureKind::Unreachable => "unreachable",
            FailureKind::ModelUnavailable => "model_unavailable",
            FailureKind::InvalidInput => "invalid_input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{} failed ({}): {reason}", .stage.name(), .kind.as_str())]
pub struct StageFailure {
    pub stage: Stage,
    pub kind: FailureKind,
    pub reason: String,
}

impl StageFailure {
    pub fn new(stage: Stage, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self { stage, kind, reason: reason.into() }
    }

    pub fn sentinel(&self) -> &'static str {
        self.stage.sentinel()
    }
}

pub type StageResult = Result<String, StageFailure>;

/// Text to show for a stage outcome: the value itself, or the stage's sentinel.
pub fn text_or_sentinel(outcome: &StageResult) -> &str {
    match outcome {
        Ok(text) => text,
        Err(failure) => failure.sentinel(),
    }
}
