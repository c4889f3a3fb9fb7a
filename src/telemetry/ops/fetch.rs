use tracing::{info_span, Span};

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Fetch;

#[derive(Copy, Clone, Debug)]
pub enum Phase {
    Feed,
    FetchRss,
    ParseRss,
    Filter,
    Extract,
    Summarize,
    Highlights,
    Render,
    Output,
}

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Feed => "feed",
            Phase::FetchRss => "fetch_rss",
            Phase::ParseRss => "parse_rss",
            Phase::Filter => "filter",
            Phase::Extract => "extract",
            Phase::Summarize => "summarize",
            Phase::Highlights => "highlights",
            Phase::Render => "render",
            Phase::Output => "output",
        }
    }

    fn span(&self) -> Span {
        match self {
            Phase::Feed => info_span!("feed"),
            Phase::FetchRss => info_span!("fetch_rss"),
            Phase::ParseRss => info_span!("parse_rss"),
            Phase::Filter => info_span!("filter"),
            Phase::Extract => info_span!("extract"),
            Phase::Summarize => info_span!("summarize"),
            Phase::Highlights => info_span!("highlights"),
            Phase::Render => info_span!("render"),
            Phase::Output => info_span!("output"),
        }
    }
}

impl OpMarker for Fetch {
    const NAME: &'static str = "fetch";
    type Phase = Phase;

    fn root_span() -> Span {
        info_span!("fetch")
    }
}
