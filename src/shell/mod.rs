use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::extract::ArticleSource;
use crate::feed::{FeedSource, RelevantArticle};
use crate::outcome::{text_or_sentinel, StageResult};
use crate::persona::Persona;
use crate::relevance::RelevanceFilter;
use crate::render::{self, FILE_NAME, MIME_TYPE};
use crate::summarize::{SummarizedArticle, Summarizer};
use crate::telemetry;
use crate::telemetry::ops::fetch::Phase as FetchPhase;

pub mod progress;

pub use progress::{LogProgress, PipelineStage, Progress, RecordedProgress};

pub const DEFAULT_MAX_ENTRIES: usize = 15;

/// The rendered newsletter and the pieces it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct Newsletter {
    pub persona: String,
    pub highlights: StageResult,
    pub articles: Vec<SummarizedArticle>,
    pub markdown: String,
}

/// What the user can save once a run completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: &'static str,
    pub mime: &'static str,
    pub body: String,
}

#[derive(Debug, Clone)]
pub enum ShellState {
    /// Persona chosen, nothing fetched yet.
    Idle { persona: &'static Persona },
    /// Relevant articles known; nothing summarized. Also the end state when none matched.
    Fetched { persona: &'static Persona, articles: Vec<RelevantArticle> },
    /// Newsletter rendered and downloadable.
    Ready { persona: &'static Persona, articles: Vec<RelevantArticle>, newsletter: Newsletter },
}

impl ShellState {
    pub fn idle(persona: &'static Persona) -> Self {
        ShellState::Idle { persona }
    }

    pub fn persona(&self) -> &'static Persona {
        match self {
            ShellState::Idle { persona }
            | ShellState::Fetched { persona, .. }
            | ShellState::Ready { persona, .. } => persona,
        }
    }

    pub fn articles(&self) -> &[RelevantArticle] {
        match self {
            ShellState::Idle { .. } => &[],
            ShellState::Fetched { articles, .. } | ShellState::Ready { articles, .. } => articles,
        }
    }

    pub fn newsletter(&self) -> Option<&Newsletter> {
        match self {
            ShellState::Ready { newsletter, .. } => Some(newsletter),
            _ => None,
        }
    }

    /// Success or warning line for a finished fetch; none while idle.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            ShellState::Idle { .. } => None,
            _ if self.articles().is_empty() => Some(Notice::NoneFound),
            _ => Some(Notice::Found(self.articles().len())),
        }
    }

    pub fn download(&self) -> Option<Download> {
        self.newsletter().map(|n| Download { file_name: FILE_NAME, mime: MIME_TYPE, body: n.markdown.clone() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Found(usize),
    NoneFound,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::Found(n) => format!("✅ Found {n} relevant articles."),
            Notice::NoneFound => "⚠️ No relevant articles found.".to_string(),
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Notice::NoneFound)
    }
}

/// Runs the fetch → filter → extract → summarize → highlights → render pipeline.
/// Collaborators are built once at startup and shared across runs.
pub struct Shell {
    feeds: Arc<dyn FeedSource>,
    // the encoder needs exclusive access, so runs are serialised on this lock
    filter: Mutex<RelevanceFilter>,
    articles: Arc<dyn ArticleSource>,
    summarizer: Summarizer,
    max_entries: usize,
}

impl Shell {
    pub fn new(
        feeds: Arc<dyn FeedSource>,
        filter: RelevanceFilter,
        articles: Arc<dyn ArticleSource>,
        summarizer: Summarizer,
        max_entries: usize,
    ) -> Self {
        Self { feeds, filter: Mutex::new(filter), articles, summarizer, max_entries }
    }

    /// Idle → Fetched (`dry_run`, or nothing relevant) or Idle → Ready.
    pub async fn run(&self, persona: &'static Persona, dry_run: bool, progress: &mut dyn Progress) -> Result<ShellState> {
        let log = telemetry::fetch();

        progress.stage(PipelineStage::FetchAndFilter);
        let articles = self.fetch_and_filter(persona).await?;
        let notice = if articles.is_empty() { Notice::NoneFound } else { Notice::Found(articles.len()) };
        if notice.is_warning() { log.warn(notice.message()); } else { log.info(notice.message()); }
        if dry_run || articles.is_empty() {
            return Ok(ShellState::Fetched { persona, articles });
        }

        progress.stage(PipelineStage::Summarize);
        let summaries = self.summarize_all(&articles).await;

        progress.stage(PipelineStage::Highlights);
        let highlights = self
            .summarizer
            .highlights(&summaries)
            .instrument(log.span(&FetchPhase::Highlights))
            .await;
        if let Err(failure) = &highlights {
            log.warn_kv("⚠️ highlights failed", [("kind", failure.kind.as_str().to_string()), ("reason", failure.reason.clone())]);
        }

        let label = persona.label();
        let markdown = {
            let _s = log.span(&FetchPhase::Render).entered();
            render::render(&label, &summaries, text_or_sentinel(&highlights))
        };

        let failed = summaries.iter().filter(|s| s.summary.is_err()).count();
        log.totals(articles.len(), summaries.len() - failed, failed);

        let newsletter = Newsletter { persona: label, highlights, articles: summaries, markdown };
        Ok(ShellState::Ready { persona, articles, newsletter })
    }

    /// Reads every feed of the persona in order and keeps the entries that pass the relevance check.
    /// A feed that cannot be read contributes nothing.
    pub async fn fetch_and_filter(&self, persona: &Persona) -> Result<Vec<RelevantArticle>> {
        let log = telemetry::fetch();
        let mut filter = self.filter.lock().await;
        log.debug_kv("filtering feeds", [("persona", persona.name.to_string()), ("threshold", filter.threshold().to_string())]);
        let mut kept: Vec<RelevantArticle> = Vec::new();

        for url in persona.feeds {
            let feed_span = log.span_kv(&FetchPhase::Feed, [("url", url.to_string())]);
            let fetched = self.feeds.entries(url, self.max_entries).instrument(feed_span.clone()).await;
            let _feed = feed_span.entered();
            let entries = match fetched {
                Ok(entries) => entries,
                Err(err) => {
                    log.warn_kv("⚠️ feed unavailable", [("url", url.to_string()), ("error", format!("{err:#}"))]);
                    Vec::new()
                }
            };

            let _s = log.span(&FetchPhase::Filter).entered();
            let before = kept.len();
            for entry in &entries {
                if let Some(m) = filter.first_match(&entry.relevance_text(), persona.interests)? {
                    log.debug_kv("➕ relevant", [("title", entry.title.clone()), ("interest", persona.interests[m.index].to_string()), ("score", format!("{:.3}", m.score))]);
                    kept.push(entry.clone());
                }
            }
            log.feed_summary(url, entries.len(), kept.len() - before);
        }
        Ok(kept)
    }

    /// One summary per article, in order. Failures are carried as values, never raised.
    pub async fn summarize_all(&self, articles: &[RelevantArticle]) -> Vec<SummarizedArticle> {
        let log = telemetry::fetch();
        let mut out = Vec::with_capacity(articles.len());
        for article in articles {
            let extracted = self
                .articles
                .extract(&article.link)
                .instrument(log.span_kv(&FetchPhase::Extract, [("url", article.link.clone())]))
                .await;
            let summary = match extracted {
                Ok(text) => self.summarizer.summarize(&text).instrument(log.span(&FetchPhase::Summarize)).await,
                Err(failure) => Err(failure),
            };
            if let Err(failure) = &summary {
                log.warn_kv("⚠️ article not summarized", [
                    ("title", article.title.clone()),
                    ("stage", failure.stage.name().to_string()),
                    ("kind", failure.kind.as_str().to_string()),
                    ("reason", failure.reason.clone()),
                ]);
            }
            out.push(SummarizedArticle::new(article, summary));
        }
        out
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::feed::parse;
    use crate::feed::FeedEntry;
    use crate::llm::openai::MockClient;
    use crate::outcome::{FailureKind, Stage, StageFailure};
    use crate::relevance::testing::KeywordEmbedder;
    use crate::relevance::DEFAULT_THRESHOLD;

    /// Marco Rossi's only feed.
    pub const BBC: &str = "https://feeds.bbci.co.uk/sport/rss.xml";

    struct FixtureFeeds {
        xml: HashMap<String, String>,
    }

    #[async_trait]
    impl FeedSource for FixtureFeeds {
        async fn entries(&self, url: &str, limit: usize) -> Result<Vec<FeedEntry>> {
            let xml = self.xml.get(url).ok_or_else(|| anyhow::anyhow!("no fixture for {url}"))?;
            let channel = parse::parse_channel(xml.as_bytes())?;
            Ok(parse::entries_from_channel(&channel, url, limit))
        }
    }

    /// Returns `Body of <url>` except for links listed as broken.
    struct CannedArticles {
        broken: Vec<String>,
    }

    #[async_trait]
    impl ArticleSource for CannedArticles {
        async fn extract(&self, url: &str) -> StageResult {
            if self.broken.iter().any(|b| b == url) {
                return Err(StageFailure::new(Stage::Extract, FailureKind::Unreachable, "404"));
            }
            Ok(format!("Body of {url}"))
        }
    }

    /// Shell over an in-memory BBC sport feed (`None` makes the feed fail) and a keyword embedder.
    pub fn fixture_shell(feed_xml: Option<String>, llm: Arc<MockClient>, broken: Vec<String>) -> Shell {
        let mut xml = HashMap::new();
        if let Some(body) = feed_xml { xml.insert(BBC.to_string(), body); }
        let filter = RelevanceFilter::new(Box::new(KeywordEmbedder::new(&["football", "f1", "nba"])), DEFAULT_THRESHOLD);
        Shell::new(
            Arc::new(FixtureFeeds { xml }),
            filter,
            Arc::new(CannedArticles { broken }),
            Summarizer::new(llm),
            DEFAULT_MAX_ENTRIES,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::fixture_shell as shell;
    use super::*;
    use crate::feed::parse::tests::fixture_rss;
    use crate::llm::openai::MockClient;
    use crate::persona;

    fn fifteen_entries() -> String {
        let mut titles = vec!["Cricket: day one report"; 15];
        titles[2] = "Football: derby ends level";
        titles[7] = "Football transfer news";
        titles[11] = "Women's football final preview";
        fixture_rss(&titles)
    }

    #[tokio::test]
    async fn marco_rossi_gets_three_football_articles_in_feed_order() {
        let llm = Arc::new(MockClient::new());
        for s in ["S1", "S2", "S3", "Football dominated the week."] { llm.push_text(s); }
        let shell = shell(Some(fifteen_entries()), llm.clone(), vec![]);
        let marco = persona::find("Marco Rossi").unwrap();

        let mut progress = RecordedProgress::default();
        let state = shell.run(marco, false, &mut progress).await.unwrap();

        let links: Vec<&str> = state.articles().iter().map(|a| a.link.as_str()).collect();
        assert_eq!(links, vec!["https://example.com/2", "https://example.com/7", "https://example.com/11"]);

        let newsletter = state.newsletter().unwrap();
        assert_eq!(newsletter.articles.len(), 3);
        assert_eq!(newsletter.articles[1].summary_text(), "S2");
        assert_eq!(newsletter.highlights.as_deref(), Ok("Football dominated the week."));

        let md = &newsletter.markdown;
        assert_eq!(md.lines().filter(|l| l.starts_with("## [")).count(), 3);
        assert_eq!(md.lines().filter(|l| *l == "## Highlights").count(), 1);
        assert!(md.starts_with("# Marco Rossi (Sports Journalist, Italy)'s Personalized Newsletter"));

        assert_eq!(progress.stages, vec![PipelineStage::FetchAndFilter, PipelineStage::Summarize, PipelineStage::Highlights]);
        assert_eq!(llm.calls().len(), 4);
        assert_eq!(state.notice(), Some(Notice::Found(3)));

        let download = state.download().unwrap();
        assert_eq!(download.file_name, "newsletter.md");
        assert_eq!(download.mime, "text/markdown");
    }

    #[tokio::test]
    async fn empty_feed_warns_and_offers_no_download() {
        let llm = Arc::new(MockClient::new());
        let shell = shell(Some(fixture_rss(&[])), llm.clone(), vec![]);
        let marco = persona::find("Marco Rossi").unwrap();

        let state = shell.run(marco, false, &mut RecordedProgress::default()).await.unwrap();
        assert!(matches!(state, ShellState::Fetched { .. }));
        assert_eq!(state.notice(), Some(Notice::NoneFound));
        assert_eq!(state.notice().unwrap().message(), "⚠️ No relevant articles found.");
        assert!(state.download().is_none());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn unreadable_feed_counts_as_empty() {
        let shell = shell(None, Arc::new(MockClient::new()), vec![]);
        let marco = persona::find("Marco Rossi").unwrap();
        let articles = shell.fetch_and_filter(marco).await.unwrap();
        assert!(articles.is_empty());
    }

    #[tokio::test]
    async fn dry_run_stops_before_the_model() {
        let llm = Arc::new(MockClient::new());
        let shell = shell(Some(fifteen_entries()), llm.clone(), vec![]);
        let marco = persona::find("Marco Rossi").unwrap();

        let state = shell.run(marco, true, &mut RecordedProgress::default()).await.unwrap();
        assert!(matches!(state, ShellState::Fetched { .. }));
        assert_eq!(state.articles().len(), 3);
        assert!(state.download().is_none());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_skips_model_and_renders_sentinel() {
        let llm = Arc::new(MockClient::new());
        for s in ["S1", "S3", "Highlights."] { llm.push_text(s); }
        let shell = shell(Some(fifteen_entries()), llm.clone(), vec!["https://example.com/7".into()]);
        let marco = persona::find("Marco Rossi").unwrap();

        let state = shell.run(marco, false, &mut RecordedProgress::default()).await.unwrap();
        let newsletter = state.newsletter().unwrap();
        assert_eq!(newsletter.articles[1].summary_text(), "⚠️ Failed to extract article content.");
        assert_eq!(newsletter.articles[2].summary_text(), "S3");
        assert_eq!(llm.calls().len(), 3);
    }

    #[tokio::test]
    async fn model_outage_still_renders_every_article() {
        // no queued responses: every model call fails
        let shell = shell(Some(fifteen_entries()), Arc::new(MockClient::new()), vec![]);
        let marco = persona::find("Marco Rossi").unwrap();

        let state = shell.run(marco, false, &mut RecordedProgress::default()).await.unwrap();
        let md = &state.newsletter().unwrap().markdown;
        assert_eq!(md.matches("⚠️ Summary could not be generated.").count(), 3);
        assert!(md.contains("## Highlights\n⚠️ Highlights unavailable.\n"));
    }

    #[test]
    fn idle_state_has_no_notice_or_download() {
        let state = ShellState::idle(persona::default_persona());
        assert!(state.notice().is_none());
        assert!(state.articles().is_empty());
        assert!(state.download().is_none());
    }
}
