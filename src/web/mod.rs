use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use clap::Args;
use serde::Deserialize;
use tracing::Instrument;

use crate::persona::{self, Persona};
use crate::render::{FILE_NAME, MIME_TYPE};
use crate::settings::{self, PipelineArgs};
use crate::shell::{RecordedProgress, Shell};
use crate::telemetry;
use crate::telemetry::ops::serve::Phase as ServePhase;

pub mod page;

#[derive(Args, Debug)]
pub struct ServeCmd {
    #[arg(long, default_value = "127.0.0.1:8501")] addr: SocketAddr,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Clone)]
pub struct AppState {
    pub shell: Arc<Shell>,
}

#[derive(Debug, Deserialize)]
pub struct PersonaQuery {
    persona: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FetchForm {
    persona: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    markdown: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/fetch", post(fetch))
        .route("/download", post(download))
        .with_state(state)
}

pub async fn run(args: ServeCmd) -> Result<()> {
    let log = telemetry::serve();
    let mut fields = args.pipeline.log_fields();
    fields.push(("addr", args.addr.to_string()));
    let _g = log.root_span_kv(fields).entered();

    let shell = {
        let _s = log.span(&ServePhase::LoadModel).entered();
        settings::build_shell(&args.pipeline)?
    };
    let app = router(AppState { shell: Arc::new(shell) });

    let listener = tokio::net::TcpListener::bind(args.addr)
        .instrument(log.span(&ServePhase::Bind))
        .await
        .with_context(|| format!("bind {}", args.addr))?;
    log.info_kv(&format!("🌐 Listening on http://{}", args.addr), [("addr", args.addr.to_string())]);
    axum::serve(listener, app).await.context("serve http")?;
    Ok(())
}

fn selected(key: Option<&str>) -> &'static Persona {
    key.and_then(persona::find).unwrap_or_else(persona::default_persona)
}

async fn index(Query(q): Query<PersonaQuery>) -> Html<String> {
    Html(page::index(selected(q.persona.as_deref())))
}

async fn fetch(State(state): State<AppState>, Form(form): Form<FetchForm>) -> Response {
    let log = telemetry::serve();
    let Some(persona) = persona::find(&form.persona) else {
        let html = page::error(persona::default_persona(), &format!("Unknown persona: {}", form.persona));
        return (StatusCode::BAD_REQUEST, Html(html)).into_response();
    };

    let mut progress = RecordedProgress::default();
    let span = log.span_kv(&ServePhase::Request, [("persona", persona.name.to_string())]);
    match state.shell.run(persona, false, &mut progress).instrument(span).await {
        Ok(done) => Html(page::results(&done, &progress.stages)).into_response(),
        Err(err) => {
            log.error_kv("❌ pipeline failed", [("error", format!("{err:#}"))]);
            let html = page::error(persona, &format!("Newsletter run failed: {err}"));
            (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
        }
    }
}

async fn download(Form(form): Form<DownloadForm>) -> Response {
    let disposition = format!("attachment; filename=\"{FILE_NAME}\"");
    (
        [(header::CONTENT_TYPE, MIME_TYPE.to_string()), (header::CONTENT_DISPOSITION, disposition)],
        form.markdown,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse::tests::fixture_rss;
    use crate::llm::openai::MockClient;
    use crate::shell::testing::fixture_shell;

    /// Serves the full router over a fixture shell and returns its base URL.
    async fn spawn_app(shell: Shell) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState { shell: Arc::new(shell) });
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn http() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().unwrap()
    }

    #[tokio::test]
    async fn fetch_with_no_relevant_articles_warns_and_offers_no_download() {
        let llm = Arc::new(MockClient::new());
        let base = spawn_app(fixture_shell(Some(fixture_rss(&["Cricket: day one report"])), llm.clone(), vec![])).await;

        let resp = http().post(format!("{base}/fetch")).form(&[("persona", "Marco Rossi")]).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body = resp.text().await.unwrap();
        assert!(body.contains("<p class=\"warning\">⚠️ No relevant articles found.</p>"));
        assert!(!body.contains("action=\"/download\""));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_with_unknown_persona_is_bad_request() {
        let base = spawn_app(fixture_shell(None, Arc::new(MockClient::new()), vec![])).await;
        let resp = http().post(format!("{base}/fetch")).form(&[("persona", "Nobody")]).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(resp.text().await.unwrap().contains("Unknown persona: Nobody"));
    }

    #[tokio::test]
    async fn download_route_returns_attachment() {
        let base = spawn_app(fixture_shell(None, Arc::new(MockClient::new()), vec![])).await;
        let resp = http().post(format!("{base}/download")).form(&[("markdown", "# Weekly\n")]).send().await.unwrap();
        assert_eq!(resp.headers()[reqwest::header::CONTENT_DISPOSITION], "attachment; filename=\"newsletter.md\"");
        assert_eq!(resp.text().await.unwrap(), "# Weekly\n");
    }

    #[tokio::test]
    async fn download_is_markdown_attachment() {
        let resp = download(Form(DownloadForm { markdown: "# Hi\n".into() })).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/markdown");
        assert_eq!(resp.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"newsletter.md\"");
    }

    #[tokio::test]
    async fn index_defaults_to_first_persona() {
        let Html(body) = index(Query(PersonaQuery { persona: None })).await;
        assert!(body.contains("<option value=\"Alex Parker\" selected>"));
    }

    #[tokio::test]
    async fn index_ignores_unknown_persona() {
        let Html(body) = index(Query(PersonaQuery { persona: Some("Nobody".into()) })).await;
        assert!(body.contains("<option value=\"Alex Parker\" selected>"));
    }

    #[tokio::test]
    async fn index_selects_requested_persona() {
        let Html(body) = index(Query(PersonaQuery { persona: Some("lisa thompson".into()) })).await;
        assert!(body.contains("<option value=\"Lisa Thompson\" selected>"));
        assert!(body.contains("movies, celebrity news"));
    }
}
