use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use serde::Serialize;

use crate::feed::RelevantArticle;
use crate::output::types::Meta;
use crate::persona::{self, Persona};
use crate::render;
use crate::settings::{self, PipelineArgs};
use crate::shell::{LogProgress, Newsletter, ShellState};

#[derive(Args, Debug)]
pub struct FetchCmd {
    #[arg(long)] persona: Option<String>, // name or full label; defaults to the first catalog entry
    #[arg(long, default_value = render::FILE_NAME)] out: PathBuf,
    #[arg(long, default_value_t = false)] dry_run: bool, // list relevant articles, skip the model

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Serialize)]
struct FetchPlan<'a> {
    persona: String,
    threshold: f32,
    articles: &'a [RelevantArticle],
}

#[derive(Serialize)]
struct FetchResult<'a> {
    persona: String,
    notice: String,
    articles: &'a [RelevantArticle],
    #[serde(skip_serializing_if = "Option::is_none")]
    newsletter: Option<&'a Newsletter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<String>,
}

pub fn resolve_persona(key: Option<&str>) -> Result<&'static Persona> {
    match key {
        None => Ok(persona::default_persona()),
        Some(k) => persona::find(k).ok_or_else(|| anyhow!("unknown persona {k:?}; run `newsletter personas` to list them")),
    }
}

pub async fn run(args: FetchCmd) -> Result<()> {
    use crate::telemetry::{self, config};
    use crate::telemetry::ops::fetch::Phase as FetchPhase;
    let t0 = Instant::now();
    let log = telemetry::fetch();
    let persona = resolve_persona(args.persona.as_deref())?;

    let mut fields = args.pipeline.log_fields();
    fields.push(("persona", persona.name.to_string()));
    fields.push(("dry_run", args.dry_run.to_string()));
    fields.push(("json", config::json_mode().to_string()));
    let _g = log.root_span_kv(fields).entered();

    let shell = settings::build_shell(&args.pipeline)?;
    let state = shell.run(persona, args.dry_run, &mut LogProgress).await?;

    let _s = log.span(&FetchPhase::Output).entered();
    let written_to = match state.download() {
        Some(download) if !args.dry_run => {
            std::fs::write(&args.out, &download.body)
                .with_context(|| format!("write {}", args.out.display()))?;
            log.info(format!("💾 Saved {} ({})", args.out.display(), download.mime));
            Some(args.out.display().to_string())
        }
        _ => None,
    };

    let notice = state.notice().map(|n| n.message()).unwrap_or_default();
    if config::json_mode() {
        if args.dry_run {
            return log.plan(&FetchPlan { persona: persona.label(), threshold: args.pipeline.threshold, articles: state.articles() });
        }
        let result = FetchResult { persona: persona.label(), notice, articles: state.articles(), newsletter: state.newsletter(), written_to };
        return log.result_with_meta(&result, Meta { duration_ms: Some(t0.elapsed().as_millis()) });
    }

    print_listing(&state, &notice);
    Ok(())
}

fn print_listing(state: &ShellState, notice: &str) {
    println!("{notice}");
    for article in state.articles() {
        println!();
        println!("### {}", article.title);
        println!("{}", article.link);
        println!("Source: {}", article.source);
        println!("{}", article.preview());
    }
    if let Some(newsletter) = state.newsletter() {
        println!();
        println!("Highlights: {}", crate::outcome::text_or_sentinel(&newsletter.highlights));
    }
}
