use clap::{Parser, Subcommand};
use anyhow::Result;
use dotenvy::dotenv;

mod encoder;
mod extract;
mod feed;
mod fetch;
mod llm;
mod outcome;
mod output;
mod persona;
mod relevance;
mod render;
mod settings;
mod shell;
mod summarize;
mod telemetry;
mod tokenizer;
mod web;

#[derive(Parser)]
#[command(name = "newsletter", about = "Persona-driven newsletter from RSS feeds")]
struct Cli {
    /// Emit a single JSON envelope to stdout; logs go to stderr
    #[arg(global = true, long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in personas
    Personas(persona::PersonasCmd),
    /// Fetch, filter and summarize into a markdown newsletter
    Fetch(fetch::FetchCmd),
    /// Serve the single-page web UI
    Serve(web::ServeCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    telemetry::config::set_json_mode(cli.json);

    // stderr; respects RUST_LOG and NEWSLETTER_LOG_FORMAT
    telemetry::config::init_tracing();

    match cli.command {
        Commands::Personas(args) => persona::run(args)?,
        Commands::Fetch(args) => fetch::run(args).await?,
        Commands::Serve(args) => web::run(args).await?,
    }

    Ok(())
}
