use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use archivist::config::{self, EngineSettings};
use archivist::models::{ExtractType, ExtractionInput};
use archivist::{ExtractOptions, Orchestrator};

/// Extract dates, people, organizations and places from an archival document
#[derive(Parser, Debug)]
#[command(name = "archivist", version)]
struct Args {
    /// Document to read; stdin when omitted
    #[arg(value_name = "PATH")]
    file: Option<PathBuf>,

    /// Provider to try first
    #[arg(short, long)]
    provider: Option<String>,

    /// Use only this provider, with no fallback
    #[arg(long, conflicts_with = "provider")]
    only: Option<String>,

    /// Skip providers that cannot summarise
    #[arg(long)]
    summary: bool,

    /// Restrict output to these sections (repeatable)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    types: Vec<ExtractType>,

    /// Place the document is about, e.g. "Duluth, MN"
    #[arg(long)]
    location: Option<String>,

    /// Anchor for relative dates (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Provider registry file; defaults to the per-user providers.json
    #[arg(long, value_name = "PATH")]
    providers: Option<PathBuf>,

    /// Print provider statuses and exit
    #[arg(long)]
    status: bool,
}

fn read_document(path: Option<&PathBuf>) -> std::io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = EngineSettings::from_env()?;
    let registry = args.providers.clone().unwrap_or_else(config::providers_file_path);
    let configs = if registry.exists() {
        config::load_provider_configs(&registry)?
    } else {
        settings.default_providers()
    };
    tracing::debug!(providers = configs.len(), path = %registry.display(), "Provider registry loaded");

    let orchestrator = Orchestrator::from_settings(&settings, configs)?;
    let outcome = execute(&orchestrator, args).await;
    orchestrator.shutdown();
    outcome
}

async fn execute(orchestrator: &Orchestrator, args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.status {
        let statuses = orchestrator.provider_statuses().await;
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let text = read_document(args.file.as_ref())?;
    let source_id = args
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdin".to_string());
    let mut input = ExtractionInput::new(text).with_source("file", &source_id);
    if let Some(location) = &args.location {
        input = input.with_location_context(location);
    }
    if !args.types.is_empty() {
        input = input.with_extract_types(args.types.clone());
    }
    if let Some(date) = args.reference_date {
        input = input.with_reference_date(date);
    }

    let result = match &args.only {
        Some(id) => orchestrator.extract_with(id, &input).await?,
        None => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let options = ExtractOptions {
                preferred_provider: args.provider.clone(),
                require_summary: args.summary,
                cancel: Some(cancel),
            };
            orchestrator.extract(&input, options).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    archivist::init_tracing();
    let args = Args::parse();
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Extraction failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
