//! Entry point for the `folio` binary.
//!
//! Loads the configuration, wires the pipeline and dispatches the parsed
//! subcommand.
//!
//! ```sh
//! folio init
//! folio import ~/.config/folio/knowledge.yaml
//! folio embed
//! folio serve
//! ```

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::OnceCell;
use std::{error::Error, fs, path::PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use portfolio_assistant::{
    commands::{Cli, Commands},
    config::{self, PortfolioConfig},
    config_dir,
    pipeline::{ChatPipeline, ChatRequest, Collaborators},
    server,
    store::{self, SqliteStore},
};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

async fn run() -> Result<(), Box<dyn Error>> {
    let Cli {
        config: config_path,
        api_key,
        command,
    } = Cli::parse();

    match command {
        Commands::Init => init()?,
        Commands::Serve { bind } => {
            let mut portfolio_config = load(config_path, api_key)?;
            if let Some(bind) = bind {
                portfolio_config.server.bind_address = bind;
            }
            let pipeline = build_pipeline(&portfolio_config).await?;
            server::serve(
                pipeline,
                portfolio_config.retrieval.sources_in_response,
                &portfolio_config.server,
            )
            .await?;
        }
        Commands::Ask {
            question,
            language,
            session,
        } => {
            let portfolio_config = load(config_path, api_key)?;
            let pipeline = build_pipeline(&portfolio_config).await?;
            ask(&pipeline, &portfolio_config, question, language, session).await;
        }
        Commands::Import { file } => {
            let portfolio_config = load(config_path, api_key)?;
            let yaml = fs::read_to_string(&file)?;
            let store = SqliteStore::open(portfolio_config.database_url.clone()).await?;
            let ids = store::import_knowledge(&store, &yaml).await?;
            println!("Imported {} entries from {}", ids.len(), file.display());
        }
        Commands::Embed => {
            let portfolio_config = load(config_path, api_key)?;
            let pipeline = build_pipeline(&portfolio_config).await?;
            embed(&pipeline).await?;
        }
    }

    Ok(())
}

/// Load `path` (or the default config.yaml) and apply the `--api-key` override.
fn load(path: Option<PathBuf>, api_key: Option<String>) -> Result<PortfolioConfig, Box<dyn Error>> {
    let path = match path {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };
    debug!(path = %path.display(), "loading config");
    let mut portfolio_config = config::load_config(&path.to_string_lossy())?;
    if let Some(key) = api_key {
        portfolio_config.provider.api_key = key;
    }
    Ok(portfolio_config)
}

async fn build_pipeline(config: &PortfolioConfig) -> Result<ChatPipeline, Box<dyn Error>> {
    let collaborators = Collaborators::from_config(config).await?;
    Ok(ChatPipeline::new(collaborators, config))
}

async fn ask(
    pipeline: &ChatPipeline,
    config: &PortfolioConfig,
    question: String,
    language: Option<String>,
    session: Option<String>,
) {
    let outcome = pipeline
        .handle(&ChatRequest {
            message: question,
            session_id: session,
            language,
            force_language: None,
        })
        .await;

    println!("{}\n", outcome.response);
    for result in outcome
        .results
        .iter()
        .take(config.retrieval.sources_in_response)
    {
        println!(
            "  [{}%] {} / {} ({})",
            result.confidence_percent(),
            result.entry.category,
            result.entry.title,
            result.source.as_str()
        );
    }
    debug!(
        language = %outcome.language,
        processing_time_ms = outcome.processing_time_ms,
        "answered"
    );
}

async fn embed(pipeline: &ChatPipeline) -> Result<(), Box<dyn Error>> {
    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template(
        "{spinner} [{bar:40}] {pos}/{len} embeddings",
    )?);
    let progress = bar.clone();
    let report = pipeline
        .backfill_all(move |done, total| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
        })
        .await?;
    bar.finish_and_clear();

    println!(
        "Embedded {} of {} entries ({} failed)",
        report.stored, report.attempted, report.failed
    );
    Ok(())
}

/// Write a default `config.yaml` and a sample `knowledge.yaml` into the
/// config directory. Existing files are left alone.
fn init() -> Result<(), Box<dyn Error>> {
    let dir = config_dir()?;
    info!(path = %dir.display(), "creating config directory");
    fs::create_dir_all(&dir)?;

    let config_path = dir.join("config.yaml");
    let config = PortfolioConfig {
        database_url: dir.join("portfolio.db").to_string_lossy().into_owned(),
        ..PortfolioConfig::default()
    };
    write_if_missing(config_path, &serde_yaml::to_string(&config)?)?;
    write_if_missing(dir.join("knowledge.yaml"), store::SAMPLE_KNOWLEDGE)?;
    Ok(())
}

fn write_if_missing(path: PathBuf, content: &str) -> Result<(), Box<dyn Error>> {
    if path.exists() {
        info!(path = %path.display(), "keeping existing file");
        return Ok(());
    }
    info!(path = %path.display(), "creating file");
    fs::write(path, content)?;
    Ok(())
}
