use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bucketcrew::adapters::anthropic::AnthropicInvoker;
use bucketcrew::adapters::retrieval::StaticRetriever;
use bucketcrew::config::Config;
use bucketcrew::server;
use bucketcrew::store::{MemoryDeliverableStore, MemoryRunStore};
use bucketcrew::templates::TemplateCatalog;

#[derive(Parser)]
#[command(name = "bucketcrew", version, about = "Multi-agent consulting workflow engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve {
        /// Port to listen on. Overrides PORT.
        #[arg(long)]
        port: Option<u16>,
        /// Extra workflow templates to merge over the built-in catalog.
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Print the built-in workflow templates as JSON.
    Templates,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { port, templates } => serve(port, templates).await,
        Commands::Templates => {
            let catalog = TemplateCatalog::builtin();
            println!("{}", serde_json::to_string_pretty(catalog.list())?);
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>, templates: Option<PathBuf>) -> Result<()> {
    let config = Config::from_env();
    let api_key =
        std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY must be set to serve")?;

    let catalog = Arc::new(match templates {
        Some(path) => TemplateCatalog::with_yaml_file(&path)?,
        None => TemplateCatalog::builtin(),
    });
    let router = server::build(
        &config,
        catalog,
        MemoryRunStore::shared(),
        MemoryDeliverableStore::shared(),
        Arc::new(AnthropicInvoker::new(api_key, config.model.clone())),
        Arc::new(StaticRetriever::new()),
    );
    server::serve(router, port.unwrap_or(config.server.port)).await
}
