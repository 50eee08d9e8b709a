//! cimq CLI
//!
//! Runs instrumentation queries from the command line, either over a connection or
//! through the concurrent dispatcher.

use std::path::PathBuf;
use std::sync::Arc;

use cimq_exec::{Backend, MemoryBackend};
use cimq_query::{Engine, Namespace};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::OutputFormat;
use config::{Config, LogConfig};

#[derive(Parser)]
#[command(name = "cimq")]
#[command(about = "Query system instrumentation namespaces", long_about = None)]
struct Cli {
    /// Config file (defaults to $CIMQ_CONFIG, ./cimq.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve results from a JSON fixture file instead of the native subsystem
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query over a connection
    #[command(name = "query")]
    Query {
        /// Namespace to connect to
        #[arg(short, long)]
        namespace: Option<String>,
        /// Pretty-print the JSON result
        #[arg(long, conflicts_with = "structured")]
        pretty: bool,
        /// Print the decoded result set instead of JSON
        #[arg(long)]
        structured: bool,
        /// Query text
        text: String,
    },
    /// Dispatch several queries concurrently
    #[command(name = "dispatch")]
    Dispatch {
        /// Namespace every query runs against
        #[arg(short, long)]
        namespace: Option<String>,
        /// Query texts
        #[arg(required = true)]
        queries: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_default()?,
    };
    init_tracing(&config.log);

    let backend = select_backend(cli.fixture.as_ref().or(config.fixture.as_ref()))?;
    info!(backend = backend.name(), "backend selected");
    let engine = Engine::new(backend, config.engine.clone())?;

    match cli.command {
        Commands::Query {
            namespace,
            pretty,
            structured,
            text,
        } => {
            let namespace = resolve_namespace(namespace, &config)?;
            let format = if structured {
                OutputFormat::Structured
            } else if pretty {
                OutputFormat::Pretty
            } else {
                OutputFormat::Compact
            };
            println!("{}", commands::query(&engine, namespace, text, format).await?);
        }
        Commands::Dispatch { namespace, queries } => {
            let namespace = resolve_namespace(namespace, &config)?;
            for line in commands::dispatch(&engine, &namespace, &queries).await {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_namespace(namespace: Option<String>, config: &Config) -> Result<Namespace> {
    let path = namespace.unwrap_or_else(|| config.default_namespace.clone());
    Ok(Namespace::new(path)?)
}

fn select_backend(fixture: Option<&PathBuf>) -> Result<Arc<dyn Backend>> {
    if let Some(path) = fixture {
        let backend = MemoryBackend::from_path(path)
            .wrap_err_with(|| format!("failed to load fixture {}", path.display()))?;
        return Ok(Arc::new(backend));
    }

    native_backend()
}

#[cfg(target_os = "windows")]
fn native_backend() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(cimq_exec::WmiBackend::new()))
}

#[cfg(not(target_os = "windows"))]
fn native_backend() -> Result<Arc<dyn Backend>> {
    color_eyre::eyre::bail!("no native instrumentation backend on this platform; pass --fixture or set `fixture` in the config")
}
