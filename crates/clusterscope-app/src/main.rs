mod server;
mod websocket;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use clusterscope_config::EngineConfig;
use clusterscope_core::{ClusterManager, KubeconfigSources};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clusterscope")]
#[command(about = "Live multi-cluster Kubernetes state engine")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `clusterscope_core=debug`; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine and serve the HTTP/WebSocket API
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// List discovered kubeconfig contexts
    Contexts,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config file
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load(),
    };

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Contexts => {
            print_contexts(&config);
            Ok(())
        }
        Command::Config { action: ConfigAction::Init } => {
            let path = EngineConfig::init_default()?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }
    }
}

async fn serve(config: EngineConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let sources = KubeconfigSources::from_env(&config.discovery.extra_kubeconfigs);
    let (manager, report) = ClusterManager::load(config, sources).await?;
    info!(
        contexts = report.added.len(),
        failed = report.failed.len(),
        "Initial discovery complete"
    );
    for (context, error) in &report.failed {
        warn!(context = %context, error = %error, "Context skipped");
    }

    server::serve(Arc::new(manager), &bind).await
}

fn print_contexts(config: &EngineConfig) {
    let sources = KubeconfigSources::from_env(&config.discovery.extra_kubeconfigs);
    let contexts = sources.discover();
    if contexts.is_empty() {
        println!("No kubeconfig contexts found");
        return;
    }

    let width = contexts.iter().map(|c| c.name.len()).max().unwrap_or(0).max("CONTEXT".len());
    println!("{:<width$}  {:<14}  {:<30}  SOURCE", "CONTEXT", "PROVIDER", "SERVER");
    for context in contexts {
        println!(
            "{:<width$}  {:<14}  {:<30}  {}",
            context.name,
            context.provider.to_string(),
            context.server.as_deref().unwrap_or("-"),
            context.source.display(),
        );
    }
}
