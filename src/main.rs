//! Lattice CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(about = "Live bazel C/C++ dependency graph server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Bazel workspace root (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse the workspace and serve the interactive graph
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7878")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Run one analysis pass and print a summary
    Analyze,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "lattice={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lattice v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Workspace root: {}", cli.workspace.display());

    match cli.command {
        Commands::Serve { port, host } => commands::serve(cli.workspace, host, port).await,
        Commands::Analyze => commands::analyze(cli.workspace).await,
        Commands::Version => {
            println!("Lattice v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
