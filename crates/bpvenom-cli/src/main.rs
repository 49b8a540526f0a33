//! buildpacks-venom CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "bpvenom")]
#[command(about = "Run pack and random-image-name test steps", long_about = None)]
struct Cli {
    /// Log at debug level when RUST_LOG is not set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every step in a step file
    Run {
        /// Path to the step file
        #[arg(default_value = "steps.kdl")]
        path: String,
        /// Directory pack runs in (defaults to the step file's directory)
        #[arg(long, env = "BPVENOM_WORKDIR")]
        workdir: Option<PathBuf>,
    },
    /// Validate a step file without running it
    Validate {
        /// Path to the step file
        #[arg(default_value = "steps.kdl")]
        path: String,
    },
    /// List the registered executors
    Executors,
    /// Print a freshly generated image name
    ImageName,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { path, workdir } => {
            commands::run::run_file(&path, workdir).await?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Executors => {
            commands::executors();
        }
        Commands::ImageName => {
            commands::image_name();
        }
    }

    Ok(())
}
