//! Ferrule CLI - build pipeline for typed web front-ends.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "ferrule")]
#[command(about = "Build pipeline for typed web front-ends")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to ferrule.toml config file, relative to the project root
    #[arg(short, long, default_value = "ferrule.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transpile, stage and bundle the project
    Build {
        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Skip minification of the output stylesheet
        #[arg(long)]
        no_minify: bool,
    },

    /// Remove the staging tree, the outputs and the compile cache
    Clean {
        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    // Execute command
    match cli.command {
        Commands::Build { root, no_minify } => {
            let minify = if no_minify { Some(false) } else { None };
            commands::build::run(root, cli.config, minify).await?;
        }
        Commands::Clean { root } => {
            commands::clean::run(root, cli.config).await?;
        }
    }

    Ok(())
}
