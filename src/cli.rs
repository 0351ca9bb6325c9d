use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;
use tracing::info;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "mock-builder")]
#[command(about = "Generates test doubles from PHP classes, interfaces and traits")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default mock-builder.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Generate doubles for the configured source roots
    Build {
        /// Source root to scan (repeatable, replaces the configured roots)
        #[arg(short, long = "base")]
        base: Vec<PathBuf>,

        /// Output directory for the doubles
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Only emit declarations whose name contains one of these
        #[arg(short, long, value_delimiter = ',')]
        filter: Vec<String>,

        /// Rescan sources even when a graph cache exists
        #[arg(long)]
        force: bool,

        /// Directory for entity graph snapshots
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// PHP version the doubles must run on
        #[arg(long)]
        php_version: Option<String>,

        /// Log every processed declaration
        #[arg(long)]
        progress: bool,
    },

    /// Print declarations in processing order
    Graph {
        /// Source root to scan (repeatable, replaces the configured roots)
        #[arg(short, long = "base")]
        base: Vec<PathBuf>,

        /// Rescan sources even when a graph cache exists
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                engine.init(path)?;
                Ok(())
            }
            Commands::Build {
                base,
                target,
                filter,
                force,
                cache_dir,
                php_version,
                progress,
            } => {
                let config = engine.config_mut();
                if !base.is_empty() {
                    config.base_paths = base;
                }
                if let Some(target) = target {
                    config.target_path = target;
                }
                if !filter.is_empty() {
                    config.class_name_filter = filter;
                }
                if cache_dir.is_some() {
                    config.cache_dir = cache_dir;
                }
                if let Some(version) = php_version {
                    config.target_php_version = version;
                }
                config.display_progress |= progress;
                config.validate()?;

                let summary = engine.build(force)?;
                info!("Wrote {} file(s)", summary.written.len());
                Ok(())
            }
            Commands::Graph { base, force } => {
                if !base.is_empty() {
                    engine.config_mut().base_paths = base;
                }
                for (kind, name) in engine.graph_order(force)? {
                    println!("{} {}", kind.keyword(), name);
                }
                Ok(())
            }
        }
    }
}
