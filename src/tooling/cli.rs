//! CLI Tooling
//!
//! Command-line surfaces for the participant (`collab serve|receive NAME`)
//! and for the coordination service (`collab-server`).

use crate::config::{CollabConfig, ConfigLoader};
use crate::error::SyncError;
use crate::logging::{init_logging, LoggingConfig};
use crate::server::CoordinationServer;
use crate::sync::SyncSession;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;

/// Logging flags shared by both binaries
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Enable verbose logging (debug level)
    #[arg(long, short = 'v', default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl LogArgs {
    /// Layer the flags over the configured logging settings.
    pub fn apply(&self, logging: &mut LoggingConfig) {
        if self.verbose {
            logging.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
    }
}

fn load_config(path: Option<&Path>, log: &LogArgs) -> Result<CollabConfig, SyncError> {
    let mut config = ConfigLoader::load(path)?;
    log.apply(&mut config.logging);
    Ok(config)
}

/// Collab - live shared directories
#[derive(Parser, Debug)]
#[command(name = "collab")]
#[command(about = "Share a directory live, or receive one that is being shared")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory to share or receive into
    #[arg(long, short = 'C', default_value = ".")]
    pub dir: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Coordination service URL (overrides COLLAB_HOST and config)
    #[arg(long)]
    pub host: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Share the directory under NAME
    Serve {
        /// Share name
        name: String,
    },
    /// Download the live share NAME into an empty directory and follow it
    Receive {
        /// Share name
        name: String,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<CollabConfig, SyncError> {
        let mut config = load_config(self.config.as_deref(), &self.log)?;
        if let Some(host) = &self.host {
            config.coordinator.url = host.clone();
        }
        Ok(config)
    }

    pub async fn execute(self) -> Result<(), SyncError> {
        let config = self.load_config()?;
        init_logging(Some(&config.logging))?;
        info!(coordinator = %config.coordinator.url, dir = %self.dir.display(), "Starting");

        match self.command {
            Commands::Serve { name } => {
                SyncSession::new(config, name, &self.dir)?.serve().await
            }
            Commands::Receive { name } => {
                SyncSession::new(config, name, &self.dir)?.receive().await
            }
        }
    }
}

/// User-facing text for a session-ending error.
pub fn describe_error(err: &SyncError) -> String {
    match err {
        SyncError::Conflict(name) => format!("share name {:?} is already in use", name),
        SyncError::NotFound(what) => format!("{} is not being shared", what),
        SyncError::NotEmpty(dir) => format!("refusing to receive into non-empty directory {}", dir),
        other => other.to_string(),
    }
}

/// Collab coordination service
#[derive(Parser, Debug)]
#[command(name = "collab-server")]
#[command(about = "Chunk store, directory registry and event relay for collab")]
pub struct ServerCli {
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Chunk storage directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

impl ServerCli {
    pub fn load_config(&self) -> Result<CollabConfig, SyncError> {
        let mut config = load_config(self.config.as_deref(), &self.log)?;
        if let Some(bind) = self.bind {
            config.server.bind_addr = bind;
        }
        if let Some(dir) = &self.data_dir {
            config.server.data_dir = Some(dir.clone());
        }
        Ok(config)
    }

    pub async fn execute(self) -> anyhow::Result<()> {
        let config = self.load_config()?;
        init_logging(Some(&config.logging))?;

        let server = CoordinationServer::open(config.server.clone())
            .await
            .context("failed to open chunk store")?;
        server
            .serve()
            .await
            .with_context(|| format!("failed to serve on {}", config.server.bind_addr))
    }
}
