//! Rendezvous relay: entry point.
//!
//! Accepts WebSocket connections from clients that want to open a direct
//! peer-to-peer session, pairs them two by two, and relays their signaling
//! frames until one side disconnects.
//!
//! # Usage
//!
//! ```text
//! rendezvous-relay [OPTIONS]
//!
//! Options:
//!   --bind         <IP>    Address to listen on        [default: 0.0.0.0]
//!   --port         <PORT>  Port to listen on           [default: 9001]
//!   --path         <PATH>  WebSocket endpoint path     [default: /socket]
//!   --idle-timeout <SECS>  Per-connection idle timeout [default: 300, 0 disables]
//!   --record-file  <FILE>  Append pairings to this JSON-lines file
//!   --config       <FILE>  TOML file with any of the settings above
//! ```
//!
//! # Precedence
//!
//! Command-line flag, then environment variable, then config file, then the
//! built-in default.
//!
//! | Variable                  | Flag             |
//! |---------------------------|------------------|
//! | `RENDEZVOUS_BIND`         | `--bind`         |
//! | `PORT`                    | `--port`         |
//! | `RENDEZVOUS_PATH`         | `--path`         |
//! | `RENDEZVOUS_IDLE_TIMEOUT` | `--idle-timeout` |
//! | `RENDEZVOUS_RECORD_FILE`  | `--record-file`  |
//! | `RENDEZVOUS_CONFIG`       | `--config`       |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rendezvous_relay::application::{RendezvousService, SessionRecorder};
use rendezvous_relay::domain::config::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PATH, DEFAULT_PORT};
use rendezvous_relay::domain::ServerConfig;
use rendezvous_relay::infrastructure::{run_server, FileConfig, JsonLinesRecorder, LogRecorder};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Rendezvous relay for peer-to-peer signaling.
///
/// Every setting is optional here so that values from the config file can
/// fill whatever the command line and environment leave unset.
#[derive(Debug, Default, Parser)]
#[command(
    name = "rendezvous-relay",
    about = "Pairs WebSocket clients and relays their signaling frames",
    version
)]
struct Cli {
    /// IP address to bind the listener to.
    #[arg(long, env = "RENDEZVOUS_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Request path clients upgrade on.
    #[arg(long, env = "RENDEZVOUS_PATH")]
    path: Option<String>,

    /// Close connections idle for this many seconds (0 disables).
    #[arg(long = "idle-timeout", env = "RENDEZVOUS_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,

    /// Append one JSON line per pairing to this file.
    #[arg(long = "record-file", env = "RENDEZVOUS_RECORD_FILE")]
    record_file: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, env = "RENDEZVOUS_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file named by `--config`, if any.
    fn load_file_config(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }

    /// Merges the CLI values over `file` and the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not a valid IP address or the
    /// path does not start with `/`.
    fn into_server_config(self, file: FileConfig) -> anyhow::Result<ServerConfig> {
        let bind = self
            .bind
            .or(file.bind)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port = self.port.or(file.port).unwrap_or(DEFAULT_PORT);
        let bind_addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("invalid bind address: '{bind}:{port}'"))?;

        let path = self
            .path
            .or(file.path)
            .unwrap_or_else(|| DEFAULT_PATH.to_string());
        anyhow::ensure!(path.starts_with('/'), "WebSocket path must start with '/': '{path}'");

        let idle_secs = self
            .idle_timeout
            .or(file.idle_timeout_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);

        Ok(ServerConfig {
            bind_addr,
            path,
            idle_timeout: ServerConfig::idle_timeout_from_secs(idle_secs),
            record_file: self.record_file.or(file.record_file),
        })
    }
}

/// Picks the recorder backend for `config`.
fn build_recorder(config: &ServerConfig) -> Arc<dyn SessionRecorder> {
    match &config.record_file {
        Some(path) => {
            let recorder = JsonLinesRecorder::new(path);
            info!("recording pairings to {}", recorder.path().display());
            Arc::new(recorder)
        }
        None => Arc::new(LogRecorder),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` overrides the default `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = cli.load_file_config()?;
    let config = cli.into_server_config(file)?;

    info!(
        "rendezvous relay starting: bind={}, path={}, idle_timeout={:?}",
        config.bind_addr, config.path, config.idle_timeout
    );

    let service = Arc::new(RendezvousService::new(build_recorder(&config)));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, service, running).await?;

    info!("rendezvous relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
