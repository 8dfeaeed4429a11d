//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from CLI arguments, environment variables and an
//! optional TOML file; tests build it directly or use the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9001;
/// Default WebSocket endpoint path.
pub const DEFAULT_PATH: &str = "/socket";
/// Default per-connection idle timeout, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// All runtime configuration for the rendezvous relay.
///
/// # Example
///
/// ```rust
/// use rendezvous_relay::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 9001);
/// assert_eq!(cfg.path, "/socket");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address and port the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Request path clients must upgrade on.  Other paths get HTTP 404.
    pub path: String,

    /// Close a connection that has not sent any frame for this long.
    ///
    /// `None` disables the timeout.  Waiting for a peer is not activity, so a
    /// client that wants to wait longer must keep its socket alive with
    /// WebSocket pings.
    pub idle_timeout: Option<Duration>,

    /// Append pairing records to this JSON-lines file.  When `None` pairings
    /// are only written to the log.
    pub record_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Maps the "0 disables" convention used by the CLI and config file.
    pub fn idle_timeout_from_secs(secs: u64) -> Option<Duration> {
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

impl Default for ServerConfig {
    /// | Field          | Default        |
    /// |----------------|----------------|
    /// | bind_addr      | `0.0.0.0:9001` |
    /// | path           | `/socket`      |
    /// | idle_timeout   | 300 seconds    |
    /// | record_file    | none           |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            path: DEFAULT_PATH.to_string(),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            record_file: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_9001() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 9001);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_default_path_and_timeout() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.path, "/socket");
        assert_eq!(cfg.idle_timeout, Some(Duration::from_secs(300)));
        assert!(cfg.record_file.is_none());
    }

    #[test]
    fn test_zero_idle_timeout_disables() {
        assert_eq!(ServerConfig::idle_timeout_from_secs(0), None);
        assert_eq!(
            ServerConfig::idle_timeout_from_secs(30),
            Some(Duration::from_secs(30))
        );
    }
}
