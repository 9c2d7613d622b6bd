//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address (if using TCP transport).
    pub tcp_addr: Option<SocketAddr>,

    /// Unix socket path (if using Unix transport).
    pub unix_socket: Option<PathBuf>,

    /// Outbound event broadcast buffer capacity per subscriber.
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_addr: Some(SocketAddr::from(([127, 0, 0, 1], 50061))),
            unix_socket: None,
            event_buffer: 256,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with TCP transport.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self {
            tcp_addr: Some(addr),
            unix_socket: None,
            ..Default::default()
        }
    }

    /// Create a new server config with Unix socket transport.
    #[cfg(unix)]
    pub fn unix(path: PathBuf) -> Self {
        Self {
            tcp_addr: None,
            unix_socket: Some(path),
            ..Default::default()
        }
    }

    /// Set the event broadcast buffer capacity.
    #[must_use]
    pub const fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.tcp_addr.is_some());
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn tcp_config() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().expect("valid addr");
        let config = ServerConfig::tcp(addr);
        assert_eq!(config.tcp_addr, Some(addr));
        assert!(config.unix_socket.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn unix_config() {
        let config = ServerConfig::unix(PathBuf::from("/tmp/shellmux.sock"));
        assert!(config.tcp_addr.is_none());
        assert_eq!(
            config.unix_socket,
            Some(PathBuf::from("/tmp/shellmux.sock"))
        );
    }
}
