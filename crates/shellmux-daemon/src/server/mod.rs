//! gRPC server for the shellmux daemon.
//!
//! Provides local socket and TCP server implementations.

mod config;
mod terminal_svc;

pub use config::ServerConfig;
pub use terminal_svc::TerminalServiceImpl;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tonic::transport::Server;
use tracing::info;

use shellmux_core::EventSink;
use shellmux_core::config::ShellConfig;
use shellmux_proto::v1::terminal_service_server::TerminalServiceServer;

use crate::registry::SessionRegistry;
use crate::router::{BroadcastSink, EventRouter};

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// gRPC server handle.
pub struct GrpcServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    events: Arc<BroadcastSink>,
}

impl GrpcServer {
    /// Create a new gRPC server with registry and router wired together.
    pub fn new(config: ServerConfig, shell: ShellConfig) -> Self {
        let events = Arc::new(BroadcastSink::new(config.event_buffer));
        let sink: Arc<dyn EventSink> = Arc::clone(&events) as Arc<dyn EventSink>;
        let registry = Arc::new(SessionRegistry::new(shell, EventRouter::new(sink)));

        Self {
            config,
            registry,
            events,
        }
    }

    /// Start serving on TCP socket.
    pub async fn serve_tcp(self, addr: SocketAddr) -> Result<(), ServerError> {
        let terminal_service =
            TerminalServiceImpl::new(Arc::clone(&self.registry), Arc::clone(&self.events));

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<TerminalServiceServer<TerminalServiceImpl>>()
            .await;

        info!(%addr, "Starting gRPC server on TCP");

        Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(30)))
            .http2_keepalive_timeout(Some(Duration::from_secs(10)))
            .add_service(TerminalServiceServer::new(terminal_service))
            .add_service(health_service)
            .serve(addr)
            .await?;

        Ok(())
    }

    /// Start serving on Unix socket (non-Windows).
    #[cfg(unix)]
    pub async fn serve_unix(self, path: std::path::PathBuf) -> Result<(), ServerError> {
        use tokio::net::UnixListener;
        use tokio_stream::wrappers::UnixListenerStream;

        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&path)?;
        let stream = UnixListenerStream::new(listener);

        let terminal_service =
            TerminalServiceImpl::new(Arc::clone(&self.registry), Arc::clone(&self.events));

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<TerminalServiceServer<TerminalServiceImpl>>()
            .await;

        info!(path = %path.display(), "Starting gRPC server on Unix socket");

        Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(30)))
            .http2_keepalive_timeout(Some(Duration::from_secs(10)))
            .add_service(TerminalServiceServer::new(terminal_service))
            .add_service(health_service)
            .serve_with_incoming(stream)
            .await?;

        Ok(())
    }

    /// Get the server configuration.
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the session registry.
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get a reference to the broadcast sink feeding `Subscribe` streams.
    pub const fn events(&self) -> &Arc<BroadcastSink> {
        &self.events
    }
}
