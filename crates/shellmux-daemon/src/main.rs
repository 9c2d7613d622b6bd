//! shellmux Daemon
//!
//! The daemon owns shell session subprocesses and serves the gRPC API that
//! editor frontends use to drive terminal panels over local socket or TCP.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use shellmux_core::config::{self, ShellConfig};
use shellmux_daemon::server::{GrpcServer, ServerConfig, ServerError};

#[derive(Parser, Debug)]
#[command(name = "shellmux-daemon")]
#[command(version, about = "shellmux daemon - terminal session backend")]
struct Args {
    /// TCP bind address (overrides the configured port)
    #[arg(long, env = "SHELLMUX_ADDR")]
    addr: Option<SocketAddr>,

    /// Unix socket path; takes precedence over TCP when set
    #[arg(long, env = "SHELLMUX_SOCKET")]
    socket: Option<PathBuf>,

    /// Shell binary for new sessions
    #[arg(long, env = "SHELLMUX_SHELL")]
    shell: Option<PathBuf>,

    /// Argument passed to the shell (repeatable)
    #[arg(long = "shell-arg")]
    shell_args: Vec<String>,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "SHELLMUX_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SHELLMUX_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("shellmux_daemon={}", args.log_level);
    shellmux_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let file_config = config::load_config(None)?;

    let shell = ShellConfig {
        program: args.shell.unwrap_or(file_config.shell.program),
        args: if args.shell_args.is_empty() {
            file_config.shell.args
        } else {
            args.shell_args
        },
    };

    let addr = args
        .addr
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], file_config.daemon.port)));
    let socket = args.socket.or(file_config.daemon.socket_path);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        shell = %shell.program.display(),
        %addr,
        socket = ?socket,
        "Starting shellmux-daemon"
    );

    #[cfg(unix)]
    let server_config = match socket {
        Some(path) => ServerConfig::unix(path),
        None => ServerConfig::tcp(addr),
    };
    #[cfg(not(unix))]
    let server_config = ServerConfig::tcp(addr);

    let server = GrpcServer::new(
        server_config.with_event_buffer(file_config.daemon.event_buffer),
        shell,
    );

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only). The
    // `true` parameter unsets $NOTIFY_SOCKET so shell subprocesses don't
    // accidentally notify systemd.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        result = serve(server) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Serve on the transport the config selects.
async fn serve(server: GrpcServer) -> Result<(), ServerError> {
    let config = server.config().clone();

    #[cfg(unix)]
    if let Some(path) = config.unix_socket {
        return server.serve_unix(path).await;
    }

    let addr = config
        .tcp_addr
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 50061)));
    server.serve_tcp(addr).await
}
