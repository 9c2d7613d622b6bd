//! Configuration resolution for shellmux.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/shellmux/settings.json)
//! 3. Project config (.shellmux/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the daemon binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete shellmux configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub shell: ShellConfig,
}

/// Daemon-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// TCP port for the gRPC server.
    pub port: u16,
    /// Unix socket path; takes precedence over TCP when set.
    pub socket_path: Option<PathBuf>,
    pub log_level: String,
    /// Capacity of the outbound event broadcast buffer. A subscriber that
    /// falls more than this many events behind loses the oldest ones.
    pub event_buffer: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: 50061,
            socket_path: None,
            log_level: "info".to_string(),
            event_buffer: 256,
        }
    }
}

/// Shell invocation for new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Shell binary to spawn.
    pub program: PathBuf,
    /// Arguments passed to the shell.
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("bash"),
            args: vec!["--login".to_string(), "-i".to_string()],
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".shellmux").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".shellmux").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/shellmux/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
            .map(|p| p.join("shellmux").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.daemon.socket_path.is_some() {
        base.daemon.socket_path = overlay.daemon.socket_path;
    }
    base.daemon.port = overlay.daemon.port;
    base.daemon.log_level = overlay.daemon.log_level;
    base.daemon.event_buffer = overlay.daemon.event_buffer;

    base.shell = overlay.shell;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("SHELLMUX_PORT")
        && let Ok(n) = val.parse()
    {
        config.daemon.port = n;
    }
    if let Ok(val) = std::env::var("SHELLMUX_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Ok(val) = std::env::var("SHELLMUX_SHELL") {
        config.shell.program = PathBuf::from(val);
    }
}
