//! emuctl server: entry point.
//!
//! Runs the control socket in front of the in-memory [`SimulatedHost`], which
//! is how the protocol is exercised without an emulator attached.  An
//! emulator embeds the `emuctl_server` library instead and supplies its own
//! [`HostControl`](emuctl_server::application::host::HostControl) adapter.
//!
//! # Usage
//!
//! ```text
//! emuctl-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Config file [default: platform config dir]
//!   --socket <PATH>        Control socket path (overrides the config file)
//!   --max-clients <N>      Client limit (overrides the config file)
//!   --init-config          Write the default config file and exit
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Description                          |
//! |-----------------------|--------------------------------------|
//! | `EMUCTL_CONFIG`       | Config file path                     |
//! | `EMUCTL_SOCKET`       | Control socket path                  |
//! | `EMUCTL_MAX_CLIENTS`  | Client limit                         |
//! | `RUST_LOG`            | `tracing` filter; beats `log_level`  |
//!
//! Talk to it with any line-oriented Unix socket client:
//!
//! ```text
//! $ socat - UNIX-CONNECT:$XDG_RUNTIME_DIR/emuctl.sock
//! version
//! OK emuctl-sim 0.1.0
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use emuctl_server::application::host::HostControl;
use emuctl_server::infrastructure::host::SimulatedHost;
use emuctl_server::infrastructure::socket::ControlSocket;
use emuctl_server::infrastructure::storage::config::{
    config_file_path, load_config, load_config_from, save_config_to, AppConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Unix-socket control channel for an emulator host.
#[derive(Debug, Parser)]
#[command(
    name = "emuctl-server",
    about = "Line-oriented Unix socket control channel for an emulator host",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    ///
    /// Defaults to `emuctl/config.toml` under the platform config directory.
    /// A missing file means "use the built-in defaults".
    #[arg(long, env = "EMUCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Filesystem path of the control socket.
    #[arg(long, env = "EMUCTL_SOCKET")]
    socket: Option<PathBuf>,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "EMUCTL_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config_file_path().context("cannot locate the config directory"),
        }
    }

    /// Loads the config file and applies command-line overrides.
    fn load(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(socket) = &self.socket {
            config.control.socket_path = socket.clone();
        }
        if let Some(max_clients) = self.max_clients {
            config.control.max_clients = max_clients;
        }
        config.validate().context("invalid command-line override")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. CLI arguments are parsed and the config file is loaded.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured `log_level`.
/// 3. The control socket is started in front of a [`SimulatedHost`].
/// 4. The process waits for Ctrl+C or for a client's `exit` command, then
///    stops the socket, which closes every client and removes the socket file.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init_config {
        let path = cli.config_path()?;
        save_config_to(&AppConfig::default(), &path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote default config to {}", path.display());
        return Ok(());
    }

    let config = cli.load()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    let settings = config.server_settings();
    let host = Arc::new(SimulatedHost::new(
        config.devices.clone(),
        settings.dispatch.monitors,
    ));

    let control: Arc<dyn HostControl> = Arc::clone(&host) as Arc<dyn HostControl>;
    let socket = ControlSocket::start(settings, control)
        .context("failed to start control socket")?;
    info!(path = %socket.socket_path().display(), "emuctl server started");

    // ── Wait for shutdown ─────────────────────────────────────────────────────
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => warn!("failed to listen for Ctrl+C signal: {e}"),
        },
        () = host.wait_for_power_off() => info!("host powered off, shutting down"),
    }

    socket.stop().await;
    info!("emuctl server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_have_no_overrides() {
        // Arrange / Act
        let cli = Cli::parse_from(["emuctl-server"]);

        // Assert
        assert!(!cli.init_config);
    }

    #[test]
    fn test_cli_overrides_are_applied() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("emuctl_cli_{}", uuid::Uuid::new_v4()));
        let cli = Cli::parse_from([
            "emuctl-server",
            "--config",
            dir.join("missing.toml").to_str().expect("utf-8 temp dir"),
            "--socket",
            "/tmp/override.sock",
            "--max-clients",
            "3",
        ]);

        // Act
        let config = cli.load().expect("defaults load");

        // Assert
        assert_eq!(config.control.socket_path, PathBuf::from("/tmp/override.sock"));
        assert_eq!(config.control.max_clients, 3);
    }

    #[test]
    fn test_zero_max_clients_override_is_rejected() {
        let dir = std::env::temp_dir().join(format!("emuctl_cli_{}", uuid::Uuid::new_v4()));
        let cli = Cli::parse_from([
            "emuctl-server",
            "--config",
            dir.join("missing.toml").to_str().expect("utf-8 temp dir"),
            "--max-clients",
            "0",
        ]);

        assert!(cli.load().is_err());
    }
}
