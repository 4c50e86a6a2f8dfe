//! ferrysyncd: the ferrysync server daemon.
//!
//! Usage:
//!   ferrysyncd [port] [--config ferrysync.toml]
//!
//! A bare positional `port` overrides the config file's `[server].port`,
//! per the protocol's `server [port]` CLI surface (§6).

mod daemon;
mod dispatcher;
mod download;
mod metrics;
mod state;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ferrysync_core::ServerConfig;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ferrysyncd", version, about = "ferrysync server daemon")]
struct Cli {
    /// Control endpoint UDP port; overrides the config file's value.
    port: Option<String>,

    /// Path to the daemon's TOML config file.
    #[arg(long, short = 'c', env = "FERRYSYNC_CONFIG", default_value = "ferrysync.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ServerConfig::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: loading config {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if let Some(port_str) = &cli.port {
        match port_str.parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => {
                eprintln!("error: invalid port '{port_str}'. Port must be a number.");
                return ExitCode::FAILURE;
            }
        }
    }

    init_logging(&config.server.log_level, &config.server.log_format);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: starting async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        root = %config.server.root.display(),
        "ferrysyncd starting"
    );

    match rt.block_on(daemon::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "ferrysyncd exited with error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}
