//! ferrysync: the ferrysync interactive client.
//!
//! Usage: `ferrysync [host] [port]`. Connects to a ferrysyncd control
//! endpoint and drops into the interactive command loop (§6): `cd`,
//! `upload`, `supload`, `all`, `<filename>`, `kill`, `sync
//! list|add|remove|run|auto`, empty line to exit.

mod commands;
mod config;
mod net;
mod repl;
mod sync;

use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;

use clap::Parser;
use ferrysync_transport::RetryPolicy;
use tracing::error;

use net::Control;

#[derive(Parser, Debug)]
#[command(name = "ferrysync", version, about = "ferrysync interactive client")]
struct Cli {
    /// Server hostname or address.
    #[arg(default_value = "127.0.0.1")]
    host: String,

    /// Server control-endpoint UDP port.
    #[arg(default_value_t = 51234)]
    port: u16,

    /// Per-attempt transport timeout, in seconds (§4.1's `T`).
    #[arg(long, default_value_t = 1.0)]
    timeout_secs: f64,

    /// Total transport attempts, including the first send (§4.1's `N`).
    #[arg(long, default_value_t = 5)]
    attempts: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    let server_addr = match resolve(&cli.host, cli.port) {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("error: resolving {}:{}: {e}", cli.host, cli.port);
            return ExitCode::FAILURE;
        }
    };

    let policy = RetryPolicy::from_secs(cli.timeout_secs, cli.attempts);

    let control = match Control::connect(server_addr, policy).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: opening client socket: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Connected to ferrysyncd at {server_addr}");

    if let Err(e) = repl::run(control, policy).await {
        error!(error = %e, "client session ended with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn resolve(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address found"))
}
