//! Daemon startup: bind the control endpoint, establish the confinement
//! root, optionally start the metrics HTTP server, and hand off to the
//! dispatcher loop.

use std::io;

use tokio::net::UdpSocket;
use tracing::info;

use ferrysync_core::{Confinement, ServerConfig};
use ferrysync_transport::RetryPolicy;

use crate::dispatcher;
use crate::metrics::{self, Metrics};
use crate::state::DispatcherState;

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.server.root)
        .map_err(|e| anyhow::anyhow!("creating root {}: {e}", config.server.root.display()))?;
    let confinement = Confinement::new(&config.server.root)
        .map_err(|e| anyhow::anyhow!("confining root {}: {e}", config.server.root.display()))?;

    let bind_addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let socket = UdpSocket::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding control endpoint {bind_addr}: {e}"))?;
    info!(addr = %bind_addr, root = %confinement.root().display(), "control endpoint bound");

    let metrics = Metrics::new();
    if let Some(metrics_addr) = config.server.metrics_addr.clone() {
        let metrics_for_server = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(metrics_addr, metrics_for_server).await {
                tracing::error!(error = %e, "metrics server exited");
            }
        });
    } else {
        info!("metrics server disabled (no server.metrics_addr configured)");
    }

    let download_retry =
        RetryPolicy::from_secs(config.transport.timeout_secs, config.transport.max_attempts);
    let state = DispatcherState::new(config, metrics);

    dispatcher::run(socket, confinement, state, download_retry).await?;
    Ok(())
}

/// Used by tests that want a bound-and-running daemon on an ephemeral
/// port without a config file on disk.
#[cfg(test)]
pub async fn run_for_test(mut config: ServerConfig) -> io::Result<std::net::SocketAddr> {
    config.server.port = 0;
    config.server.metrics_addr = None;
    std::fs::create_dir_all(&config.server.root)?;
    let confinement = Confinement::new(&config.server.root)?;

    let bind_addr = format!("{}:0", config.server.bind_addr);
    let socket = UdpSocket::bind(&bind_addr).await?;
    let local_addr = socket.local_addr()?;

    let download_retry =
        RetryPolicy::from_secs(config.transport.timeout_secs, config.transport.max_attempts);
    let metrics = Metrics::new();
    let state = DispatcherState::new(config, metrics);

    tokio::spawn(async move {
        if let Err(e) = dispatcher::run(socket, confinement, state, download_retry).await {
            tracing::error!(error = %e, "test daemon exited");
        }
    });

    Ok(local_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrysync_wire::response;
    use tempfile::tempdir;

    #[tokio::test]
    async fn list_files_round_trip_on_a_live_socket() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut config = ServerConfig::default();
        config.server.root = dir.path().to_path_buf();

        let server_addr = run_for_test(config).await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"LIST_FILES", server_addr).await.unwrap();

        let mut buf = [0u8; 8192];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            &buf[..n],
            response::ok_list(&[], &["a.txt".to_string()]).as_bytes()
        );
    }

    #[tokio::test]
    async fn unknown_verb_gets_err_unknown_command() {
        let dir = tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.server.root = dir.path().to_path_buf();

        let server_addr = run_for_test(config).await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"FROBNICATE", server_addr).await.unwrap();

        let mut buf = [0u8; 8192];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ERR_UNKNOWN_COMMAND");
    }

    #[tokio::test]
    async fn cd_into_subdir_and_back() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let mut config = ServerConfig::default();
        config.server.root = dir.path().to_path_buf();

        let server_addr = run_for_test(config).await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 8192];

        client.send_to(b"CD sub", server_addr).await.unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"CD_OK Now in /sub");

        client.send_to(b"CD ..", server_addr).await.unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"CD_OK Now in /");
    }
}
