//! Per-download ephemeral data endpoint (§4.6). Each accepted `DOWNLOAD`
//! spawns one of these on its own UDP port, independent of the control
//! dispatcher, so an in-flight upload never starves a download.
//!
//! The sequential `GET_CHUNK` dialect is the primary, supported dialect.
//! The legacy `FILE … GET START/END` dialect is parsed (ferrysync-wire)
//! but answered with `ERR_UNSUPPORTED_DIALECT` — an old client gets a
//! clear signal instead of silence, per the design notes' call to
//! document rather than half-implement both (§9).

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use ferrysync_transport::RetryPolicy;
use ferrysync_wire::{response, DownloadFrame};

use crate::metrics::Metrics;

const CHUNK_SIZE: usize = 1024;

/// Bind a fresh ephemeral port and spawn the worker task. Returns the
/// bound port immediately so the control dispatcher can reply with it
/// before the worker has served a single frame.
pub async fn spawn(
    file_path: PathBuf,
    name: String,
    policy: RetryPolicy,
    metrics: Metrics,
) -> io::Result<u16> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let port = socket.local_addr()?.port();

    tokio::spawn(async move {
        metrics.inc_active_downloads();
        if let Err(e) = run(socket, file_path, name, policy, &metrics).await {
            debug!(error = %e, "download worker ended");
        }
        metrics.dec_active_downloads();
    });

    Ok(port)
}

async fn run(
    socket: UdpSocket,
    file_path: PathBuf,
    name: String,
    policy: RetryPolicy,
    metrics: &Metrics,
) -> io::Result<()> {
    let idle = Duration::from_secs_f64(policy.timeout.as_secs_f64() * policy.max_attempts as f64);
    let mut buf = vec![0u8; 8192];

    // AWAIT_HANDSHAKE
    let (n, from) = match timeout(idle, socket.recv_from(&mut buf)).await {
        Ok(res) => res?,
        Err(_) => {
            debug!(%name, "download worker: handshake timed out, releasing port");
            return Ok(());
        }
    };
    match DownloadFrame::parse(&buf[..n]) {
        DownloadFrame::Handshake { name: requested } if requested == name => {
            socket
                .send_to(response::download_ready().as_bytes(), from)
                .await?;
        }
        other => {
            warn!(?other, "download worker: unexpected handshake, terminating");
            return Ok(());
        }
    }

    let mut file = File::open(&file_path).await?;
    let mut position: u64 = 0;

    // SERVING
    loop {
        let (n, from) = match timeout(idle, socket.recv_from(&mut buf)).await {
            Ok(res) => res?,
            Err(_) => {
                debug!(%name, "download worker: idle timeout, terminating");
                return Ok(());
            }
        };

        match DownloadFrame::parse(&buf[..n]) {
            DownloadFrame::GetChunk => {
                let mut chunk = vec![0u8; CHUNK_SIZE];
                let read = file.read(&mut chunk).await?;
                if read == 0 {
                    socket
                        .send_to(response::transfer_complete().as_bytes(), from)
                        .await?;
                    info!(%name, bytes = position, "download complete");
                    return Ok(());
                }
                chunk.truncate(read);
                position += read as u64;
                metrics.add_bytes(read as u64);
                socket
                    .send_to(response::data_chunk(&chunk).as_bytes(), from)
                    .await?;
            }
            DownloadFrame::LegacyRange { .. } | DownloadFrame::LegacyClose { .. } => {
                socket
                    .send_to(response::err_unsupported_dialect().as_bytes(), from)
                    .await?;
                return Ok(());
            }
            other => {
                warn!(?other, "download worker: unexpected frame, terminating");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrysync_wire::encoding::decode_chunk;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn serves_a_small_file_chunk_by_chunk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, vec![7u8; 3000]).unwrap();

        let metrics = Metrics::new();
        let policy = RetryPolicy::from_secs(0.5, 3);
        let port = spawn(path.clone(), "a.bin".to_string(), policy, metrics)
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        client
            .send_to(b"DOWNLOAD a.bin", server_addr)
            .await
            .unwrap();
        let mut buf = [0u8; 8192];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], response::download_ready().as_bytes());

        let mut received = Vec::new();
        loop {
            client.send_to(b"GET_CHUNK", server_addr).await.unwrap();
            let (n, _) = client.recv_from(&mut buf).await.unwrap();
            let text = String::from_utf8_lossy(&buf[..n]);
            if text == "TRANSFER_COMPLETE" {
                break;
            }
            let encoded = text.strip_prefix("DATA ").unwrap();
            received.extend(decode_chunk(encoded).unwrap());
        }

        assert_eq!(received, vec![7u8; 3000]);
    }

    #[tokio::test]
    async fn legacy_dialect_gets_unsupported_reply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, b"hi").unwrap();

        let metrics = Metrics::new();
        let policy = RetryPolicy::from_secs(0.5, 3);
        let port = spawn(path, "a.bin".to_string(), policy, metrics)
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        client
            .send_to(b"DOWNLOAD a.bin", server_addr)
            .await
            .unwrap();
        let mut buf = [0u8; 8192];
        client.recv_from(&mut buf).await.unwrap();

        client
            .send_to(b"FILE a.bin GET START 0 END 1", server_addr)
            .await
            .unwrap();
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ERR_UNSUPPORTED_DIALECT");
    }
}
