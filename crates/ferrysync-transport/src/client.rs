use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use ferrysync_core::types::MAX_DATAGRAM;

use crate::TransportError;

/// `T` (per-attempt timeout) and `N` (total attempts, including the
/// first send) from §4.1. Defaults mirror `ServerConfig::transport`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(1.0),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    pub fn from_secs(timeout_secs: f64, max_attempts: u32) -> Self {
        Self {
            timeout: Duration::from_secs_f64(timeout_secs),
            max_attempts,
        }
    }
}

/// Send `payload` to `dest` and wait for a reply, retransmitting on
/// timeout. The first datagram received from any address is treated as
/// the reply, per the "no sequence number" contract in §4.1.
pub async fn send_and_receive(
    socket: &UdpSocket,
    payload: &[u8],
    dest: SocketAddr,
    policy: RetryPolicy,
) -> Result<(Vec<u8>, SocketAddr), TransportError> {
    if payload.len() > MAX_DATAGRAM {
        return Err(TransportError::TooLarge {
            len: payload.len(),
            max: MAX_DATAGRAM,
        });
    }

    let mut buf = vec![0u8; MAX_DATAGRAM];
    for attempt in 1..=policy.max_attempts {
        socket.send_to(payload, dest).await?;
        match timeout(policy.timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => return Ok((buf[..n].to_vec(), from)),
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_elapsed) => {
                debug!(attempt, max = policy.max_attempts, "transport: timed out, retrying");
            }
        }
    }
    Err(TransportError::Exhausted {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrip_on_first_reply() {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let echo = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..n], from).await.unwrap();
        });

        let policy = RetryPolicy::from_secs(0.2, 3);
        let (reply, _from) = send_and_receive(&client, b"PING", server_addr, policy)
            .await
            .unwrap();
        assert_eq!(reply, b"PING");
        echo.await.unwrap();
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Bind a socket that never replies, just to have a live destination.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = silent.local_addr().unwrap();

        let policy = RetryPolicy::from_secs(0.05, 2);
        let result = send_and_receive(&client, b"PING", dest, policy).await;
        assert!(matches!(result, Err(TransportError::Exhausted { attempts: 2 })));
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let big = vec![0u8; MAX_DATAGRAM + 1];
        let result = send_and_receive(&client, &big, dest, RetryPolicy::default()).await;
        assert!(matches!(result, Err(TransportError::TooLarge { .. })));
    }
}
