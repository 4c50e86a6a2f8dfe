//! Thin control-channel wrapper around the stop-and-wait transport, used
//! by every command handler to exchange one frame with the server.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use ferrysync_transport::{send_and_receive, RetryPolicy};

pub struct Control {
    socket: UdpSocket,
    pub server_addr: SocketAddr,
    policy: RetryPolicy,
}

impl Control {
    pub async fn connect(server_addr: SocketAddr, policy: RetryPolicy) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            server_addr,
            policy,
        })
    }

    /// Send a control-line frame (no body) and wait for the reply text.
    pub async fn exchange(&self, message: &str) -> anyhow::Result<String> {
        let (reply, _) =
            send_and_receive(&self.socket, message.as_bytes(), self.server_addr, self.policy)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Send a frame with a command line and a body (joined by `\n`) and
    /// wait for the reply text — used for `SUPLOAD_STRUCTURE` and
    /// `SYNC_CHUNK`.
    pub async fn exchange_with_body(&self, command_line: &str, body: &str) -> anyhow::Result<String> {
        let payload = format!("{command_line}\n{body}");
        self.exchange(&payload).await
    }
}
