use std::net::SocketAddr;

use tokio::net::UdpSocket;

use ferrysync_core::types::MAX_DATAGRAM;

use crate::TransportError;

/// A single received datagram: the payload and the sender's address.
///
/// The server-side receive path is symmetric with the client side (§4.1):
/// read one datagram, dispatch, send exactly one reply to `from`. There is
/// no sequence number, so `from` doubles as the implicit client identity.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub payload: Vec<u8>,
    pub from: SocketAddr,
}

/// Block on the next datagram arriving at `socket`.
pub async fn recv_request(socket: &UdpSocket) -> Result<Inbound, TransportError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let (n, from) = socket.recv_from(&mut buf).await?;
    buf.truncate(n);
    Ok(Inbound { payload: buf, from })
}

/// Send a single reply datagram, enforcing the maximum payload size so a
/// misbehaving handler can't silently produce an oversized frame.
pub async fn send_reply(
    socket: &UdpSocket,
    payload: &[u8],
    to: SocketAddr,
) -> Result<(), TransportError> {
    if payload.len() > MAX_DATAGRAM {
        return Err(TransportError::TooLarge {
            len: payload.len(),
            max: MAX_DATAGRAM,
        });
    }
    socket.send_to(payload, to).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receives_payload_and_sender() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        client.send_to(b"LIST_FILES", server_addr).await.unwrap();
        let inbound = recv_request(&server).await.unwrap();

        assert_eq!(inbound.payload, b"LIST_FILES");
        assert_eq!(inbound.from, client_addr);
    }

    #[tokio::test]
    async fn send_reply_rejects_oversized_payload() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let big = vec![0u8; MAX_DATAGRAM + 1];
        let result = send_reply(&server, &big, dest).await;
        assert!(matches!(result, Err(TransportError::TooLarge { .. })));
    }
}
