//! Stop-and-wait request/reply transport over UDP (§4.1).
//!
//! The contract is deliberately thin: send a request, wait for exactly
//! one reply, retry on timeout. There is no sequence numbering and no
//! duplicate suppression — at most one request may be outstanding per
//! endpoint, which is what makes a lost ACK merely a documented
//! limitation (§9) rather than a correctness bug here.

mod client;
mod server;

pub use client::{send_and_receive, RetryPolicy};
pub use server::{recv_request, send_reply, Inbound};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no reply after {attempts} attempt(s)")]
    Exhausted { attempts: u32 },
    #[error("payload of {len} bytes exceeds the maximum datagram size of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}
