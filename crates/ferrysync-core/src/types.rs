use std::net::SocketAddr;

/// Implicit client identity: the `(ip, port)` observed on each datagram.
/// There is no handshake — the dispatcher keys all per-client state
/// (navigation, upload/bulk/sync sessions) off this tuple directly.
pub type ClientId = SocketAddr;

/// Sentinel manifest value for a directory entry (as opposed to a file's
/// content digest).
pub const DIR_SENTINEL: &str = "__DIR__";

/// Maximum datagram payload accepted or produced, per the wire protocol.
pub const MAX_DATAGRAM: usize = 8192;

/// Recommended pre-encoding chunk size for uploads and downloads.
pub const CHUNK_SIZE: usize = 1024;
