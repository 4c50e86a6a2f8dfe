use thiserror::Error;

pub type FerrysyncResult<T> = Result<T, FerrysyncError>;

/// Error kinds per the protocol's error handling design: each carries enough
/// context to pick the right reply frame without re-deriving it from a string.
#[derive(Debug, Error)]
pub enum FerrysyncError {
    /// All transport retries were exhausted; the current multi-frame
    /// protocol must be abandoned.
    #[error("transport exhausted after {attempts} attempts")]
    TransportExhausted { attempts: u32 },

    /// A client-supplied path escaped the confinement root, or named a
    /// nonexistent/wrong-kind target for the requested operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The requested object does not exist, but the request itself was
    /// well-formed and in-bounds.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request named an existing object of the wrong kind (e.g.
    /// downloading a directory).
    #[error("not a file: {0}")]
    NotAFile(String),

    /// The frame could not be parsed into a known verb and fields.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Session state was expected (upload/bulk/sync) but is absent,
    /// expired, or belongs to a different client.
    #[error("session missing: {0}")]
    SessionMissing(String),

    /// A filesystem operation failed. Logged and the dispatcher continues;
    /// it must never take the process down.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FerrysyncError {
    /// Render this error as the fixed-grammar reply line the dispatcher
    /// sends back to the client, per the response grammar in the wire spec.
    pub fn as_reply_line(&self) -> String {
        match self {
            FerrysyncError::TransportExhausted { .. } => "ERR_TRANSPORT_EXHAUSTED".to_string(),
            FerrysyncError::InvalidPath(msg) => format!("ERR_INVALID_PATH {msg}"),
            FerrysyncError::NotFound(name) => format!("ERR {name} NOT_FOUND"),
            FerrysyncError::NotAFile(name) => format!("ERR {name} NOT_A_FILE"),
            FerrysyncError::MalformedFrame(_) => "ERR_UNKNOWN_COMMAND".to_string(),
            FerrysyncError::SessionMissing(_) => "ERR_NO_SYNC_SESSION".to_string(),
            FerrysyncError::Io(e) => format!("ERR_IO {e}"),
            FerrysyncError::Other(e) => format!("ERR {e}"),
        }
    }
}
