//! Frames exchanged during the stop-and-wait upload receive loop (§4.5).

use crate::encoding::{decode_chunk, DecodeError};
use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFrame {
    Data(Vec<u8>),
    Done,
    /// Anything else is a protocol error; the caller ends the session
    /// with the partial file left in place.
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid DATA frame: {0}")]
pub struct InvalidDataFrame(pub String);

impl UploadFrame {
    pub fn parse(payload: &[u8]) -> Result<Self, InvalidDataFrame> {
        let frame = Frame::parse(payload);
        match frame.verb() {
            "DATA" => {
                let encoded = frame.args();
                match decode_chunk(encoded) {
                    Ok(bytes) => Ok(UploadFrame::Data(bytes)),
                    Err(DecodeError(e)) => Err(InvalidDataFrame(e.to_string())),
                }
            }
            "UPLOAD_DONE" => Ok(UploadFrame::Done),
            other => Ok(UploadFrame::Unexpected(other.to_string())),
        }
    }
}
