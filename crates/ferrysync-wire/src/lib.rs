//! Wire grammar for the ferrysync UDP protocol: datagram framing,
//! control-endpoint requests, upload/download session frames, base64
//! chunk encoding, and reply builders. Kept free of any I/O so it can be
//! unit tested without a socket.

pub mod download;
pub mod encoding;
pub mod frame;
pub mod request;
pub mod response;
pub mod upload;

pub use download::DownloadFrame;
pub use encoding::{decode_chunk, encode_chunk, DecodeError};
pub use frame::Frame;
pub use request::ControlRequest;
pub use upload::{InvalidDataFrame, UploadFrame};
