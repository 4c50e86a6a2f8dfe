//! Base64 framing for chunk payloads (standard alphabet, padded).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid base64 chunk: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

pub fn encode_chunk(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn decode_chunk(encoded: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(encoded)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = b"hello world, this is a chunk";
        let encoded = encode_chunk(data);
        let decoded = decode_chunk(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_chunk("not valid base64!!").is_err());
    }
}
