//! Parsed control-endpoint requests (§4.4 of the protocol design).

use crate::frame::Frame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    ListFiles,
    Cd { name: String },
    Upload { path: String },
    Download { name: String },
    KillServerFiles,
    SuploadStructure { root: String, dirs: Vec<String> },
    SuploadFile { relpath: String },
    SuploadComplete,
    SyncStart { remote: String, expected_chunks: u32 },
    SyncChunk { index: u32, total: u32, body: String },
    SyncFinish,
    GetSyncChunk { index: u32 },
    /// Verb didn't match any known command.
    Unknown,
    /// Verb matched, but its arguments were malformed.
    Malformed { verb: String, reason: String },
}

impl ControlRequest {
    pub fn parse(payload: &[u8]) -> Self {
        let frame = Frame::parse(payload);
        match frame.verb() {
            "LIST_FILES" => ControlRequest::ListFiles,
            "CD" => ControlRequest::Cd {
                name: frame.args().to_string(),
            },
            "UPLOAD" => ControlRequest::Upload {
                path: frame.args().to_string(),
            },
            "DOWNLOAD" => ControlRequest::Download {
                name: frame.args().to_string(),
            },
            "KILL_SERVER_FILES" => ControlRequest::KillServerFiles,
            "SUPLOAD_STRUCTURE" => {
                let root = frame.args().to_string();
                let dirs = frame
                    .body_or_empty()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                ControlRequest::SuploadStructure { root, dirs }
            }
            "SUPLOAD_FILE" => ControlRequest::SuploadFile {
                relpath: frame.args().to_string(),
            },
            "SUPLOAD_COMPLETE" => ControlRequest::SuploadComplete,
            "SYNC_START" => {
                let mut parts = frame.args().split_whitespace();
                let remote = parts.next().unwrap_or("").to_string();
                match parts.next().and_then(|n| n.parse::<u32>().ok()) {
                    Some(expected_chunks) => ControlRequest::SyncStart {
                        remote,
                        expected_chunks,
                    },
                    None => ControlRequest::Malformed {
                        verb: "SYNC_START".to_string(),
                        reason: "missing or invalid chunk count".to_string(),
                    },
                }
            }
            "SYNC_CHUNK" => match parse_i_of_n(frame.args()) {
                Some((index, total)) => ControlRequest::SyncChunk {
                    index,
                    total,
                    body: frame.body_or_empty().to_string(),
                },
                None => ControlRequest::Malformed {
                    verb: "SYNC_CHUNK".to_string(),
                    reason: "expected `<i>/<N>`".to_string(),
                },
            },
            "SYNC_FINISH" => ControlRequest::SyncFinish,
            "GET_SYNC_CHUNK" => match frame.args().parse::<u32>() {
                Ok(index) => ControlRequest::GetSyncChunk { index },
                Err(_) => ControlRequest::Malformed {
                    verb: "GET_SYNC_CHUNK".to_string(),
                    reason: "expected an integer index".to_string(),
                },
            },
            "" => ControlRequest::Unknown,
            _ => ControlRequest::Unknown,
        }
    }
}

/// Parse the `<i>/<N>` chunk-index grammar used by `SYNC_CHUNK`.
fn parse_i_of_n(s: &str) -> Option<(u32, u32)> {
    let (i, n) = s.split_once('/')?;
    Some((i.trim().parse().ok()?, n.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_files() {
        assert_eq!(ControlRequest::parse(b"LIST_FILES"), ControlRequest::ListFiles);
    }

    #[test]
    fn parses_cd_with_ascent() {
        assert_eq!(
            ControlRequest::parse(b"CD .."),
            ControlRequest::Cd { name: "..".to_string() }
        );
    }

    #[test]
    fn parses_supload_structure_body() {
        let req = ControlRequest::parse(b"SUPLOAD_STRUCTURE photos\nphotos/2024\nphotos/2025");
        assert_eq!(
            req,
            ControlRequest::SuploadStructure {
                root: "photos".to_string(),
                dirs: vec!["photos/2024".to_string(), "photos/2025".to_string()],
            }
        );
    }

    #[test]
    fn parses_sync_chunk() {
        let req = ControlRequest::parse(b"SYNC_CHUNK 2/5\n{\"a\":1}");
        assert_eq!(
            req,
            ControlRequest::SyncChunk {
                index: 2,
                total: 5,
                body: "{\"a\":1}".to_string(),
            }
        );
    }

    #[test]
    fn malformed_sync_chunk_without_slash() {
        let req = ControlRequest::parse(b"SYNC_CHUNK garbage");
        assert!(matches!(req, ControlRequest::Malformed { .. }));
    }

    #[test]
    fn unknown_verb() {
        assert_eq!(ControlRequest::parse(b"FROBNICATE"), ControlRequest::Unknown);
    }
}
