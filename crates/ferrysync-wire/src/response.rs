//! Reply-frame builders covering the response grammar in §6. Keeping
//! these as small free functions (rather than formatting inline at each
//! call site) is what makes the dispatcher's "exactly one reply per
//! frame" invariant easy to eyeball at every call site.

use crate::encoding::encode_chunk;

pub const SYNC_BUSY: &str = "server syncing , plz wait";

pub fn ok_list(dirs: &[String], files: &[String]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(dirs.len() + files.len());
    parts.extend(dirs.iter().map(|d| format!("{d}/")));
    parts.extend(files.iter().cloned());
    if parts.is_empty() {
        "OK ".to_string()
    } else {
        format!("OK {}", parts.join(" "))
    }
}

pub fn cd_ok(rel: &str) -> String {
    format!("CD_OK Now in /{rel}")
}

pub fn cd_err(msg: &str) -> String {
    format!("CD_ERR {msg}")
}

pub fn upload_ready() -> String {
    "UPLOAD_READY".to_string()
}

pub fn ack_data() -> String {
    "ACK_DATA".to_string()
}

pub fn upload_complete() -> String {
    "UPLOAD_COMPLETE".to_string()
}

pub fn download_ok(name: &str, size: u64, port: u16) -> String {
    format!("OK {name} SIZE {size} PORT {port}")
}

pub fn err_not_found(name: &str) -> String {
    format!("ERR {name} NOT_FOUND")
}

pub fn kill_ok(msg: &str) -> String {
    format!("KILL_OK {msg}")
}

pub fn structure_ok() -> String {
    "STRUCTURE_OK".to_string()
}

pub fn structure_err(msg: &str) -> String {
    format!("STRUCTURE_ERR {msg}")
}

pub fn file_ready() -> String {
    "FILE_READY".to_string()
}

pub fn supload_ok() -> String {
    "SUPLOAD_OK".to_string()
}

pub fn sync_ready() -> String {
    "SYNC_READY".to_string()
}

pub fn ack_chunk(i: u32) -> String {
    format!("ACK_CHUNK {i}")
}

pub fn sync_no_changes() -> String {
    "SYNC_OK_NO_CHANGES".to_string()
}

pub fn needs_files_ready(k: usize) -> String {
    format!("NEEDS_FILES_READY {k}")
}

pub fn download_ready() -> String {
    "DOWNLOAD_READY".to_string()
}

pub fn data_chunk(bytes: &[u8]) -> String {
    format!("DATA {}", encode_chunk(bytes))
}

pub fn transfer_complete() -> String {
    "TRANSFER_COMPLETE".to_string()
}

pub fn file_legacy_ok(name: &str, start: u64, end: u64, bytes: &[u8]) -> String {
    format!(
        "FILE {name} OK START {start} END {end} DATA {}",
        encode_chunk(bytes)
    )
}

pub fn file_legacy_close_ok(name: &str) -> String {
    format!("FILE {name} CLOSE_OK")
}

pub fn err_unknown_command() -> String {
    "ERR_UNKNOWN_COMMAND".to_string()
}

pub fn err_invalid_path(msg: &str) -> String {
    format!("ERR_INVALID_PATH {msg}")
}

pub fn err_no_sync_session() -> String {
    "ERR_NO_SYNC_SESSION".to_string()
}

pub fn err_no_supload_session() -> String {
    "ERR_NO_SUPLOAD_SESSION".to_string()
}

pub fn err_unsupported_dialect() -> String {
    "ERR_UNSUPPORTED_DIALECT".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing_has_trailing_space() {
        assert_eq!(ok_list(&[], &[]), "OK ");
    }

    #[test]
    fn listing_puts_dirs_before_files() {
        let dirs = vec!["b".to_string()];
        let files = vec!["a.txt".to_string()];
        assert_eq!(ok_list(&dirs, &files), "OK b/ a.txt");
    }

    #[test]
    fn download_reply_matches_grammar() {
        assert_eq!(download_ok("a.bin", 3000, 55000), "OK a.bin SIZE 3000 PORT 55000");
    }
}
