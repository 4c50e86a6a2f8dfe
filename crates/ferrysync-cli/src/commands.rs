//! Per-command handlers for the interactive shell: `cd`, `upload`,
//! `supload`, `kill`, `all`, and single-name download — each grounded on
//! the corresponding `handle_*` function in the reference client.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::warn;

use ferrysync_transport::{send_and_receive, RetryPolicy};
use ferrysync_wire::encoding::{decode_chunk, encode_chunk};

use crate::net::Control;

/// Local working directory uploads/downloads default into, mirroring the
/// reference client's `client_files/`.
pub const CLIENT_FILES_DIR: &str = "client_files";

pub fn ensure_client_files_dir() -> std::io::Result<()> {
    std::fs::create_dir_all(CLIENT_FILES_DIR)
}

/// Resolve what the user typed for `upload <arg>` into (local file to
/// read, path to announce to the server). Tries `client_files/<arg>`
/// first, then `<arg>` literally, and falls back to sending just the
/// basename when the match came from outside `client_files/`.
pub fn resolve_upload_source(input: &str) -> Option<(PathBuf, String)> {
    let trimmed = input.trim().trim_matches(|c| c == '\'' || c == '"');

    let in_client_files = Path::new(CLIENT_FILES_DIR).join(trimmed);
    if in_client_files.is_file() {
        return Some((in_client_files, trimmed.replace('\\', "/")));
    }

    let direct = PathBuf::from(trimmed);
    if direct.is_file() {
        let name = direct.file_name()?.to_string_lossy().into_owned();
        return Some((direct, name));
    }

    None
}

pub async fn handle_upload(control: &Control, input: &str) {
    let Some((local_path, path_for_server)) = resolve_upload_source(input) else {
        println!(
            "[ERROR] File not found. Neither '{}' nor '{input}' is a valid file.",
            Path::new(CLIENT_FILES_DIR).join(input.trim()).display()
        );
        return;
    };

    match upload_one(control, &local_path, &path_for_server).await {
        Ok(()) => println!("[SUCCESS] File '{path_for_server}' uploaded successfully!"),
        Err(e) => println!("[ERROR] Upload failed for '{path_for_server}': {e}"),
    }
}

/// Run one `UPLOAD <path> / DATA* / UPLOAD_DONE` exchange. Shared by the
/// plain upload command and the sync-triggered catch-up uploads.
pub async fn upload_one(control: &Control, local_path: &Path, path_for_server: &str) -> anyhow::Result<()> {
    let reply = control.exchange(&format!("UPLOAD {path_for_server}")).await?;
    if reply != "UPLOAD_READY" {
        anyhow::bail!("server not ready for upload: {reply}");
    }

    transfer_file_upload(control, local_path).await?;

    let reply = control.exchange("UPLOAD_DONE").await?;
    if reply != "UPLOAD_COMPLETE" {
        anyhow::bail!("unexpected final response: {reply}");
    }
    Ok(())
}

async fn transfer_file_upload(control: &Control, path: &Path) -> anyhow::Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    let total = metadata.len();
    let bar = progress_bar(total, "uploading");

    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; 1024];
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let encoded = encode_chunk(&buf[..n]);
        let reply = control.exchange(&format!("DATA {encoded}")).await?;
        if reply != "ACK_DATA" {
            anyhow::bail!("chunk not acknowledged: {reply}");
        }
        sent += n as u64;
        bar.set_position(sent);
    }
    bar.finish_and_clear();
    Ok(())
}

fn progress_bar(total: u64, verb: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(&format!(
        "{{msg}} {verb} [{{bar:40}}] {{bytes}}/{{total_bytes}}"
    )) {
        bar.set_style(style);
    }
    bar
}

pub async fn handle_supload(control: &Control, input: &str) {
    let folder = PathBuf::from(input.trim().trim_matches(|c| c == '\'' || c == '"'));
    if !folder.is_dir() {
        println!("[ERROR] '{}' is not a valid directory.", folder.display());
        return;
    }

    let files = match collect_files(&folder) {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            println!("[ERROR] No files found in '{}'", folder.display());
            return;
        }
        Err(e) => {
            println!("[ERROR] Failed to read '{}': {e}", folder.display());
            return;
        }
    };
    let dirs = collect_dirs(&folder).unwrap_or_default();

    let root_name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    let dirs_body = dirs.join("\n");
    let reply = match control
        .exchange_with_body(&format!("SUPLOAD_STRUCTURE {root_name}"), &dirs_body)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            println!("[ERROR] Failed to create directory structure: {e}");
            return;
        }
    };
    if reply != "STRUCTURE_OK" {
        println!("[ERROR] Failed to create directory structure: {reply}");
        return;
    }

    let total = files.len();
    for (i, file_path) in files.iter().enumerate() {
        let rel_path = file_path
            .strip_prefix(&folder)
            .unwrap_or(file_path)
            .to_string_lossy()
            .replace('\\', "/");
        println!("({}/{total}) Uploading: {rel_path}", i + 1);

        let reply = match control.exchange(&format!("SUPLOAD_FILE {rel_path}")).await {
            Ok(r) => r,
            Err(e) => {
                println!("[WARNING] '{rel_path}' failed: {e}");
                continue;
            }
        };
        if reply != "FILE_READY" {
            println!("[WARNING] Server not ready for '{rel_path}', skipping.");
            continue;
        }

        if let Err(e) = transfer_file_upload(control, file_path).await {
            println!("[ERROR] Failed to upload '{rel_path}': {e}");
            continue;
        }
        match control.exchange("UPLOAD_DONE").await {
            Ok(r) if r == "UPLOAD_COMPLETE" => {}
            Ok(r) => println!("[WARNING] Unexpected response for '{rel_path}': {r}"),
            Err(e) => println!("[WARNING] '{rel_path}': {e}"),
        }
    }

    match control.exchange("SUPLOAD_COMPLETE").await {
        Ok(r) if r == "SUPLOAD_OK" => {
            println!("[SUCCESS] Folder '{root_name}' uploaded completely!")
        }
        Ok(r) => println!("[WARNING] Unexpected final response: {r}"),
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn collect_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(folder, &mut |p, is_dir| {
        if !is_dir {
            files.push(p.to_path_buf());
        }
    })?;
    Ok(files)
}

fn collect_dirs(folder: &Path) -> std::io::Result<Vec<String>> {
    let mut dirs = Vec::new();
    walk(folder, &mut |p, is_dir| {
        if is_dir && p != folder {
            let rel = p.strip_prefix(folder).unwrap_or(p).to_string_lossy().replace('\\', "/");
            dirs.push(rel);
        }
    })?;
    Ok(dirs)
}

fn walk(dir: &Path, visit: &mut dyn FnMut(&Path, bool)) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            visit(&path, true);
            walk(&path, visit)?;
        } else if file_type.is_file() {
            visit(&path, false);
        }
    }
    Ok(())
}

pub async fn handle_cd(control: &Control, input: &str) {
    let target = input.trim();
    match control.exchange(&format!("CD {target}")).await {
        Ok(reply) => println!("Server: {reply}"),
        Err(e) => println!("[ERROR] Failed to send cd command: {e}"),
    }
}

pub async fn handle_kill(control: &Control) {
    match control.exchange("KILL_SERVER_FILES").await {
        Ok(reply) if reply.starts_with("KILL_OK") => {
            println!("[SUCCESS] All files on server have been deleted successfully.")
        }
        Ok(reply) if reply.starts_with("KILL_ERR") => {
            println!("[ERROR] Failed to delete files on server.")
        }
        Ok(reply) => println!("[WARNING] Unexpected response from server: {reply}"),
        Err(e) => println!("[ERROR] Failed to send kill command: {e}"),
    }
}

pub async fn handle_all(control: &Control, files: &[String], download_retry: RetryPolicy) {
    if files.is_empty() {
        println!("No files available to download.");
        return;
    }
    for name in files {
        if name.ends_with('/') {
            continue;
        }
        request_and_download(control, name, download_retry).await;
    }
    println!("\nBatch download completed.");
}

pub async fn handle_single_download(control: &Control, name: &str, download_retry: RetryPolicy) {
    request_and_download(control, name, download_retry).await;
}

async fn request_and_download(control: &Control, name: &str, download_retry: RetryPolicy) {
    let reply = match control.exchange(&format!("DOWNLOAD {name}")).await {
        Ok(r) => r,
        Err(e) => {
            println!("Error during download of '{name}': {e}");
            return;
        }
    };
    if reply.starts_with("ERR") {
        println!("Error: File '{name}' not found on server");
        return;
    }
    if !reply.starts_with("OK") {
        println!("[WARNING] Unexpected response for '{name}': {reply}");
        return;
    }

    let parts: Vec<&str> = reply.split_whitespace().collect();
    // "OK <name> SIZE <n> PORT <p>"
    let (Some(size), Some(port)) = (
        parts.get(3).and_then(|s| s.parse::<u64>().ok()),
        parts.get(5).and_then(|s| s.parse::<u16>().ok()),
    ) else {
        println!("[WARNING] Malformed download reply: {reply}");
        return;
    };

    let mut data_addr = control.server_addr;
    data_addr.set_port(port);
    if let Err(e) = download_file(name, data_addr, size, download_retry).await {
        println!("[ERROR] Download failed for '{name}': {e}");
    } else {
        println!("[SUCCESS] File '{name}' downloaded successfully!");
    }
}

async fn download_file(
    name: &str,
    data_addr: SocketAddr,
    size: u64,
    policy: RetryPolicy,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let (reply, _) = send_and_receive(&socket, format!("DOWNLOAD {name}").as_bytes(), data_addr, policy)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let reply = String::from_utf8_lossy(&reply);
    if reply != "DOWNLOAD_READY" {
        anyhow::bail!("server not ready for download: {reply}");
    }

    let local_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let local_path = Path::new(CLIENT_FILES_DIR).join(local_name);
    let mut file = File::create(&local_path).await?;
    let bar = progress_bar(size, "downloading");
    let mut received = 0u64;

    loop {
        let (reply, _) = send_and_receive(&socket, b"GET_CHUNK", data_addr, policy)
            .await
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let reply = String::from_utf8_lossy(&reply);
        if reply == "TRANSFER_COMPLETE" {
            break;
        }
        let Some(encoded) = reply.strip_prefix("DATA ") else {
            anyhow::bail!("unexpected reply during download: {reply}");
        };
        let bytes = decode_chunk(encoded).map_err(|e| anyhow::anyhow!("{e}"))?;
        file.write_all(&bytes).await?;
        received += bytes.len() as u64;
        bar.set_position(received.min(size));
    }
    bar.finish_and_clear();
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::tempdir;

    #[test]
    fn resolves_from_client_files_first() {
        let dir = tempdir().unwrap();
        let original = env::current_dir().unwrap();
        env::set_current_dir(dir.path()).unwrap();
        std::fs::create_dir(CLIENT_FILES_DIR).unwrap();
        std::fs::write(Path::new(CLIENT_FILES_DIR).join("a.txt"), b"hi").unwrap();

        let (local, server) = resolve_upload_source("a.txt").unwrap();
        assert_eq!(local, Path::new(CLIENT_FILES_DIR).join("a.txt"));
        assert_eq!(server, "a.txt");

        env::set_current_dir(original).unwrap();
    }

    #[test]
    fn falls_back_to_basename_for_external_files() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("report.pdf");
        std::fs::write(&outside, b"hi").unwrap();

        let (local, server) = resolve_upload_source(outside.to_str().unwrap()).unwrap();
        assert_eq!(local, outside);
        assert_eq!(server, "report.pdf");
    }

    #[test]
    fn missing_file_resolves_to_none() {
        assert!(resolve_upload_source("/definitely/not/a/real/file.bin").is_none());
    }
}
