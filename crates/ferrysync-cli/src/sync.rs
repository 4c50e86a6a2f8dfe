//! `sync` subcommands: `list`, `add`, `remove`, `run`, `auto` (§6).
//!
//! One "sync cycle" walks a configured local directory into a manifest,
//! transfers it to the server in 1024-byte chunks, and either learns the
//! two sides already match or fetches the list of stale/missing files
//! and re-uploads each — mirroring the reference client's `SyncManager`.

use std::time::Duration;

use tracing::warn;

use crate::commands::upload_one;
use crate::config::{ClientConfig, SyncPair};
use crate::net::Control;

const CHUNK_SIZE: usize = 1024;
const SYNC_INTERVAL: Duration = Duration::from_secs(3);

pub fn list(config: &ClientConfig) {
    let mut any = false;
    for (id, pair) in config.pairs() {
        any = true;
        println!("{id}: {} -> {}", pair.local_path.display(), pair.remote_path);
    }
    if !any {
        println!("(no sync pairs configured)");
    }
}

pub fn add(config: &mut ClientConfig, local_path: &str, remote_path: &str) {
    let id = config.add(local_path.into(), remote_path.to_string());
    match config.save() {
        Ok(()) => println!("Added sync pair {id}: {local_path} -> {remote_path}"),
        Err(e) => println!("[ERROR] Failed to save sync config: {e}"),
    }
}

pub fn remove(config: &mut ClientConfig, id: u32) {
    match config.remove(id) {
        Some(pair) => {
            if let Err(e) = config.save() {
                println!("[ERROR] Failed to save sync config: {e}");
                return;
            }
            println!("Removed sync pair {id}: {} -> {}", pair.local_path.display(), pair.remote_path);
        }
        None => println!("[ERROR] No sync pair with id {id}"),
    }
}

/// Run one sync cycle for every configured pair.
pub async fn run_once(control: &Control, config: &ClientConfig) {
    for (id, pair) in config.pairs() {
        println!("\n------------------ Sync pair {id} ------------------");
        if let Err(e) = sync_cycle(control, pair).await {
            println!("[ERROR] Sync pair {id} failed: {e}");
        }
    }
}

/// `sync auto`: repeat `run_once` every 3 seconds until interrupted.
pub async fn run_auto(control: &Control, config: &ClientConfig) {
    println!("\n[SYNC MODE ACTIVATED]");
    println!("Client will now sync with the server every 3 seconds.");
    println!("Press Ctrl+C to stop syncing and return to the command menu.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n[SYNC MODE DEACTIVATED] Returning to command menu.");
                return;
            }
            _ = run_once(control, config) => {
                for remaining in (1..=SYNC_INTERVAL.as_secs()).rev() {
                    print!("\rNext sync in {remaining} seconds...  ");
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            println!("\n[SYNC MODE DEACTIVATED] Returning to command menu.");
                            return;
                        }
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    }
                }
                println!();
            }
        }
    }
}

async fn sync_cycle(control: &Control, pair: &SyncPair) -> anyhow::Result<()> {
    println!(" -> Step 1/3: Generating local manifest for {}...", pair.local_path.display());
    let manifest = ferrysync_manifest::build(&pair.local_path)
        .map_err(|e| anyhow::anyhow!("generating manifest: {e}"))?;

    println!(" -> Step 2/3: Transferring manifest to server...");
    let chunk_count = transfer_manifest(control, &pair.remote_path, &manifest).await?;
    let _ = chunk_count;

    println!(" -> Step 3/3: Processing server's file request list...");
    let reply = control.exchange("SYNC_FINISH").await?;
    process_server_response(control, pair, &reply).await;

    println!("\n[+] Sync cycle completed successfully.");
    Ok(())
}

async fn transfer_manifest(
    control: &Control,
    remote_path: &str,
    manifest: &ferrysync_manifest::Manifest,
) -> anyhow::Result<usize> {
    let payload = ferrysync_manifest::to_json(manifest)?;
    let chunks = chunk_str(&payload, CHUNK_SIZE);
    let num_chunks = chunks.len();

    let reply = control
        .exchange(&format!("SYNC_START {remote_path} {num_chunks}"))
        .await?;
    if reply != "SYNC_READY" {
        anyhow::bail!("server not ready for sync: {reply}");
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let reply = control
            .exchange_with_body(&format!("SYNC_CHUNK {i}/{num_chunks}"), chunk)
            .await?;
        let expected = format!("ACK_CHUNK {i}");
        if reply != expected {
            anyhow::bail!("manifest chunk {i} upload failed: {reply}");
        }
    }

    Ok(num_chunks)
}

async fn process_server_response(control: &Control, pair: &SyncPair, response: &str) {
    if response == "SYNC_OK_NO_CHANGES" {
        println!(" -> All files are in sync.");
        return;
    }

    let Some(count_str) = response.strip_prefix("NEEDS_FILES_READY ") else {
        println!("[WARNING] Received unexpected response from server: {response}");
        return;
    };
    let Ok(num_chunks) = count_str.trim().parse::<usize>() else {
        println!("[ERROR] Invalid READY response format: {response}");
        return;
    };
    println!(" -> Server has {num_chunks} data chunk(s). Fetching...");

    let mut buffer = String::new();
    for i in 0..num_chunks {
        match control.exchange(&format!("GET_SYNC_CHUNK {i}")).await {
            Ok(chunk) => {
                buffer.push_str(&chunk);
                print!("\r -> Receiving file list... {}/{num_chunks}", i + 1);
            }
            Err(e) => {
                println!("\n[ERROR] Failed to fetch sync chunk {i}: {e}");
                return;
            }
        }
    }
    println!();

    let parsed: serde_json::Value = match serde_json::from_str(&buffer) {
        Ok(v) => v,
        Err(e) => {
            println!("[ERROR] Failed to process server's sync response: {e}");
            println!("Raw response: {buffer}");
            return;
        }
    };
    let Some(files) = parsed.get("files").and_then(|f| f.as_array()) else {
        println!("[ERROR] Invalid JSON format: missing 'files' field");
        return;
    };

    if files.is_empty() {
        println!(" -> All files are in sync.");
        return;
    }
    println!(" -> Server needs {} file(s). Starting upload...", files.len());
    for file in files {
        let Some(rel_path) = file.as_str() else {
            warn!(?file, "sync: non-string entry in files list");
            continue;
        };
        println!("    - Uploading '{rel_path}'...");
        let local_path = pair.local_path.join(rel_path);
        let server_path = join_remote(&pair.remote_path, rel_path);
        if let Err(e) = upload_one(control, &local_path, &server_path).await {
            println!("    [ERROR] Failed to upload '{rel_path}': {e}");
        }
    }
}

fn join_remote(remote_path: &str, rel_path: &str) -> String {
    if remote_path.is_empty() {
        rel_path.to_string()
    } else {
        format!("{}/{rel_path}", remote_path.trim_end_matches('/'))
    }
}

/// Split `s` into pieces of at most `max_bytes` bytes without cutting a
/// multi-byte UTF-8 character in half.
fn chunk_str(s: &str, max_bytes: usize) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in s.chars() {
        if current.len() + ch.len_utf8() > max_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_str_splits_on_byte_budget() {
        let s = "a".repeat(2500);
        let chunks = chunk_str(&s, 1024);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), s);
    }

    #[test]
    fn join_remote_handles_empty_and_trailing_slash() {
        assert_eq!(join_remote("", "a.txt"), "a.txt");
        assert_eq!(join_remote("photos/", "a.txt"), "photos/a.txt");
        assert_eq!(join_remote("photos", "a.txt"), "photos/a.txt");
    }
}
