//! The control dispatcher (§4.4): reads one datagram at a time on the
//! control endpoint, routes it to a handler, and sends back exactly one
//! reply — even on internal error.
//!
//! Runs as a single logical receiver (§5): there is one `DispatcherState`
//! owned by this loop alone, so navigation, bulk-session, and sync-lock
//! state need no locking. Download workers are the one piece of
//! concurrency, each spawned onto its own task and UDP port so an
//! in-flight upload never starves a download.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use ferrysync_core::types::MAX_DATAGRAM;
use ferrysync_core::{ClientId, Confinement, FerrysyncError};
use ferrysync_transport::{recv_request, send_reply, RetryPolicy};
use ferrysync_wire::request::ControlRequest;
use ferrysync_wire::upload::UploadFrame;
use ferrysync_wire::response;

use crate::download;
use crate::state::{BulkSession, DispatcherState, SyncSession};

/// Drives the dispatch loop until the process is killed.
pub async fn run(
    socket: UdpSocket,
    confinement: Confinement,
    mut state: DispatcherState,
    download_retry: RetryPolicy,
) -> anyhow::Result<()> {
    let mut sweep = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                state.sweep_expired();
            }
            received = recv_request(&socket) => {
                let inbound = match received {
                    Ok(inbound) => inbound,
                    Err(e) => {
                        warn!(error = %e, "failed to receive datagram");
                        continue;
                    }
                };
                state.metrics.inc_requests();
                let reply = handle(&socket, &confinement, &mut state, download_retry, &inbound.payload, inbound.from).await;
                if let Some(reply) = reply {
                    if let Err(e) = send_reply(&socket, reply.as_bytes(), inbound.from).await {
                        warn!(error = %e, from = %inbound.from, "failed to send reply");
                    }
                }
            }
        }
    }
}

/// Whether `req` is one of the three verbs allowed through while the
/// global sync lock is held (§3, §4.4).
fn sync_exempt(req: &ControlRequest) -> bool {
    matches!(
        req,
        ControlRequest::SyncChunk { .. } | ControlRequest::SyncFinish | ControlRequest::GetSyncChunk { .. }
    ) || matches!(
        req,
        ControlRequest::Malformed { verb, .. }
            if verb == "SYNC_CHUNK" || verb == "SYNC_FINISH" || verb == "GET_SYNC_CHUNK"
    )
}

async fn handle(
    socket: &UdpSocket,
    confinement: &Confinement,
    state: &mut DispatcherState,
    download_retry: RetryPolicy,
    payload: &[u8],
    from: SocketAddr,
) -> Option<String> {
    let request = ControlRequest::parse(payload);

    if state.sync.is_some() && !sync_exempt(&request) {
        return Some(response::SYNC_BUSY.to_string());
    }

    match request {
        ControlRequest::ListFiles => Some(list_files(confinement, state, from)),
        ControlRequest::Cd { name } => Some(handle_cd(confinement, state, from, &name)),
        ControlRequest::Upload { path } => {
            handle_upload(socket, confinement, state, from, &path).await
        }
        ControlRequest::Download { name } => {
            Some(handle_download(confinement, state, download_retry, from, &name).await)
        }
        ControlRequest::KillServerFiles => Some(handle_kill(confinement).await),
        ControlRequest::SuploadStructure { root, dirs } => {
            Some(handle_supload_structure(confinement, state, from, &root, &dirs).await)
        }
        ControlRequest::SuploadFile { relpath } => {
            handle_supload_file(socket, state, from, &relpath).await
        }
        ControlRequest::SuploadComplete => Some(handle_supload_complete(state, from)),
        ControlRequest::SyncStart {
            remote,
            expected_chunks,
        } => Some(handle_sync_start(confinement, state, from, &remote, expected_chunks).await),
        ControlRequest::SyncChunk { index, body, .. } => {
            Some(handle_sync_chunk(state, from, index, body))
        }
        ControlRequest::SyncFinish => Some(handle_sync_finish(state, from).await),
        ControlRequest::GetSyncChunk { index } => Some(handle_get_sync_chunk(state, from, index)),
        ControlRequest::Unknown => Some(response::err_unknown_command()),
        ControlRequest::Malformed { verb, reason } => {
            warn!(verb, reason, "malformed frame");
            Some(response::err_unknown_command())
        }
    }
}

// ── LIST_FILES ──────────────────────────────────────────────────────────

fn list_files(confinement: &Confinement, state: &DispatcherState, from: ClientId) -> String {
    let dir = state.current_dir(confinement.root(), from);
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    match std::fs::read_dir(&dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                match entry.file_type() {
                    Ok(ft) if ft.is_dir() => dirs.push(name),
                    Ok(ft) if ft.is_file() => files.push(name),
                    _ => {}
                }
            }
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "list_files: unreadable directory");
        }
    }
    dirs.sort();
    files.sort();
    response::ok_list(&dirs, &files)
}

// ── CD ──────────────────────────────────────────────────────────────────

fn handle_cd(
    confinement: &Confinement,
    state: &mut DispatcherState,
    from: ClientId,
    name: &str,
) -> String {
    let current = state.current_dir(confinement.root(), from);
    match confinement.resolve_existing(&current, name) {
        Ok(resolved) if resolved.is_dir() => {
            let rel = confinement.relative_display(&resolved);
            state.set_current_dir(from, resolved);
            response::cd_ok(&rel)
        }
        Ok(_) => response::cd_err("not a directory"),
        Err(e) => response::cd_err(&e.to_string()),
    }
}

// ── UPLOAD (§4.5) ───────────────────────────────────────────────────────

async fn handle_upload(
    socket: &UdpSocket,
    confinement: &Confinement,
    state: &mut DispatcherState,
    from: ClientId,
    path: &str,
) -> Option<String> {
    let current = state.current_dir(confinement.root(), from);
    let dest = match confinement.resolve_for_create(&current, path) {
        Ok(p) => p,
        Err(e) => return Some(e.as_reply_line()),
    };

    socket
        .send_to(response::upload_ready().as_bytes(), from)
        .await
        .ok()?;

    let idle = state.upload_idle_ttl();
    if let Err(e) = receive_file(socket, from, &dest, idle, &state.metrics).await {
        warn!(error = %e, dest = %dest.display(), "upload receive loop ended with an error");
    }
    None
}

/// Stop-and-wait receive loop shared by `UPLOAD` and `SUPLOAD_FILE`.
/// Sends every reply itself; the caller has nothing further to send.
async fn receive_file(
    socket: &UdpSocket,
    from: SocketAddr,
    dest: &Path,
    idle: Duration,
    metrics: &crate::metrics::Metrics,
) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
        .await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (n, src) = match tokio::time::timeout(idle, socket.recv_from(&mut buf)).await {
            Ok(res) => res?,
            Err(_) => {
                warn!(dest = %dest.display(), "upload: idle timeout, leaving partial file");
                return Ok(());
            }
        };
        if src != from {
            // A frame from a different client arrived while this upload
            // held the dispatcher inline; per §5 the dispatcher is
            // serialized during an in-flight upload, so this is treated
            // as the next chunk for the active transfer would be — but
            // it plainly isn't one, so answer with a protocol error and
            // keep waiting for the real continuation.
            socket
                .send_to(response::err_unknown_command().as_bytes(), src)
                .await?;
            continue;
        }

        match UploadFrame::parse(&buf[..n]) {
            Ok(UploadFrame::Data(bytes)) => {
                file.write_all(&bytes).await?;
                metrics.add_bytes(bytes.len() as u64);
                socket
                    .send_to(response::ack_data().as_bytes(), from)
                    .await?;
            }
            Ok(UploadFrame::Done) => {
                file.flush().await?;
                socket
                    .send_to(response::upload_complete().as_bytes(), from)
                    .await?;
                info!(dest = %dest.display(), "upload complete");
                return Ok(());
            }
            Ok(UploadFrame::Unexpected(verb)) => {
                warn!(verb, dest = %dest.display(), "upload: protocol error, leaving partial file");
                socket
                    .send_to(response::err_unknown_command().as_bytes(), from)
                    .await?;
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, dest = %dest.display(), "upload: invalid DATA frame");
                socket
                    .send_to(response::err_unknown_command().as_bytes(), from)
                    .await?;
                return Ok(());
            }
        }
    }
}

// ── DOWNLOAD (§4.6) ─────────────────────────────────────────────────────

async fn handle_download(
    confinement: &Confinement,
    state: &DispatcherState,
    retry_policy: RetryPolicy,
    from: ClientId,
    name: &str,
) -> String {
    let current = state.current_dir(confinement.root(), from);
    let candidate = confinement.join_lexical(&current, name);
    if !candidate.exists() {
        return response::err_not_found(name);
    }

    let resolved = match confinement.resolve_existing(&current, name) {
        Ok(p) => p,
        Err(_) => return response::err_invalid_path("escapes root"),
    };
    if resolved.is_dir() {
        return format!("ERR {name} NOT_A_FILE");
    }

    let size = match std::fs::metadata(&resolved) {
        Ok(meta) => meta.len(),
        Err(_) => return response::err_not_found(name),
    };

    match download::spawn(resolved, name.to_string(), retry_policy, state.metrics.clone()).await {
        Ok(port) => response::download_ok(name, size, port),
        Err(e) => {
            warn!(error = %e, name, "failed to spawn download worker");
            format!("ERR {name} NOT_FOUND")
        }
    }
}

// ── KILL_SERVER_FILES ───────────────────────────────────────────────────

async fn handle_kill(confinement: &Confinement) -> String {
    let root = confinement.root();
    for entry in std::fs::read_dir(root).into_iter().flatten().flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "kill: failed to remove entry");
        }
    }
    info!(root = %root.display(), "kill: recreated empty root");
    response::kill_ok("server files erased")
}

// ── SUPLOAD_STRUCTURE / SUPLOAD_FILE / SUPLOAD_COMPLETE (§4.7) ─────────

const MAX_COMPONENT_LEN: usize = 255;
const MAX_BULK_DEPTH: usize = 10;

fn validate_bulk_component_limits(confinement: &Confinement, path: &Path) -> Result<(), String> {
    let rel = path.strip_prefix(confinement.root()).unwrap_or(path);
    let components: Vec<_> = rel.components().collect();
    if components.len() > MAX_BULK_DEPTH {
        return Err(format!("directory depth {} exceeds {MAX_BULK_DEPTH}", components.len()));
    }
    for component in &components {
        let len = component.as_os_str().len();
        if len > MAX_COMPONENT_LEN {
            return Err(format!("path component exceeds {MAX_COMPONENT_LEN} bytes"));
        }
    }
    Ok(())
}

async fn handle_supload_structure(
    confinement: &Confinement,
    state: &mut DispatcherState,
    from: ClientId,
    root: &str,
    dirs: &[String],
) -> String {
    let current = state.current_dir(confinement.root(), from);

    let resolved_root = match confinement.resolve_for_create(&current, root) {
        Ok(p) => p,
        Err(FerrysyncError::InvalidPath(msg)) => return response::structure_err(&msg),
        Err(e) => return response::structure_err(&e.to_string()),
    };
    if let Err(msg) = validate_bulk_component_limits(confinement, &resolved_root) {
        return response::structure_err(&msg);
    }

    let mut resolved_dirs = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let resolved = match confinement.resolve_for_create(&current, dir) {
            Ok(p) => p,
            Err(FerrysyncError::InvalidPath(msg)) => return response::structure_err(&msg),
            Err(e) => return response::structure_err(&e.to_string()),
        };
        if let Err(msg) = validate_bulk_component_limits(confinement, &resolved) {
            return response::structure_err(&msg);
        }
        resolved_dirs.push(resolved);
    }

    if let Err(e) = std::fs::create_dir_all(&resolved_root) {
        return response::structure_err(&format!("creating {root}: {e}"));
    }
    for dir in &resolved_dirs {
        if let Err(e) = std::fs::create_dir_all(dir) {
            return response::structure_err(&format!("creating {}: {e}", dir.display()));
        }
    }

    state
        .bulk_sessions
        .insert(from, BulkSession::new(resolved_root));
    response::structure_ok()
}

async fn handle_supload_file(
    socket: &UdpSocket,
    state: &mut DispatcherState,
    from: ClientId,
    relpath: &str,
) -> Option<String> {
    let base = match state.bulk_sessions.get_mut(&from) {
        Some(session) => {
            session.touch();
            session.base.clone()
        }
        None => return Some(response::err_no_supload_session()),
    };

    let dest = lexical_join(&base, relpath);
    if !dest.starts_with(&base) {
        return Some(response::err_invalid_path("escapes bulk root"));
    }

    socket
        .send_to(response::file_ready().as_bytes(), from)
        .await
        .ok()?;

    let idle = state.upload_idle_ttl();
    if let Err(e) = receive_file(socket, from, &dest, idle, &state.metrics).await {
        warn!(error = %e, dest = %dest.display(), "bulk upload receive loop ended with an error");
    }
    None
}

/// Lexical join + `.`/`..` folding against `base`, used for `SUPLOAD_FILE`
/// paths which are validated against the bulk root rather than `ROOT`.
fn lexical_join(base: &Path, input: &str) -> PathBuf {
    use std::path::Component;
    let mut out = base.to_path_buf();
    for component in Path::new(input).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn handle_supload_complete(state: &mut DispatcherState, from: ClientId) -> String {
    match state.bulk_sessions.remove(&from) {
        Some(_) => response::supload_ok(),
        None => response::err_no_supload_session(),
    }
}

// ── SYNC_START / SYNC_CHUNK / SYNC_FINISH / GET_SYNC_CHUNK (§4.8) ──────

async fn handle_sync_start(
    confinement: &Confinement,
    state: &mut DispatcherState,
    from: ClientId,
    remote: &str,
    expected_chunks: u32,
) -> String {
    // state.sync is guaranteed None here: SYNC_START isn't in the
    // sync-exempt set, so the generic lock guard already rejected this
    // frame with SYNC_BUSY if a session were active.
    let target = match confinement.resolve_for_create(confinement.root(), remote) {
        Ok(p) => p,
        Err(FerrysyncError::InvalidPath(msg)) => return response::err_invalid_path(&msg),
        Err(e) => return response::err_invalid_path(&e.to_string()),
    };
    if let Err(e) = std::fs::create_dir_all(&target) {
        return response::err_invalid_path(&format!("creating {remote}: {e}"));
    }

    state.sync = Some(SyncSession::new(from, target, expected_chunks));
    state.metrics.set_sync_lock_held(true);
    info!(%from, remote, expected_chunks, "sync: lock acquired");
    response::sync_ready()
}

fn handle_sync_chunk(state: &mut DispatcherState, from: ClientId, index: u32, body: String) -> String {
    match &mut state.sync {
        Some(session) if session.holder == from => {
            session.buffer.push_str(&body);
            response::ack_chunk(index)
        }
        _ => response::err_no_sync_session(),
    }
}

async fn handle_sync_finish(state: &mut DispatcherState, from: ClientId) -> String {
    let session = match &state.sync {
        Some(session) if session.holder == from => session,
        _ => return response::err_no_sync_session(),
    };

    let client_manifest = match ferrysync_manifest::from_json(&session.buffer) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "sync: malformed manifest JSON");
            state.sync = None;
            state.metrics.set_sync_lock_held(false);
            return response::err_invalid_path("malformed manifest");
        }
    };
    let target = session.target.clone();

    let server_manifest = match ferrysync_manifest::build(&target) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "sync: failed to build server manifest");
            state.sync = None;
            state.metrics.set_sync_lock_held(false);
            return format!("ERR {e}");
        }
    };

    let diff = ferrysync_manifest::diff(&client_manifest, &server_manifest);
    ferrysync_manifest::apply_deletions(&target, &diff.to_delete);

    if diff.to_fetch.is_empty() {
        state.sync = None;
        state.metrics.set_sync_lock_held(false);
        return response::sync_no_changes();
    }

    let body = serde_json::json!({ "status": "NEEDS_FILES", "files": diff.to_fetch }).to_string();
    let chunks = chunk_str(&body, 1024);
    let count = chunks.len();

    if let Some(session) = &mut state.sync {
        session.response_chunks = Some(chunks);
        session.ready_at = Some(std::time::Instant::now());
    }
    response::needs_files_ready(count)
}

fn handle_get_sync_chunk(state: &mut DispatcherState, from: ClientId, index: u32) -> String {
    let release = {
        let session = match &state.sync {
            Some(session) if session.holder == from => session,
            _ => return response::err_no_sync_session(),
        };
        let chunks = match &session.response_chunks {
            Some(chunks) => chunks,
            None => return response::err_no_sync_session(),
        };
        match chunks.get(index as usize) {
            Some(chunk) => {
                let is_last = index as usize + 1 == chunks.len();
                (chunk.clone(), is_last)
            }
            None => return response::err_no_sync_session(),
        }
    };

    let (chunk, is_last) = release;
    if is_last {
        state.sync = None;
        state.metrics.set_sync_lock_held(false);
        info!(%from, "sync: drained final chunk, lock released");
    }
    chunk
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
        assert_eq!(chunks[0].len(), 1024);
        assert_eq!(chunks[2].len(), 452);
        assert_eq!(chunks.concat(), s);
    }

    #[test]
    fn chunk_str_empty_is_no_chunks() {
        assert!(chunk_str("", 1024).is_empty());
    }

    #[test]
    fn sync_exempt_matches_the_three_verbs() {
        assert!(sync_exempt(&ControlRequest::SyncFinish));
        assert!(sync_exempt(&ControlRequest::GetSyncChunk { index: 0 }));
        assert!(!sync_exempt(&ControlRequest::ListFiles));
    }
}
