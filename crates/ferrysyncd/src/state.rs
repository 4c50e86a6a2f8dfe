//! Process-wide mutable state: per-client navigation, bulk-upload
//! sessions, and the single global sync session/lock (§3, §5).
//!
//! The control dispatcher is the sole owner of this state — it runs as a
//! single logical receiver (§5), so none of it needs an async mutex. Only
//! the metrics counters are shared with the metrics HTTP server, and
//! those are plain atomics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ferrysync_core::{ClientId, ServerConfig};

use crate::metrics::Metrics;

/// Bulk-upload session created by `SUPLOAD_STRUCTURE` (§4.7). Keyed by
/// client identity; only one bulk session may be active per client.
pub struct BulkSession {
    pub base: PathBuf,
    pub created: Instant,
    pub last_activity: Instant,
}

impl BulkSession {
    pub fn new(base: PathBuf) -> Self {
        let now = Instant::now();
        Self {
            base,
            created: now,
            last_activity: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }
}

/// The global sync session (§4.8). Its mere existence *is* the sync
/// lock: while `Some`, every non-sync command is rejected.
pub struct SyncSession {
    pub holder: ClientId,
    pub target: PathBuf,
    pub expected_chunks: u32,
    pub buffer: String,
    /// Set once `SYNC_FINISH` has computed the response; `GET_SYNC_CHUNK`
    /// drains it in order.
    pub response_chunks: Option<Vec<String>>,
    /// Set when `NEEDS_FILES_READY` was sent, for the 5-minute watchdog.
    pub ready_at: Option<Instant>,
}

impl SyncSession {
    pub fn new(holder: ClientId, target: PathBuf, expected_chunks: u32) -> Self {
        Self {
            holder,
            target,
            expected_chunks,
            buffer: String::new(),
            response_chunks: None,
            ready_at: None,
        }
    }

    pub fn watchdog_expired(&self, ttl: Duration) -> bool {
        match self.ready_at {
            Some(at) => at.elapsed() > ttl,
            None => false,
        }
    }
}

pub struct DispatcherState {
    pub config: ServerConfig,
    pub nav: HashMap<ClientId, PathBuf>,
    pub bulk_sessions: HashMap<ClientId, BulkSession>,
    pub sync: Option<SyncSession>,
    pub metrics: Metrics,
}

impl DispatcherState {
    pub fn new(config: ServerConfig, metrics: Metrics) -> Self {
        Self {
            config,
            nav: HashMap::new(),
            bulk_sessions: HashMap::new(),
            sync: None,
            metrics,
        }
    }

    /// The client's current directory, defaulting to `ROOT` on first
    /// contact (no handshake, no expiry — §3).
    pub fn current_dir(&self, root: &std::path::Path, client: ClientId) -> PathBuf {
        self.nav.get(&client).cloned().unwrap_or_else(|| root.to_path_buf())
    }

    pub fn set_current_dir(&mut self, client: ClientId, dir: PathBuf) {
        self.nav.insert(client, dir);
    }

    pub fn upload_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.config.sessions.upload_idle_minutes * 60)
    }

    pub fn sync_watchdog_ttl(&self) -> Duration {
        Duration::from_secs(self.config.sessions.sync_lock_watchdog_minutes * 60)
    }

    /// Drop bulk sessions past their idle TTL and force-release the sync
    /// lock if its post-`NEEDS_FILES_READY` watchdog has expired (§5, §4.8).
    pub fn sweep_expired(&mut self) {
        let ttl = self.upload_idle_ttl();
        let before = self.bulk_sessions.len();
        self.bulk_sessions.retain(|_, s| !s.is_idle(ttl));
        let dropped = before - self.bulk_sessions.len();
        if dropped > 0 {
            tracing::info!(dropped, "bulk sessions expired");
        }

        let watchdog = self.sync_watchdog_ttl();
        if let Some(sync) = &self.sync {
            if sync.watchdog_expired(watchdog) {
                tracing::warn!(holder = %sync.holder, "sync lock watchdog fired; force-releasing");
                self.sync = None;
                self.metrics.set_sync_lock_held(false);
            }
        }
        self.metrics.set_bulk_sessions(self.bulk_sessions.len() as i64);
    }
}
