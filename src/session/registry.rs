use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use rand::Rng;
use tracing::warn;

use crate::config::PathsConfig;
use crate::models::{ScanSession, SessionId, SessionStatus, ToolKind};

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Hands out session ids and the artifact paths derived from them.
///
/// Ids look like `20240102_030405_123456-k3j9x0qa`: a UTC timestamp with
/// microseconds (strictly increasing across callers, so ids sort in
/// allocation order) plus a random suffix. The registry also tracks the
/// status of every session it has allocated in this process.
pub struct SessionRegistry {
    paths: PathsConfig,
    last_micros: Mutex<i64>,
    sessions: DashMap<SessionId, ScanSession>,
}

impl SessionRegistry {
    /// Relative artifact directories are resolved against the current
    /// working directory once, here.
    pub fn new(paths: PathsConfig) -> Self {
        let paths = match std::env::current_dir() {
            Ok(cwd) => paths.absolute_from(&cwd),
            Err(e) => {
                warn!(error = %e, "Cannot resolve the working directory, artifact paths stay relative");
                paths
            }
        };
        Self {
            paths,
            last_micros: Mutex::new(0),
            sessions: DashMap::new(),
        }
    }

    /// Allocate a fresh session id. Safe to call from any number of tasks.
    pub fn allocate(&self) -> SessionId {
        let micros = self.next_micros();
        let at = Utc
            .timestamp_micros(micros)
            .single()
            .unwrap_or_else(Utc::now);
        SessionId::from_existing(format!("{}-{}", at.format("%Y%m%d_%H%M%S_%6f"), random_suffix()))
    }

    /// Allocate an id and record a pending session for it.
    pub fn open(&self, target: &str, tools: impl IntoIterator<Item = ToolKind>) -> ScanSession {
        let session = ScanSession {
            id: self.allocate(),
            target: target.to_string(),
            requested_tools: tools.into_iter().collect(),
            started_at: Utc::now(),
            status: SessionStatus::Pending,
        };
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// `<base dir for tool>/<session id>.json`
    pub fn path_for(&self, id: &SessionId, tool: ToolKind) -> PathBuf {
        self.paths.base_dir(tool).join(format!("{}.json", id))
    }

    pub fn base_dir(&self, tool: ToolKind) -> &Path {
        self.paths.base_dir(tool)
    }

    pub fn full_scan_path(&self, id: &SessionId) -> PathBuf {
        self.paths.full_scan.join(format!("{}.json", id))
    }

    pub fn set_status(&self, id: &SessionId, status: SessionStatus) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.status = status;
        }
    }

    /// Forget a session that was rejected before any tool ran.
    pub fn discard(&self, id: &SessionId) {
        self.sessions.remove(id);
    }

    pub fn get(&self, id: &SessionId) -> Option<ScanSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    fn next_micros(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last_micros.lock().unwrap_or_else(|e| e.into_inner());
        let next = if now > *last { now } else { *last + 1 };
        *last = next;
        next
    }
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}
