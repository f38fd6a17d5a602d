//! Persistence of the "wallet was connected" flag across runs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::TraderError;

const SESSION_FILE: &str = "session.json";

/// Remembers whether a wallet was connected, gating silent auto-reconnect.
pub trait SessionStore: Send + Sync {
    fn was_connected(&self) -> bool;
    fn set_connected(&self, connected: bool) -> Result<(), TraderError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    connected: AtomicBool,
}

impl MemoryStore {
    pub fn new(connected: bool) -> Self {
        Self { connected: AtomicBool::new(connected) }
    }
}

impl SessionStore for MemoryStore {
    fn was_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_connected(&self, connected: bool) -> Result<(), TraderError> {
        self.connected.store(connected, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    wallet_connected: bool,
}

/// Stores the flag as `session.json` inside a state directory. Clearing
/// the flag removes the file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self { path: state_dir.as_ref().join(SESSION_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileStore {
    fn was_connected(&self) -> bool {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<PersistedSession>(&bytes).ok())
            .is_some_and(|s| s.wallet_connected)
    }

    fn set_connected(&self, connected: bool) -> Result<(), TraderError> {
        if !connected {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(TraderError::Storage(format!("{}: {e}", self.path.display()))),
            };
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| TraderError::Storage(format!("{}: {e}", dir.display())))?;
        }
        let body = serde_json::to_vec(&PersistedSession { wallet_connected: true })
            .map_err(|e| TraderError::Storage(e.to_string()))?;
        fs::write(&self.path, body)
            .map_err(|e| TraderError::Storage(format!("{}: {e}", self.path.display())))
    }
}
