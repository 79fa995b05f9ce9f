//! Persistent caller identity
//!
//! End users connecting for the first time have no id; the server assigns one
//! during the handshake and the client keeps it for later sessions.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{RealtimeError, RealtimeResult};

/// Where the caller id is read from and written back to
pub trait IdentityStore: Send + Sync + 'static {
    fn load(&self) -> Option<String>;
    fn store(&self, caller_id: &str) -> RealtimeResult<()>;
}

/// Identity kept for the lifetime of the process only
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    caller_id: RwLock<Option<String>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caller_id(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: RwLock::new(Some(caller_id.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Option<String> {
        self.caller_id.read().clone()
    }

    fn store(&self, caller_id: &str) -> RealtimeResult<()> {
        *self.caller_id.write() = Some(caller_id.to_string());
        Ok(())
    }
}

/// Identity persisted as a small JSON document on disk
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityDocument {
    caller_id: String,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<IdentityDocument>(&raw) {
            Ok(doc) if !doc.caller_id.is_empty() => Some(doc.caller_id),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable identity file");
                None
            }
        }
    }

    fn store(&self, caller_id: &str) -> RealtimeResult<()> {
        let doc = IdentityDocument {
            caller_id: caller_id.to_string(),
        };
        let json = serde_json::to_string(&doc)?;
        std::fs::write(&self.path, json)
            .map_err(|e| RealtimeError::Identity(format!("{}: {}", self.path.display(), e)))
    }
}
