//! Credential and identity storage.
//!
//! DESIGN
//! ======
//! The session is the only writer; the request client only reads the
//! credential before each attempt. `MemoryStore` lives as long as the
//! process. `FileStore` mirrors the same record into a JSON file so a CLI
//! keeps its session between invocations.
//!
//! TRADE-OFFS
//! ==========
//! Storage is best-effort: an unreadable or unwritable file is logged and
//! treated as an empty store rather than failing the request path.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::Identity;

/// Proof of an authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "token", rename_all = "snake_case")]
pub enum Credential {
    /// Opaque access token sent as `Authorization: Bearer`.
    Bearer(String),
    /// Cookie held by the HTTP client's jar; only its presence is tracked here.
    Cookie,
}

impl Credential {
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            Self::Cookie => None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Cookie => f.write_str("Cookie"),
        }
    }
}

/// Everything a store persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

/// Storage area for the current credential and, optionally, a mirrored identity.
pub trait CredentialStore: Send + Sync {
    fn credential(&self) -> Option<Credential>;
    fn set_credential(&self, credential: Credential);
    fn identity(&self) -> Option<Identity>;
    fn set_identity(&self, identity: Option<Identity>);
    /// Drop credential and identity together.
    fn clear(&self);
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoredSession>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential, as if a previous login happened.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self { inner: Mutex::new(StoredSession { credential: Some(credential), identity: None }) }
    }

    fn with<R>(&self, f: impl FnOnce(&mut StoredSession) -> R) -> R {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut inner)
    }
}

impl CredentialStore for MemoryStore {
    fn credential(&self) -> Option<Credential> {
        self.with(|s| s.credential.clone())
    }

    fn set_credential(&self, credential: Credential) {
        self.with(|s| s.credential = Some(credential));
    }

    fn identity(&self) -> Option<Identity> {
        self.with(|s| s.identity.clone())
    }

    fn set_identity(&self, identity: Option<Identity>) {
        self.with(|s| s.identity = identity);
    }

    fn clear(&self) {
        self.with(|s| *s = StoredSession::default());
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON-file backed store. Every mutation rewrites the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<StoredSession>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = load_file(&path);
        Self { path, inner: Mutex::new(inner) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut StoredSession)) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut inner);
        persist_file(&self.path, &inner);
    }

    fn read<R>(&self, f: impl FnOnce(&StoredSession) -> R) -> R {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&inner)
    }
}

impl CredentialStore for FileStore {
    fn credential(&self) -> Option<Credential> {
        self.read(|s| s.credential.clone())
    }

    fn set_credential(&self, credential: Credential) {
        self.update(|s| s.credential = Some(credential));
    }

    fn identity(&self) -> Option<Identity> {
        self.read(|s| s.identity.clone())
    }

    fn set_identity(&self, identity: Option<Identity>) {
        self.update(|s| s.identity = identity);
    }

    fn clear(&self) {
        self.update(|s| *s = StoredSession::default());
    }
}

fn load_file(path: &Path) -> StoredSession {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoredSession::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "session file unreadable; starting empty");
            return StoredSession::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "session file corrupt; starting empty");
        StoredSession::default()
    })
}

fn persist_file(path: &Path, session: &StoredSession) {
    if *session == StoredSession::default() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove session file");
            }
        }
        return;
    }

    let result = serde_json::to_vec_pretty(session)
        .map_err(std::io::Error::other)
        .and_then(|bytes| std::fs::write(path, bytes));
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to write session file");
    }
}

#[cfg(test)]
#[path = "credential_test.rs"]
mod tests;
