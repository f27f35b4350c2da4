//! Token store: the encrypted, durable home of the access token.
//!
//! The store is the single shared mutable resource of the session core.
//! Writers are the refresh coordinator and the session manager's
//! login/logout; everything else only reads.
//!
//! Reads never fail. A missing, corrupt, foreign, or undecryptable entry is
//! reported as "no token" and logged.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use secrecy::{ExposeSecret, SecretString};

use crate::errors::AuthError;
use crate::secrets::{self, KEY_LEN, TokenCipher};

/// Storage key of the encrypted access token.
pub const STORAGE_KEY: &str = "hirelane.session.token";

/// Name of the plain-text hint used by edge-level route gating.
///
/// Never read back as a credential.
pub const HINT_COOKIE: &str = "access_token";

/// Durable key/value storage behind the token store.
pub trait StorageBackend: Send + Sync {
    /// Read a value. Unreadable storage is reported as `None`.
    fn get(&self, key: &str) -> Option<String>;
    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;
    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), AuthError>;
}

/// In-process storage. Survives nothing; used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _ = self
            .entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _ = self.entries.lock().remove(key);
        Ok(())
    }
}

/// A JSON object on disk, written with 0o600 permissions.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Storage backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "failed to read session storage: {e}");
                return HashMap::new();
            }
        };
        serde_json::from_str(&data).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "failed to parse session storage: {e}");
            HashMap::new()
        })
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }
        Ok(())
    }
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load();
        let _ = entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(&entries)
    }
}

#[derive(Clone)]
enum Cached {
    Unloaded,
    Absent,
    Present(SecretString),
}

struct StoreInner {
    backend: Arc<dyn StorageBackend>,
    cipher: TokenCipher,
    cached: RwLock<Cached>,
}

/// Encrypted access-token store with an in-memory copy.
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.cached.read() {
            Cached::Unloaded => "unloaded",
            Cached::Absent => "absent",
            Cached::Present(_) => "present",
        };
        f.debug_struct("TokenStore").field("token", &state).finish()
    }
}

impl TokenStore {
    /// Create a store over `backend`, encrypting with `key`.
    pub fn new(backend: Arc<dyn StorageBackend>, key: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                cipher: TokenCipher::new(&key),
                cached: RwLock::new(Cached::Unloaded),
            }),
        }
    }

    /// In-memory store with a random key.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), secrets::generate_key())
    }

    /// File-backed store; the key file is created if missing.
    pub fn open(storage_path: &Path, key_path: &Path) -> Result<Self, AuthError> {
        let key = secrets::load_or_create_key(key_path)?;
        Ok(Self::new(Arc::new(FileStorage::new(storage_path)), key))
    }

    /// Current token, or `None` when absent or unreadable.
    pub fn get_token(&self) -> Option<SecretString> {
        if let Cached::Present(token) = &*self.inner.cached.read() {
            return Some(token.clone());
        }
        let mut cached = self.inner.cached.write();
        match &*cached {
            Cached::Present(token) => Some(token.clone()),
            Cached::Absent => None,
            Cached::Unloaded => {
                let loaded = self.load_persisted();
                *cached = loaded
                    .clone()
                    .map_or(Cached::Absent, Cached::Present);
                loaded
            }
        }
    }

    /// Persist an encrypted copy and replace the in-memory token.
    ///
    /// The in-memory token is updated even if persistence fails.
    pub fn set_token(&self, token: SecretString) -> Result<(), AuthError> {
        let encrypted = self.inner.cipher.seal(STORAGE_KEY, token.expose_secret())?;
        let hint = token.expose_secret().to_string();
        *self.inner.cached.write() = Cached::Present(token);

        self.inner.backend.set(STORAGE_KEY, &encrypted)?;
        self.inner.backend.set(HINT_COOKIE, &hint)?;
        tracing::debug!("access token stored");
        Ok(())
    }

    /// Remove the token from memory and from durable storage.
    pub fn clear_token(&self) -> Result<(), AuthError> {
        *self.inner.cached.write() = Cached::Absent;
        self.inner.backend.remove(STORAGE_KEY)?;
        self.inner.backend.remove(HINT_COOKIE)?;
        tracing::debug!("access token cleared");
        Ok(())
    }

    /// The route-gating hint as a cookie string, if a token is stored.
    pub fn cookie_hint(&self) -> Option<String> {
        let token = self.get_token()?;
        Some(format!(
            "{HINT_COOKIE}={}; Path=/; SameSite=Strict",
            token.expose_secret()
        ))
    }

    fn load_persisted(&self) -> Option<SecretString> {
        let encrypted = self.inner.backend.get(STORAGE_KEY)?;
        match self.inner.cipher.open(STORAGE_KEY, &encrypted) {
            Ok(token) => Some(SecretString::from(token)),
            Err(e) => {
                tracing::warn!(error = %e, "stored token unreadable, treating as signed out");
                None
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
