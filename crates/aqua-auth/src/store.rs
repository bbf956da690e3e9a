//! Credential store.
//!
//! Holds the access and renewal credentials for the whole process behind a
//! cloneable handle. Values are obfuscated (XOR with a fixed key, then
//! base64url) before they reach disk; this keeps them out of casual view
//! and is not a security boundary.
//!
//! File-backed stores persist to a JSON file shared by every console
//! process of the user:
//!
//! ```json
//! {"version":1,"entries":{"access_token":"…","refresh_token":"…"},"lastUpdated":"…"}
//! ```
//!
//! Changes written by *other* processes are picked up by
//! [`CredentialStore::sync_from_disk`] (driven by [`CredentialStore::watch`])
//! and broadcast to [`CredentialStore::subscribe`] receivers. Writes made
//! through this handle update the in-process mirror under the same lock as
//! the file write, so they never come back as change notifications.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use notify::{RecursiveMode, Watcher as _};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::errors::AuthError;
use crate::types::{CredentialChange, CredentialKind, CredentialPair};

/// Current credential file format version.
const STORAGE_VERSION: u32 = 1;

/// Fixed obfuscation key.
const OBFUSCATION_KEY: &[u8] = b"aqua-console/credential-store";

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredentials {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
    #[serde(default)]
    last_updated: String,
}

/// Shared handle to the process-wide credential store.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    /// Backing file; `None` for in-memory stores.
    path: Option<PathBuf>,
    /// Obfuscated values keyed by storage key.
    entries: RwLock<BTreeMap<String, String>>,
    changes: broadcast::Sender<CredentialChange>,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl CredentialStore {
    /// Store that lives only in this process.
    pub fn in_memory() -> Self {
        Self::with_entries(None, BTreeMap::new())
    }

    /// Store backed by `path`, loading whatever is there now.
    ///
    /// A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        Self::with_entries(Some(path), entries)
    }

    fn with_entries(path: Option<PathBuf>, entries: BTreeMap<String, String>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                path,
                entries: RwLock::new(entries),
                changes,
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Read one credential.
    ///
    /// A value that fails to deobfuscate reads as `None`.
    pub fn get(&self, kind: CredentialKind) -> Option<String> {
        let raw = self.inner.entries.read().get(kind.storage_key()).cloned()?;
        let value = deobfuscate(&raw);
        if value.is_none() {
            tracing::warn!(key = kind.storage_key(), "discarding unreadable credential value");
        }
        value
    }

    /// Both credentials, if both are present and readable.
    pub fn pair(&self) -> Option<CredentialPair> {
        Some(CredentialPair {
            access: self.get(CredentialKind::Access)?,
            renewal: self.get(CredentialKind::Renewal)?,
        })
    }

    /// Write one credential.
    pub fn set(&self, kind: CredentialKind, value: &str) -> Result<(), AuthError> {
        self.mutate(|entries| {
            let _ = entries.insert(kind.storage_key().to_string(), obfuscate(value));
        })
    }

    /// Replace both credentials in a single write.
    pub fn set_pair(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        self.mutate(|entries| {
            let _ = entries.insert(
                CredentialKind::Access.storage_key().to_string(),
                obfuscate(&pair.access),
            );
            let _ = entries.insert(
                CredentialKind::Renewal.storage_key().to_string(),
                obfuscate(&pair.renewal),
            );
        })
    }

    /// Remove both credentials.
    pub fn clear(&self) -> Result<(), AuthError> {
        self.mutate(|entries| {
            for kind in CredentialKind::ALL {
                let _ = entries.remove(kind.storage_key());
            }
        })
    }

    /// Receive notifications for credentials changed by other processes.
    pub fn subscribe(&self) -> broadcast::Receiver<CredentialChange> {
        self.inner.changes.subscribe()
    }

    /// Reconcile the in-process mirror with the backing file.
    ///
    /// Every credential whose persisted value differs from the mirror is
    /// adopted and broadcast as a [`CredentialChange`]. Returns the changes.
    /// In-memory stores never change.
    pub fn sync_from_disk(&self) -> Vec<CredentialChange> {
        let Some(path) = self.inner.path.as_deref() else {
            return Vec::new();
        };

        let changes = {
            let mut entries = self.inner.entries.write();
            let on_disk = load_entries(path);
            let mut changes = Vec::new();
            for kind in CredentialKind::ALL {
                let key = kind.storage_key();
                let current = entries.get(key);
                let persisted = on_disk.get(key);
                if current == persisted {
                    continue;
                }
                match persisted {
                    Some(raw) => {
                        let _ = entries.insert(key.to_string(), raw.clone());
                    }
                    None => {
                        let _ = entries.remove(key);
                    }
                }
                changes.push(CredentialChange {
                    kind,
                    value: persisted.and_then(|raw| deobfuscate(raw)),
                });
            }
            changes
        };

        for change in &changes {
            tracing::debug!(key = change.kind.storage_key(), "credential changed by another process");
            let _ = self.inner.changes.send(change.clone());
        }
        changes
    }

    /// Watch the backing file and sync whenever another process writes it.
    ///
    /// No-op for in-memory stores. Calling it again replaces the watcher.
    pub fn watch(&self) -> Result<(), AuthError> {
        let Some(path) = self.inner.path.clone() else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let file_name = path.file_name().map(std::ffi::OsStr::to_os_string);
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "credential watcher error");
                        return;
                    }
                };
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(std::ffi::OsStr::to_os_string) == file_name);
                if !touches_file {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    let _ = CredentialStore { inner }.sync_from_disk();
                }
            })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::debug!(path = %path.display(), "watching credential file");
        *self.inner.watcher.lock() = Some(watcher);
        Ok(())
    }

    /// Stop watching the backing file.
    pub fn unwatch(&self) {
        let _ = self.inner.watcher.lock().take();
    }

    /// Apply `f` to a copy of the mirror, persist it, then adopt it.
    ///
    /// The mirror only changes once the file write succeeded, so a failed
    /// write leaves both as they were.
    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), AuthError> {
        let mut entries = self.inner.entries.write();
        let mut updated = entries.clone();
        f(&mut updated);
        if let Some(path) = self.inner.path.as_deref() {
            save_entries(path, &updated)?;
        }
        *entries = updated;
        Ok(())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

// ── Obfuscation ─────────────────────────────────────────────────────────────

/// Reversibly scramble a credential for storage.
pub fn obfuscate(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(xor_with_key(value.as_bytes()))
}

/// Reverse [`obfuscate`]. Returns `None` for anything it did not produce.
pub fn deobfuscate(raw: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    String::from_utf8(xor_with_key(&bytes)).ok()
}

fn xor_with_key(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

// ── File I/O ────────────────────────────────────────────────────────────────

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    let data = match std::fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!("failed to read credential file: {e}");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<StoredCredentials>(&data) {
        Ok(stored) if stored.version == STORAGE_VERSION => stored.entries,
        Ok(stored) => {
            tracing::warn!("unsupported credential file version: {}", stored.version);
            BTreeMap::new()
        }
        Err(e) => {
            tracing::warn!("failed to parse credential file: {e}");
            BTreeMap::new()
        }
    }
}

/// Write the file atomically with 0o600 permissions.
///
/// Each write goes through its own uniquely named temp file in the target
/// directory, so concurrent writers from several processes never share one.
fn save_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let stored = StoredCredentials {
        version: STORAGE_VERSION,
        entries: entries.clone(),
        last_updated: chrono::Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_string_pretty(&stored)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    let _ = tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
