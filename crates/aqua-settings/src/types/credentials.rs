//! Credential persistence settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where and how credentials are persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialSettings {
    /// Credential file. Relative paths resolve against the aqua home directory.
    pub path: String,
    /// Watch the file for changes made by other console processes.
    pub watch: bool,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            path: "credentials.json".to_string(),
            watch: true,
        }
    }
}

impl CredentialSettings {
    /// Resolve the credential file path against `home`.
    pub fn resolve_path(&self, home: &Path) -> PathBuf {
        let configured = Path::new(&self.path);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            home.join(configured)
        }
    }
}
