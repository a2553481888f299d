// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque secret store with get/put/delete by key.
//!
//! File-backed: a JSON object under the support directory with 0600
//! permissions. Holds operator-provided material such as tunnel
//! credentials; nothing on the event delivery path reads it.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use hookwire_core::HookwireError;

/// File-backed key/value secret store.
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    /// Store secrets in `secrets.json` under `support_dir`.
    pub fn new(support_dir: &Path) -> Self {
        Self {
            path: support_dir.join("secrets.json"),
        }
    }

    /// Fetch one secret.
    pub fn get(&self, key: &str) -> Result<Option<String>, HookwireError> {
        Ok(self.load()?.get(key).cloned())
    }

    /// Insert or replace one secret.
    pub fn put(&self, key: &str, value: &str) -> Result<(), HookwireError> {
        let mut secrets = self.load()?;
        secrets.insert(key.to_string(), value.to_string());
        self.save(&secrets)
    }

    /// Remove one secret. Idempotent.
    pub fn delete(&self, key: &str) -> Result<(), HookwireError> {
        let mut secrets = self.load()?;
        if secrets.remove(key).is_some() {
            self.save(&secrets)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, String>, HookwireError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                HookwireError::Internal(format!(
                    "secret store at {} is corrupt: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(HookwireError::Internal(format!(
                "cannot read secret store: {e}"
            ))),
        }
    }

    fn save(&self, secrets: &BTreeMap<String, String>) -> Result<(), HookwireError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HookwireError::Internal(format!("cannot create {}: {e}", parent.display())))?;
        }
        let content = serde_json::to_string_pretty(secrets)
            .map_err(|e| HookwireError::Internal(format!("serialize secrets: {e}")))?;
        std::fs::write(&self.path, content)
            .map_err(|e| HookwireError::Internal(format!("write secrets: {e}")))?;
        std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| HookwireError::Internal(format!("chmod secrets: {e}")))?;
        Ok(())
    }
}
