//! TOML credentials file provider.
//!
//! Stores secrets in `{data_dir}/credentials.toml`, grouped by scope:
//!
//! ```toml
//! [global]
//! STORE_BUCKET = "sales-data"
//!
//! [workspaces."lamel-mo/default"]
//! API_KEY = "..."
//! EXTRACT_API_KEY = "..."
//! ```
//!
//! This is the writable backend behind `lamel login` and `lamel secret set`.
//! The file is re-read on every lookup so concurrent CLI invocations observe
//! each other's writes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use lamel_core::repository::secret::SecretProvider;
use lamel_types::error::RepositoryError;
use lamel_types::secret::{SecretEntry, SecretScope};
use serde::{Deserialize, Serialize};

/// On-disk shape of the credentials file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    global: BTreeMap<String, String>,
    #[serde(default)]
    workspaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl CredentialsFile {
    fn section(&self, scope: &SecretScope) -> Option<&BTreeMap<String, String>> {
        match scope {
            SecretScope::Global => Some(&self.global),
            SecretScope::Workspace(name) => self.workspaces.get(name),
        }
    }

    fn section_mut(&mut self, scope: &SecretScope) -> &mut BTreeMap<String, String> {
        match scope {
            SecretScope::Global => &mut self.global,
            SecretScope::Workspace(name) => self.workspaces.entry(name.clone()).or_default(),
        }
    }
}

/// Secret provider backed by a TOML credentials file.
pub struct CredentialsFileProvider {
    path: PathBuf,
}

impl CredentialsFileProvider {
    /// Create a provider over the given file path. The file need not exist
    /// yet; it is created on first write.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn read_file(&self) -> Result<CredentialsFile, RepositoryError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CredentialsFile::default());
            }
            Err(err) => {
                return Err(RepositoryError::Query(format!(
                    "failed to read credentials file: {err}"
                )));
            }
        };

        toml::from_str(&content)
            .map_err(|e| RepositoryError::Query(format!("invalid credentials file: {e}")))
    }

    async fn write_file(&self, file: &CredentialsFile) -> Result<(), RepositoryError> {
        let content = toml::to_string_pretty(file)
            .map_err(|e| RepositoryError::Query(format!("failed to render credentials: {e}")))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RepositoryError::Query(format!("failed to create credentials dir: {e}"))
            })?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to write credentials file: {e}")))
    }
}

impl SecretProvider for CredentialsFileProvider {
    async fn get(&self, key: &str, scope: &SecretScope) -> Result<Option<String>, RepositoryError> {
        let file = self.read_file().await?;
        Ok(file.section(scope).and_then(|s| s.get(key)).cloned())
    }

    async fn set(&self, key: &str, value: &str, scope: &SecretScope) -> Result<(), RepositoryError> {
        let mut file = self.read_file().await?;
        file.section_mut(scope)
            .insert(key.to_string(), value.to_string());
        self.write_file(&file).await
    }

    async fn list(&self, scope: &SecretScope) -> Result<Vec<SecretEntry>, RepositoryError> {
        let file = self.read_file().await?;
        Ok(file
            .section(scope)
            .map(|section| {
                section
                    .keys()
                    .map(|key| SecretEntry {
                        key: key.clone(),
                        scope: scope.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
