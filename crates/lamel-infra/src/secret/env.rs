//! Environment variable secret provider.
//!
//! A read-only secret provider that checks environment variables. This is the
//! highest-priority provider in the resolution chain: env vars override the
//! credentials file, which is what a CI runner injecting secrets expects.
//!
//! Key resolution:
//! - Workspace scope: first checks `LAMEL_{WORKSPACE}_{KEY}` (workspace name
//!   uppercased, non-alphanumeric characters mapped to `_`), then falls back
//!   to `LAMEL_{KEY}`.
//! - Global scope: checks `LAMEL_{KEY}`.

use lamel_core::repository::secret::SecretProvider;
use lamel_types::error::RepositoryError;
use lamel_types::secret::{SecretEntry, SecretScope};

/// Environment variable secret provider.
///
/// Read-only: `set()` returns an error because environment variables cannot
/// be persistently modified from here.
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    /// Create a new environment variable secret provider.
    pub fn new() -> Self {
        Self
    }

    /// Env var name for a workspace-scoped key.
    fn workspace_var(workspace: &str, key: &str) -> String {
        let sanitized: String = workspace
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("LAMEL_{sanitized}_{key}")
    }

    fn read(name: &str) -> Option<String> {
        match std::env::var(name) {
            Ok(value) => Some(value),
            // Invalid-unicode values are treated as absent; secrets must be
            // valid strings.
            Err(_) => None,
        }
    }
}

impl Default for EnvSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretProvider for EnvSecretProvider {
    async fn get(&self, key: &str, scope: &SecretScope) -> Result<Option<String>, RepositoryError> {
        if let SecretScope::Workspace(workspace) = scope {
            if let Some(value) = Self::read(&Self::workspace_var(workspace, key)) {
                return Ok(Some(value));
            }
        }

        Ok(Self::read(&format!("LAMEL_{key}")))
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _scope: &SecretScope,
    ) -> Result<(), RepositoryError> {
        // Environment variables are read-only in the context of secret
        // storage. Users set them via the runner environment, not our API.
        Err(RepositoryError::Query(
            "environment variable provider is read-only".to_string(),
        ))
    }

    async fn list(&self, _scope: &SecretScope) -> Result<Vec<SecretEntry>, RepositoryError> {
        // Cannot enumerate environment variables for a specific scope; the
        // credentials file maintains the key index.
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider_get_global() {
        // SAFETY: tests in this module use unique var names and clean up.
        unsafe { std::env::set_var("LAMEL_ENV_TEST_KEY_1", "value-1") };

        let provider = EnvSecretProvider::new();
        let result = provider
            .get("ENV_TEST_KEY_1", &SecretScope::Global)
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("value-1"));

        unsafe { std::env::remove_var("LAMEL_ENV_TEST_KEY_1") };
    }

    #[tokio::test]
    async fn test_env_provider_workspace_prefix_wins() {
        // SAFETY: unique var names, removed at the end of the test.
        unsafe {
            std::env::set_var("LAMEL_ENV_TEST_KEY_2", "global-value");
            std::env::set_var("LAMEL_LAMEL_MO_DEFAULT_ENV_TEST_KEY_2", "workspace-value");
        }

        let provider = EnvSecretProvider::new();
        let scope = SecretScope::Workspace("lamel-mo/default".to_string());
        let result = provider.get("ENV_TEST_KEY_2", &scope).await.unwrap();
        assert_eq!(result.as_deref(), Some("workspace-value"));

        unsafe {
            std::env::remove_var("LAMEL_ENV_TEST_KEY_2");
            std::env::remove_var("LAMEL_LAMEL_MO_DEFAULT_ENV_TEST_KEY_2");
        }
    }

    #[tokio::test]
    async fn test_env_provider_missing_is_none() {
        let provider = EnvSecretProvider::new();
        let result = provider
            .get("ENV_TEST_KEY_ABSENT", &SecretScope::Global)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_env_provider_is_read_only() {
        let provider = EnvSecretProvider::new();
        let err = provider
            .set("KEY", "value", &SecretScope::Global)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_workspace_var_sanitization() {
        assert_eq!(
            EnvSecretProvider::workspace_var("lamel-mo/default", "API_KEY"),
            "LAMEL_LAMEL_MO_DEFAULT_API_KEY"
        );
    }
}
