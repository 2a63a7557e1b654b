//! Secret management service.
//!
//! `SecretService` resolves secrets through a chain of providers in priority
//! order. Resolution precedence: env vars > credentials file; within each
//! provider, workspace-scoped keys win over global ones.

use lamel_types::error::RepositoryError;
use lamel_types::secret::{SecretEntry, SecretScope};

use crate::repository::secret::DynSecretProvider;

/// Service for managing secrets across multiple storage backends.
///
/// Providers are ordered by precedence (first match wins).
pub struct SecretService {
    providers: Vec<DynSecretProvider>,
}

impl SecretService {
    /// Create a new SecretService with the given provider chain.
    ///
    /// Providers should be ordered by precedence (highest priority first).
    pub fn new(providers: Vec<DynSecretProvider>) -> Self {
        Self { providers }
    }

    /// Resolve a secret value by iterating through providers in priority
    /// order.
    ///
    /// For `SecretScope::Workspace`: first tries providers with the workspace
    /// scope, then falls back to global scope.
    pub async fn get_secret(
        &self,
        key: &str,
        scope: &SecretScope,
    ) -> Result<Option<String>, RepositoryError> {
        if let SecretScope::Workspace(_) = scope {
            for provider in &self.providers {
                if let Some(value) = provider.get_boxed(key, scope).await? {
                    return Ok(Some(value));
                }
            }
            for provider in &self.providers {
                if let Some(value) = provider.get_boxed(key, &SecretScope::Global).await? {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        } else {
            for provider in &self.providers {
                if let Some(value) = provider.get_boxed(key, scope).await? {
                    return Ok(Some(value));
                }
            }
            Ok(None)
        }
    }

    /// Store a secret value in the first writable provider.
    ///
    /// Iterates providers in order and writes to the first one that accepts
    /// the write. Read-only providers (e.g., env vars) return an error, which
    /// is skipped.
    pub async fn set_secret(
        &self,
        key: &str,
        value: &str,
        scope: &SecretScope,
    ) -> Result<(), RepositoryError> {
        for provider in &self.providers {
            match provider.set_boxed(key, value, scope).await {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }

        Err(RepositoryError::Query(
            "no writable secret provider available".to_string(),
        ))
    }

    /// List all secrets for a scope, aggregated from all providers and
    /// deduplicated. First provider wins for duplicate keys.
    pub async fn list_secrets(
        &self,
        scope: &SecretScope,
    ) -> Result<Vec<SecretEntry>, RepositoryError> {
        let mut entries: Vec<SecretEntry> = Vec::new();
        for provider in &self.providers {
            for entry in provider.list_boxed(scope).await? {
                if !entries.iter().any(|e| e.key == entry.key) {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
