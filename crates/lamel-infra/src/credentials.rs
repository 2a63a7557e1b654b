//! The credential block required by the ETL clients.
//!
//! Resolution goes through the secret chain (env vars first, then the
//! credentials file), scoped to the active workspace with global fallback.
//! A missing key aborts immediately, naming the key, so a misconfigured
//! runner fails before any external call is made.

use lamel_core::service::secret::SecretService;
use lamel_types::error::RepositoryError;
use lamel_types::secret::SecretScope;
use secrecy::SecretString;
use thiserror::Error;

/// API key for the data feed.
pub const EXTRACT_API_KEY: &str = "EXTRACT_API_KEY";
/// Object store access key ID (sent as a request header).
pub const STORE_ACCESS_KEY_ID: &str = "STORE_ACCESS_KEY_ID";
/// Object store secret access key (bearer credential).
pub const STORE_SECRET_ACCESS_KEY: &str = "STORE_SECRET_ACCESS_KEY";
/// Target bucket for uploads.
pub const STORE_BUCKET: &str = "STORE_BUCKET";
/// Workspace API key established by `lamel login`; gates deploy and run.
pub const API_KEY: &str = "API_KEY";

/// Errors during credential resolution.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// A required key is absent from every provider.
    #[error("missing credential '{key}' (set it with `lamel secret set {key}` or the env var LAMEL_{key})")]
    Missing { key: &'static str },

    #[error("credential lookup failed: {0}")]
    Provider(#[from] RepositoryError),
}

/// The resolved credential block for a run.
///
/// Secret values are wrapped in [`SecretString`] so they never appear in
/// Debug output or logs.
#[derive(Debug)]
pub struct Credentials {
    pub extract_api_key: SecretString,
    pub store_access_key_id: String,
    pub store_secret_access_key: SecretString,
    pub bucket: String,
}

impl Credentials {
    /// Resolve the full credential block, failing fast on the first missing
    /// key.
    pub async fn load(
        secrets: &SecretService,
        scope: &SecretScope,
    ) -> Result<Self, CredentialsError> {
        let extract_api_key = require(secrets, EXTRACT_API_KEY, scope).await?;
        let store_access_key_id = require(secrets, STORE_ACCESS_KEY_ID, scope).await?;
        let store_secret_access_key = require(secrets, STORE_SECRET_ACCESS_KEY, scope).await?;
        let bucket = require(secrets, STORE_BUCKET, scope).await?;

        Ok(Self {
            extract_api_key: SecretString::from(extract_api_key),
            store_access_key_id,
            store_secret_access_key: SecretString::from(store_secret_access_key),
            bucket,
        })
    }
}

/// Resolve the workspace API key established by `lamel login`.
pub async fn require_api_key(
    secrets: &SecretService,
    scope: &SecretScope,
) -> Result<SecretString, CredentialsError> {
    require(secrets, API_KEY, scope)
        .await
        .map(SecretString::from)
}

async fn require(
    secrets: &SecretService,
    key: &'static str,
    scope: &SecretScope,
) -> Result<String, CredentialsError> {
    secrets
        .get_secret(key, scope)
        .await?
        .ok_or(CredentialsError::Missing { key })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::file::CredentialsFileProvider;
    use secrecy::ExposeSecret;
    use std::sync::Arc;

    fn workspace() -> SecretScope {
        SecretScope::Workspace("lamel-mo/default".to_string())
    }

    async fn service_with(entries: &[(&str, &str)]) -> SecretService {
        let dir = tempfile::tempdir().unwrap();
        // Leak the tempdir so the file survives the service (test-only)
        let path = dir.keep().join("credentials.toml");
        let provider = CredentialsFileProvider::new(path);
        for (key, value) in entries {
            use lamel_core::repository::secret::SecretProvider;
            provider.set(key, value, &workspace()).await.unwrap();
        }
        SecretService::new(vec![Arc::new(provider)])
    }

    #[tokio::test]
    async fn test_load_full_block() {
        let service = service_with(&[
            (EXTRACT_API_KEY, "feed-key"),
            (STORE_ACCESS_KEY_ID, "AKIA123"),
            (STORE_SECRET_ACCESS_KEY, "store-secret"),
            (STORE_BUCKET, "sales-data"),
        ])
        .await;

        let credentials = Credentials::load(&service, &workspace()).await.unwrap();
        assert_eq!(credentials.extract_api_key.expose_secret(), "feed-key");
        assert_eq!(credentials.store_access_key_id, "AKIA123");
        assert_eq!(credentials.bucket, "sales-data");
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast_with_key_name() {
        let service = service_with(&[(EXTRACT_API_KEY, "feed-key")]).await;

        let err = Credentials::load(&service, &workspace()).await.unwrap_err();
        match err {
            CredentialsError::Missing { key } => assert_eq!(key, STORE_ACCESS_KEY_ID),
            other => panic!("expected Missing, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_require_api_key() {
        let service = service_with(&[(API_KEY, "workspace-key")]).await;
        let key = require_api_key(&service, &workspace()).await.unwrap();
        assert_eq!(key.expose_secret(), "workspace-key");

        let empty = service_with(&[]).await;
        let err = require_api_key(&empty, &workspace()).await.unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }
}
