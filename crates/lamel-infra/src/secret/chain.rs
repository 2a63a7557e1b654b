//! Secret chain builder -- wires concrete providers in priority order.
//!
//! This module lives in `lamel-infra` because it assembles concrete provider
//! implementations. The resulting chain is passed to `SecretService` in
//! `lamel-core` via the `DynSecretProvider` abstraction.
//!
//! Default chain order: `[EnvSecretProvider, CredentialsFileProvider]`

use std::sync::Arc;

use lamel_core::repository::secret::DynSecretProvider;

use super::env::EnvSecretProvider;
use super::file::CredentialsFileProvider;

/// Build the default secret resolution chain.
///
/// The chain is ordered by precedence (first match wins):
/// 1. Environment variables (if `include_env` is true) -- what a CI runner
///    injects wins over anything stored locally.
/// 2. The credentials file (always included; the only writable backend).
pub fn build_secret_chain(
    file: CredentialsFileProvider,
    include_env: bool,
) -> Vec<DynSecretProvider> {
    let mut chain: Vec<DynSecretProvider> = Vec::new();

    if include_env {
        chain.push(Arc::new(EnvSecretProvider::new()));
    }

    chain.push(Arc::new(file));

    chain
}
