//! Infrastructure implementations for lamel: HTTP clients for the data feed,
//! object store, and loader function; the secret provider chain; SQLite
//! persistence; and configuration loading.

use std::path::PathBuf;

pub mod config;
pub mod credentials;
pub mod extract;
pub mod invoke;
pub mod secret;
pub mod sqlite;
pub mod store;

/// Resolve the lamel data directory.
///
/// `LAMEL_DATA_DIR` wins; otherwise `~/.lamel`; otherwise the current
/// directory (containerized runners without a home directory).
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LAMEL_DATA_DIR") {
        return PathBuf::from(dir);
    }
    match dirs::home_dir() {
        Some(home) => home.join(".lamel"),
        None => PathBuf::from(".lamel"),
    }
}
