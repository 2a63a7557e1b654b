//! Secret provider implementations.
//!
//! - `env`: Environment variable provider (read-only, highest priority)
//! - `file`: TOML credentials file provider (writable; backs `login` and
//!   `secret set`)
//! - `chain`: Secret chain builder wiring the providers together

pub mod chain;
pub mod env;
pub mod file;
