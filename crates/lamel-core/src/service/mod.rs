//! Core services built on the repository traits.

pub mod secret;
