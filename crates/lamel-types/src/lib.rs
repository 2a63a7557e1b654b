//! Shared domain types for lamel.
//!
//! This crate contains the types used across the lamel workspace: flow
//! definitions and execution records, the sales data model, secret scoping,
//! and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod flow;
pub mod sales;
pub mod secret;
