//! dbplane: declarative reconciliation for managed distributed SQL clusters
//!
//! Callers describe clusters, VPCs, allow lists, read replicas, backups,
//! telemetry integrations and audit log exports as specs. The engine
//! creates, updates and deletes them through the provider's REST API and
//! reports the settled state.

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;

pub use crate::error::{Error, Result};
