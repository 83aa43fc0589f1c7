//! KaaS orchestrator service
//!
//! Configuration loading and the HTTP layer in front of `kaas_core`.

pub mod api;
pub mod config;
