// crates/workload-trust-config/src/lib.rs
// ============================================================================
// Module: Workload Trust Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for workload-trust.toml semantics.
// Dependencies: workload-trust-core, workload-trust-clients, serde, toml
// ============================================================================

//! ## Overview
//! `workload-trust-config` defines the configuration model for the workload
//! trust CLI and services. Loading is strict and fails closed.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
