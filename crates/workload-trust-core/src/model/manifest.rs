// crates/workload-trust-core/src/model/manifest.rs
// ============================================================================
// Module: Instance Manifests
// Description: Host-agent description of a running instance.
// Purpose: Provide the observed facts that flavor rules are evaluated against.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`InstanceManifest`] is produced by the host agent at launch time. The
//! core treats it as immutable input and embeds it by value in trust reports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Observed state of a launched instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceManifest {
    /// Instance identifier (UUIDv4 string).
    pub instance_id: String,
    /// Hardware UUID of the host running the instance.
    pub host_hardware_uuid: String,
    /// Image identifier (UUIDv4 string).
    pub image_id: String,
    /// Whether the launched image was encrypted.
    pub image_encrypted: bool,
    /// Whether container image integrity was enforced at launch.
    #[serde(default)]
    pub image_integrity_enforced: bool,
}
