// crates/workload-trust-core/src/audit.rs
// ============================================================================
// Module: Trust Audit Logging
// Description: Structured audit events for flavor verification and key release.
// Purpose: Emit JSON-lines records of trust decisions without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Verification swallows per-candidate errors and key release fails closed;
//! both report what happened through a [`TrustAuditSink`]. Events never carry
//! key material or assertion bodies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Flavor verification step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlavorCheckOutcome {
    /// A signing certificate verified the flavor.
    Verified,
    /// A candidate signing certificate was rejected.
    CandidateRejected,
    /// A certificate directory could not be read.
    DirectoryUnreadable,
    /// The flavor payload or signature could not be prepared.
    PayloadInvalid,
    /// No candidate verified the flavor.
    Untrusted,
}

/// Key release outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyReleaseOutcome {
    /// Key returned from the cache after a fresh attestation.
    ReleasedFromCache,
    /// Key fetched from the key broker.
    ReleasedFromBroker,
    /// Release refused.
    Denied,
}

/// Flavor verification audit event.
#[derive(Debug, Clone, Serialize)]
pub struct FlavorVerificationEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Flavor identifier.
    pub flavor_id: String,
    /// Step outcome.
    pub outcome: FlavorCheckOutcome,
    /// Certificate file the event refers to, when any.
    pub certificate: Option<String>,
    /// Failure reason, when any.
    pub reason: Option<String>,
}

impl FlavorVerificationEvent {
    /// Creates a new flavor verification event with a consistent timestamp.
    #[must_use]
    pub fn new(
        flavor_id: &str,
        outcome: FlavorCheckOutcome,
        certificate: Option<&Path>,
        reason: Option<String>,
    ) -> Self {
        Self {
            event: "flavor_verification",
            timestamp_ms: timestamp_ms(),
            flavor_id: flavor_id.to_string(),
            outcome,
            certificate: certificate.map(|path| path.display().to_string()),
            reason,
        }
    }
}

/// Key release audit event.
#[derive(Debug, Clone, Serialize)]
pub struct KeyReleaseEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Hardware UUID of the requesting host.
    pub hardware_uuid: String,
    /// Key identifier, once parsed.
    pub key_id: Option<String>,
    /// Release outcome.
    pub outcome: KeyReleaseOutcome,
    /// Denial reason, when any.
    pub reason: Option<String>,
}

impl KeyReleaseEvent {
    /// Creates a new key release event with a consistent timestamp.
    #[must_use]
    pub fn new(
        hardware_uuid: &str,
        key_id: Option<&str>,
        outcome: KeyReleaseOutcome,
        reason: Option<String>,
    ) -> Self {
        Self {
            event: "key_release",
            timestamp_ms: timestamp_ms(),
            hardware_uuid: hardware_uuid.to_string(),
            key_id: key_id.map(str::to_string),
            outcome,
            reason,
        }
    }
}

/// Milliseconds since the Unix epoch.
fn timestamp_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for trust decisions.
pub trait TrustAuditSink: Send + Sync {
    /// Record a flavor verification event.
    fn record_flavor(&self, event: &FlavorVerificationEvent);

    /// Record a key release event.
    fn record_key_release(&self, _event: &KeyReleaseEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl TrustAuditSink for StderrAuditSink {
    fn record_flavor(&self, event: &FlavorVerificationEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }

    fn record_key_release(&self, event: &KeyReleaseEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event.
    fn append<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl TrustAuditSink for FileAuditSink {
    fn record_flavor(&self, event: &FlavorVerificationEvent) {
        self.append(event);
    }

    fn record_key_release(&self, event: &KeyReleaseEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl TrustAuditSink for NoopAuditSink {
    fn record_flavor(&self, _event: &FlavorVerificationEvent) {}

    fn record_key_release(&self, _event: &KeyReleaseEvent) {}
}
