// crates/workload-trust-core/src/lib.rs
// ============================================================================
// Module: Workload Trust Core
// Description: Attestation-gated trust evaluation and key release.
// Purpose: Decide whether images may run and whether hosts may receive keys.
// Dependencies: serde, rustls-webpki, x509-parser, rsa, xmltree, time
// ============================================================================

//! ## Overview
//! Workload trust core verifies signed image flavors, evaluates instance
//! manifests against flavor policy, and releases image decryption keys only to
//! hosts whose fresh attestation verifies and reports them trusted.
//! Invariants:
//! - Trust decisions fail closed: errors never produce a trusted result.
//! - Transports and signature stacks stay behind [`interfaces`] traits.
//!
//! Security posture: flavors, manifests and attestation reports are untrusted
//! inputs until verified.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod certs;
pub mod interfaces;
pub mod model;
pub mod runtime;
pub mod saml;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::TrustAuditSink;
pub use interfaces::AttestationError;
pub use interfaces::AttestationService;
pub use interfaces::BrokerEndpoint;
pub use interfaces::BrokerError;
pub use interfaces::KeyBroker;
pub use interfaces::KeyTransfer;
pub use interfaces::SamlVerifier;
pub use model::ImageFlavor;
pub use model::InstanceManifest;
pub use model::InstanceTrustReport;
pub use model::Rule;
pub use model::RuleResult;
pub use model::SignedImageFlavor;
pub use runtime::FlavorIntegrityVerifier;
pub use runtime::KeyCache;
pub use runtime::KeyReleaseConfig;
pub use runtime::KeyReleaseError;
pub use runtime::KeyReleaseGate;
pub use runtime::TrustVerifier;
pub use runtime::VerificationError;
pub use saml::SamlAssertion;
