// crates/workload-trust-core/src/model/mod.rs
// ============================================================================
// Module: Workload Trust Core Types
// Description: Wire model for flavors, manifests, rules and reports.
// Purpose: Group the data types shared by verification and key release.
// Dependencies: serde, time, uuid
// ============================================================================

//! ## Overview
//! Data types only; evaluation lives in [`crate::runtime`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod canonical;
pub mod clock;
pub mod flavor;
pub mod manifest;
pub mod report;
pub mod rules;
pub mod validation;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use canonical::CanonicalError;
pub use canonical::flavor_signature_payload;
pub use clock::Clock;
pub use clock::FixedClock;
pub use clock::SystemClock;
pub use flavor::FLAVOR_PART_CONTAINER_IMAGE;
pub use flavor::FLAVOR_PART_IMAGE;
pub use flavor::FlavorDescription;
pub use flavor::FlavorEncryption;
pub use flavor::FlavorMeta;
pub use flavor::FlavorPart;
pub use flavor::ImageFlavor;
pub use flavor::SignedImageFlavor;
pub use manifest::InstanceManifest;
pub use report::CONTAINER_POLICY_NAME;
pub use report::InstanceTrustReport;
pub use report::RuleResult;
pub use report::VM_POLICY_NAME;
pub use rules::EncryptionMatches;
pub use rules::ExpectedValue;
pub use rules::FLAVOR_NOT_TRUSTED;
pub use rules::Fault;
pub use rules::FlavorIntegrityMatches;
pub use rules::IntegrityMatches;
pub use rules::Rule;
pub use rules::RuleOutcome;
