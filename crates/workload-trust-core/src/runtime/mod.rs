// crates/workload-trust-core/src/runtime/mod.rs
// ============================================================================
// Module: Workload Trust Runtime
// Description: Flavor verification, trust evaluation and key release.
// Purpose: Group the evaluation components built on the core model.
// Dependencies: crate::model, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime components are synchronous and hold no mutable state apart from
//! the shared [`KeyCache`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod flavor_integrity;
pub mod key_cache;
pub mod key_release;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::TrustVerifier;
pub use engine::VerificationError;
pub use engine::verify;
pub use flavor_integrity::FlavorIntegrityVerifier;
pub use flavor_integrity::verify_flavor_integrity;
pub use key_cache::CachedKey;
pub use key_cache::KeyCache;
pub use key_release::DEFAULT_CACHE_TTL_SECONDS;
pub use key_release::KeyReleaseConfig;
pub use key_release::KeyReleaseError;
pub use key_release::KeyReleaseGate;
