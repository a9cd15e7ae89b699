// crates/workload-trust-core/src/interfaces/mod.rs
// ============================================================================
// Module: Workload Trust Interfaces
// Description: Contracts for attestation, SAML verification and key brokering.
// Purpose: Keep key release independent of transports and signature stacks.
// Dependencies: rustls-pki-types, serde, thiserror, url
// ============================================================================

//! ## Overview
//! Key release depends on three external collaborators. Implementations must
//! fail closed: any transport, status or decoding problem is an error, and a
//! SAML verifier that cannot complete its checks returns `false`.
//!
//! Security posture: responses from these collaborators are untrusted until
//! the key release gate has verified them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use rustls_pki_types::CertificateDer;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Attestation Service
// ============================================================================

/// Attestation service errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AttestationError {
    /// Request could not be built or sent.
    #[error("attestation request failed: {0}")]
    Transport(String),
    /// Service answered with a non-success status.
    #[error("attestation service returned status {0}")]
    Status(u16),
    /// Response body was unusable.
    #[error("attestation response invalid: {0}")]
    InvalidResponse(String),
}

/// Source of fresh host attestation reports.
pub trait AttestationService: Send + Sync {
    /// Fetches the latest SAML report for a host.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError`] when no report can be obtained.
    fn fetch_saml_report(&self, hardware_uuid: &str) -> Result<Vec<u8>, AttestationError>;
}

// ============================================================================
// SECTION: SAML Verifier
// ============================================================================

/// Verifier of SAML assertion signatures.
pub trait SamlVerifier: Send + Sync {
    /// Returns true when the assertion signature chains to a trusted CA.
    fn verify_saml_signature(
        &self,
        xml: &[u8],
        saml_ca_file: &Path,
        root_cas: &[CertificateDer<'static>],
    ) -> bool;
}

// ============================================================================
// SECTION: Key Broker
// ============================================================================

/// Key broker location and the CAs trusted for its TLS endpoint.
#[derive(Debug, Clone)]
pub struct BrokerEndpoint {
    /// Base URL, ending with `/`, that `keys/<id>/transfer` is joined onto.
    pub base_url: Url,
    /// Root CAs trusted for the broker connection.
    pub root_cas: Vec<CertificateDer<'static>>,
}

/// Key broker transfer response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTransfer {
    /// Base64 encoded key material.
    pub wrapped_key: String,
}

/// Key broker errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Request could not be built or sent.
    #[error("key broker request failed: {0}")]
    Transport(String),
    /// Broker answered with a non-success status.
    #[error("key broker returned status {0}")]
    Status(u16),
    /// Response body was unusable.
    #[error("key broker response invalid: {0}")]
    InvalidResponse(String),
}

/// Key broker releasing keys against a SAML assertion.
pub trait KeyBroker: Send + Sync {
    /// Requests a key transfer authorized by the given assertion.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the broker refuses or cannot be reached.
    fn transfer_key_with_saml(
        &self,
        endpoint: &BrokerEndpoint,
        key_id: &str,
        saml: &[u8],
    ) -> Result<KeyTransfer, BrokerError>;
}
