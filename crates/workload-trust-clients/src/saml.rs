// crates/workload-trust-clients/src/saml.rs
// ============================================================================
// Module: SAML Signature Verifier
// Description: XML-DSig and signer chain checks for SAML assertions.
// Purpose: Provide the production SAML verifier for key release.
// Dependencies: workload-trust-core, rustls-webpki, x509-parser
// ============================================================================

//! ## Overview
//! The verifier reads the enveloped signature of the assertion, requires the
//! `X509Certificate` in its `KeyInfo` to chain to the SAML CA file or a
//! trusted root, and then checks the reference digest and `SignatureValue`
//! with that certificate's key. Certificates in the SAML CA file act as both
//! anchors and intermediates.
//! Invariants:
//! - Any parse, load, chain or signature failure returns `false`.
//! - The CA file is re-read on every call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use rustls_pki_types::CertificateDer;
use rustls_pki_types::TrustAnchor;
use rustls_pki_types::UnixTime;
use thiserror::Error;
use webpki::EndEntityCert;
use webpki::KeyUsage;
use webpki::anchor_from_trusted_cert;
use workload_trust_core::SamlAssertion;
use workload_trust_core::SamlVerifier;
use workload_trust_core::certs::read_certificates;
use workload_trust_core::saml::SamlError;
use x509_parser::parse_x509_certificate;

use crate::xmldsig::EnvelopedSignature;
use crate::xmldsig::SignatureError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Reasons an assertion failed verification.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SamlVerifyError {
    /// Document is not a readable assertion.
    #[error("{0}")]
    Assertion(#[from] SamlError),
    /// Signature structure, digest or value rejected.
    #[error("{0}")]
    Signature(#[from] SignatureError),
    /// Signature carries no signer certificate.
    #[error("signature has no signer certificate")]
    MissingCertificate,
    /// SAML CA file could not be read.
    #[error("saml ca file unreadable: {0}")]
    CaFile(String),
    /// Signer certificate does not chain to a trusted CA.
    #[error("signer chain rejected: {0}")]
    Chain(String),
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// SAML verifier that checks the enveloped XML signature and its signer chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDsigSamlVerifier;

impl XmlDsigSamlVerifier {
    /// Verifies an assertion, reporting why it was rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SamlVerifyError`] when the assertion is unreadable, its
    /// signer is untrusted, or its content or signature value was altered.
    pub fn verify(
        &self,
        xml: &[u8],
        saml_ca_file: &Path,
        root_cas: &[CertificateDer<'static>],
    ) -> Result<(), SamlVerifyError> {
        SamlAssertion::parse(xml)?;
        let signature = EnvelopedSignature::parse(xml)?;
        let signer = signature.certificate().ok_or(SamlVerifyError::MissingCertificate)?;

        let saml_cas = read_certificates(saml_ca_file)
            .map_err(|err| SamlVerifyError::CaFile(err.to_string()))?;
        let anchors = saml_cas
            .iter()
            .chain(root_cas)
            .map(|der| anchor_from_trusted_cert(der).map(|anchor| anchor.to_owned()))
            .collect::<Result<Vec<TrustAnchor<'static>>, _>>()
            .map_err(|err| SamlVerifyError::CaFile(err.to_string()))?;
        let end_entity = EndEntityCert::try_from(signer)
            .map_err(|err| SamlVerifyError::Chain(err.to_string()))?;
        end_entity
            .verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                &anchors,
                &saml_cas,
                UnixTime::now(),
                KeyUsage::server_auth(),
                None,
                None,
            )
            .map_err(|err| SamlVerifyError::Chain(err.to_string()))?;

        let (_, parsed) = parse_x509_certificate(signer.as_ref())
            .map_err(|err| SamlVerifyError::Chain(err.to_string()))?;
        signature.verify(xml, &parsed)?;
        Ok(())
    }
}

impl SamlVerifier for XmlDsigSamlVerifier {
    fn verify_saml_signature(
        &self,
        xml: &[u8],
        saml_ca_file: &Path,
        root_cas: &[CertificateDer<'static>],
    ) -> bool {
        self.verify(xml, saml_ca_file, root_cas).is_ok()
    }
}
