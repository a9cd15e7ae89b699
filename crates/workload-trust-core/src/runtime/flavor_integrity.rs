// crates/workload-trust-core/src/runtime/flavor_integrity.rs
// ============================================================================
// Module: Flavor Integrity Verification
// Description: Signature and chain-of-trust checks for signed image flavors.
// Purpose: Decide whether a flavor was produced by a trusted signer.
// Dependencies: rustls-webpki, x509-parser, rsa, sha2, base64
// ============================================================================

//! ## Overview
//! Each `*.pem` file in the signing directory is one candidate signer: its
//! first certificate is the leaf and the rest are bundled intermediates.
//! Candidates are tried in file-name order and the first one that verifies
//! wins. A leaf that is a self-certified CA is accepted without a chain;
//! every other leaf must chain to a certificate in the trusted CA directory.
//! End-entity leaves are path-validated with webpki; CA leaves are walked
//! issuer by issuer with x509-parser since webpki refuses them as leaves.
//! Invariants:
//! - Every failure collapses to `false`; reasons go to the audit sink.
//! - Both directories are re-read on every call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::TrustAnchor;
use rustls_pki_types::UnixTime;
use sha2::Digest;
use sha2::Sha384;
use thiserror::Error;
use webpki::EndEntityCert;
use webpki::KeyUsage;
use webpki::anchor_from_trusted_cert;
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

use crate::audit::FlavorCheckOutcome;
use crate::audit::FlavorVerificationEvent;
use crate::audit::StderrAuditSink;
use crate::audit::TrustAuditSink;
use crate::certs::list_pem_files;
use crate::certs::load_root_cas;
use crate::certs::read_certificates;
use crate::model::canonical::flavor_signature_payload;
use crate::model::flavor::SignedImageFlavor;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum number of issuers walked above a CA leaf.
const MAX_CA_CHAIN_DEPTH: usize = 8;

// ============================================================================
// SECTION: Candidate Errors
// ============================================================================

/// Reasons a single signing certificate candidate was rejected.
#[derive(Debug, Error)]
enum CandidateError {
    /// Certificate file or leaf could not be read.
    #[error("certificate unreadable: {0}")]
    Certificate(String),
    /// Leaf does not chain to a trusted CA.
    #[error("chain verification failed: {0}")]
    Chain(String),
    /// Leaf public key is not RSA.
    #[error("unsupported public key: {0}")]
    PublicKey(String),
    /// Signature does not match the flavor.
    #[error("signature mismatch: {0}")]
    Signature(String),
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Verifies signed flavors against a signing certificate directory.
#[derive(Debug, Clone)]
pub struct FlavorIntegrityVerifier {
    /// Directory of candidate signing certificates.
    signing_certs_dir: PathBuf,
    /// Directory of trusted root CA certificates.
    trusted_cas_dir: PathBuf,
}

impl FlavorIntegrityVerifier {
    /// Creates a verifier over the given certificate directories.
    #[must_use]
    pub fn new(signing_certs_dir: &Path, trusted_cas_dir: &Path) -> Self {
        Self {
            signing_certs_dir: signing_certs_dir.to_path_buf(),
            trusted_cas_dir: trusted_cas_dir.to_path_buf(),
        }
    }

    /// Verifies a flavor, logging rejected candidates to stderr.
    #[must_use]
    pub fn verify(&self, flavor: &SignedImageFlavor) -> bool {
        self.verify_with_audit(flavor, &StderrAuditSink)
    }

    /// Verifies a flavor, reporting each step to the given audit sink.
    #[must_use]
    pub fn verify_with_audit(&self, flavor: &SignedImageFlavor, audit: &dyn TrustAuditSink) -> bool {
        let flavor_id = flavor.image_flavor.meta.id.as_str();
        let record = |outcome, certificate: Option<&Path>, reason: Option<String>| {
            audit.record_flavor(&FlavorVerificationEvent::new(
                flavor_id,
                outcome,
                certificate,
                reason,
            ));
        };

        let candidates = match list_pem_files(&self.signing_certs_dir) {
            Ok(candidates) => candidates,
            Err(err) => {
                record(FlavorCheckOutcome::DirectoryUnreadable, None, Some(err.to_string()));
                return false;
            }
        };
        let roots = match load_root_cas(&self.trusted_cas_dir) {
            Ok(roots) => roots,
            Err(err) => {
                record(FlavorCheckOutcome::DirectoryUnreadable, None, Some(err.to_string()));
                return false;
            }
        };
        let anchors = match roots
            .iter()
            .map(|der| anchor_from_trusted_cert(der).map(|anchor| anchor.to_owned()))
            .collect::<Result<Vec<TrustAnchor<'static>>, _>>()
        {
            Ok(anchors) => anchors,
            Err(err) => {
                record(
                    FlavorCheckOutcome::DirectoryUnreadable,
                    None,
                    Some(format!("invalid trusted ca: {err}")),
                );
                return false;
            }
        };

        let payload = match flavor_signature_payload(&flavor.image_flavor) {
            Ok(payload) => payload,
            Err(err) => {
                record(FlavorCheckOutcome::PayloadInvalid, None, Some(err.to_string()));
                return false;
            }
        };
        let signature = match STANDARD.decode(flavor.signature.trim()) {
            Ok(signature) => signature,
            Err(err) => {
                record(
                    FlavorCheckOutcome::PayloadInvalid,
                    None,
                    Some(format!("signature is not base64: {err}")),
                );
                return false;
            }
        };
        let digest = Sha384::digest(&payload);
        let now = UnixTime::now();

        let trust = TrustStore {
            roots: &roots,
            anchors: &anchors,
        };
        for path in &candidates {
            match check_candidate(path, &trust, digest.as_slice(), &signature, now) {
                Ok(()) => {
                    record(FlavorCheckOutcome::Verified, Some(path), None);
                    return true;
                }
                Err(err) => {
                    record(FlavorCheckOutcome::CandidateRejected, Some(path), Some(err.to_string()));
                }
            }
        }
        record(
            FlavorCheckOutcome::Untrusted,
            None,
            Some(format!("{} signing certificate(s) tried", candidates.len())),
        );
        false
    }
}

/// Verifies a flavor using a verifier that logs to stderr.
#[must_use]
pub fn verify_flavor_integrity(
    flavor: &SignedImageFlavor,
    signing_certs_dir: &Path,
    trusted_cas_dir: &Path,
) -> bool {
    FlavorIntegrityVerifier::new(signing_certs_dir, trusted_cas_dir).verify(flavor)
}

// ============================================================================
// SECTION: Candidate Checks
// ============================================================================

/// Trusted CA certificates in both forms the chain checks need.
struct TrustStore<'a> {
    /// Trusted CA certificates as loaded.
    roots: &'a [CertificateDer<'static>],
    /// The same certificates as webpki trust anchors.
    anchors: &'a [TrustAnchor<'static>],
}

/// Checks one signing certificate file against the flavor digest.
fn check_candidate(
    path: &Path,
    trust: &TrustStore<'_>,
    digest: &[u8],
    signature: &[u8],
    now: UnixTime,
) -> Result<(), CandidateError> {
    let chain = read_certificates(path).map_err(|err| CandidateError::Certificate(err.to_string()))?;
    let Some((leaf, intermediates)) = chain.split_first() else {
        return Err(CandidateError::Certificate("empty certificate file".to_string()));
    };
    let (_, parsed) = parse_x509_certificate(leaf.as_ref())
        .map_err(|err| CandidateError::Certificate(err.to_string()))?;

    if is_ca(&parsed) {
        if !is_self_certified_ca(&parsed) {
            verify_ca_chain(&parsed, intermediates, trust.roots)?;
        }
    } else {
        verify_chain(leaf, intermediates, trust.anchors, now)?;
    }

    let public_key = RsaPublicKey::from_public_key_der(parsed.public_key().raw)
        .map_err(|err| CandidateError::PublicKey(err.to_string()))?;
    public_key
        .verify(Pkcs1v15Sign::new::<Sha384>(), digest, signature)
        .map_err(|err| CandidateError::Signature(err.to_string()))
}

/// Verifies the leaf chains to one of the anchors through bundled intermediates.
fn verify_chain(
    leaf: &CertificateDer<'static>,
    intermediates: &[CertificateDer<'static>],
    anchors: &[TrustAnchor<'static>],
    now: UnixTime,
) -> Result<(), CandidateError> {
    let end_entity =
        EndEntityCert::try_from(leaf).map_err(|err| CandidateError::Chain(err.to_string()))?;
    end_entity
        .verify_for_usage(
            webpki::ALL_VERIFICATION_ALGS,
            anchors,
            intermediates,
            now,
            KeyUsage::server_auth(),
            None,
            None,
        )
        .map(|_| ())
        .map_err(|err| CandidateError::Chain(err.to_string()))
}

/// Walks a CA leaf up through bundled intermediates to a trusted CA.
fn verify_ca_chain(
    leaf: &X509Certificate<'_>,
    intermediates: &[CertificateDer<'static>],
    roots: &[CertificateDer<'static>],
) -> Result<(), CandidateError> {
    let roots = parse_all(roots)?;
    let intermediates = parse_all(intermediates)?;

    let mut current = leaf;
    for _ in 0..MAX_CA_CHAIN_DEPTH {
        if !current.validity().is_valid() {
            return Err(CandidateError::Chain("certificate outside validity period".to_string()));
        }
        if roots.iter().any(|root| issued_by(current, root)) {
            return Ok(());
        }
        current = intermediates
            .iter()
            .find(|issuer| is_ca(issuer) && issued_by(current, issuer))
            .ok_or_else(|| CandidateError::Chain("no trusted issuer for ca signer".to_string()))?;
    }
    Err(CandidateError::Chain("ca chain too long".to_string()))
}

/// Parses DER certificates for issuer lookups.
fn parse_all<'a>(
    ders: &'a [CertificateDer<'static>],
) -> Result<Vec<X509Certificate<'a>>, CandidateError> {
    ders.iter()
        .map(|der| {
            parse_x509_certificate(der.as_ref())
                .map(|(_, cert)| cert)
                .map_err(|err| CandidateError::Chain(err.to_string()))
        })
        .collect()
}

/// Returns true when `issuer` names and signed `cert`.
fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == issuer.subject().as_raw()
        && cert.verify_signature(Some(issuer.public_key())).is_ok()
}

/// Returns true when basic constraints mark the certificate as a CA.
fn is_ca(cert: &X509Certificate<'_>) -> bool {
    cert.basic_constraints().ok().flatten().is_some_and(|constraints| constraints.value.ca)
}

/// Returns true for a CA certificate that issued and signed itself.
fn is_self_certified_ca(cert: &X509Certificate<'_>) -> bool {
    is_ca(cert)
        && cert.subject().as_raw() == cert.issuer().as_raw()
        && cert.verify_signature(None).is_ok()
}
