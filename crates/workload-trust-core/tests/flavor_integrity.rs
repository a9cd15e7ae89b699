// crates/workload-trust-core/tests/flavor_integrity.rs
// ============================================================================
// Module: Flavor Integrity Tests
// Description: Signature and chain-of-trust checks for signed flavors.
// Purpose: Confirm only flavors signed by trusted signers verify.
// Dependencies: workload-trust-core, tempfile
// ============================================================================
//! ## Overview
//! Exercises the flavor integrity verifier against checked-in PKI fixtures.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use common::RecordingAuditSink;
use common::cert_dir;
use common::image_flavor;
use common::sign_flavor;
use workload_trust_core::FlavorIntegrityVerifier;
use workload_trust_core::audit::FlavorCheckOutcome;
use workload_trust_core::model::FLAVOR_PART_IMAGE;
use workload_trust_core::runtime::verify_flavor_integrity;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn outcomes(audit: &RecordingAuditSink) -> Vec<FlavorCheckOutcome> {
    audit.flavor_events.lock().unwrap().iter().map(|event| event.outcome).collect()
}

// ============================================================================
// SECTION: Trusted Signers
// ============================================================================

#[test]
fn leaf_signed_by_trusted_root_verifies() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, true, false), "signer.key");

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(outcomes(&audit), vec![FlavorCheckOutcome::Verified]);
}

#[test]
fn bundled_intermediates_complete_the_chain() {
    let signers = cert_dir(&["chained-signer-bundle.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "chained-signer.key");

    assert!(verify_flavor_integrity(&flavor, signers.path(), cas.path()));
}

#[test]
fn self_certified_ca_signer_needs_no_trusted_ca() {
    let signers = cert_dir(&["self-ca-signer.pem"]);
    let cas = cert_dir(&[]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "self-ca-signer.key");

    assert!(verify_flavor_integrity(&flavor, signers.path(), cas.path()));
}

#[test]
fn ca_signer_issued_by_trusted_root_verifies() {
    let signers = cert_dir(&["intermediate-ca-signer.pem"]);
    let cas = cert_dir(&["issuing-root-ca.pem"]);
    let flavor =
        sign_flavor(image_flavor(FLAVOR_PART_IMAGE, true, false), "intermediate-ca-signer.key");

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(outcomes(&audit), vec![FlavorCheckOutcome::Verified]);
}

#[test]
fn ca_signer_from_untrusted_root_is_rejected() {
    let signers = cert_dir(&["intermediate-ca-signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor =
        sign_flavor(image_flavor(FLAVOR_PART_IMAGE, true, false), "intermediate-ca-signer.key");

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(!verifier.verify_with_audit(&flavor, &audit));
    let events = audit.flavor_events.lock().unwrap();
    assert!(events[0].reason.as_deref().unwrap().contains("no trusted issuer"));
}

#[test]
fn first_verifying_candidate_wins() {
    let signers = cert_dir(&["rogue-signer.pem", "signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "signer.key");

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(
        outcomes(&audit),
        vec![FlavorCheckOutcome::CandidateRejected, FlavorCheckOutcome::Verified]
    );
    let events = audit.flavor_events.lock().unwrap();
    assert!(events[0].certificate.as_deref().unwrap().ends_with("rogue-signer.pem"));
    assert!(events[1].certificate.as_deref().unwrap().ends_with("signer.pem"));
}

// ============================================================================
// SECTION: Rejections
// ============================================================================

#[test]
fn tampered_flavor_is_rejected() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let mut flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, true, false), "signer.key");
    flavor.image_flavor.encryption_required = false;

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(!verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(
        outcomes(&audit),
        vec![FlavorCheckOutcome::CandidateRejected, FlavorCheckOutcome::Untrusted]
    );
}

#[test]
fn signer_without_trusted_chain_is_rejected() {
    let signers = cert_dir(&["rogue-signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "rogue-signer.key");

    assert!(!verify_flavor_integrity(&flavor, signers.path(), cas.path()));

    let rogue_cas = cert_dir(&["rogue-root-ca.pem"]);
    assert!(verify_flavor_integrity(&flavor, signers.path(), rogue_cas.path()));
}

#[test]
fn flipping_any_signature_byte_is_rejected() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, true, false), "signer.key");
    let signature = STANDARD.decode(&flavor.signature).unwrap();

    for index in [0, signature.len() / 2, signature.len() - 1] {
        let mut tampered = signature.clone();
        tampered[index] ^= 0x01;
        let mut candidate = flavor.clone();
        candidate.signature = STANDARD.encode(&tampered);
        assert!(!verify_flavor_integrity(&candidate, signers.path(), cas.path()), "byte {index}");
    }
}

#[test]
fn signature_from_other_key_is_rejected() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "chained-signer.key");

    assert!(!verify_flavor_integrity(&flavor, signers.path(), cas.path()));
}

#[test]
fn non_base64_signature_is_rejected() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let mut flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "signer.key");
    flavor.signature = "not base64!".to_string();

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(!verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(outcomes(&audit), vec![FlavorCheckOutcome::PayloadInvalid]);
}

#[test]
fn unreadable_directories_fail_closed() {
    let signers = cert_dir(&["signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let missing = Path::new("/nonexistent/workload-trust/certs");
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "signer.key");

    let audit = RecordingAuditSink::default();
    assert!(!FlavorIntegrityVerifier::new(missing, cas.path()).verify_with_audit(&flavor, &audit));
    assert!(!FlavorIntegrityVerifier::new(signers.path(), missing).verify_with_audit(&flavor, &audit));
    assert_eq!(
        outcomes(&audit),
        vec![FlavorCheckOutcome::DirectoryUnreadable, FlavorCheckOutcome::DirectoryUnreadable]
    );
}

#[test]
fn empty_signing_directory_is_untrusted() {
    let signers = cert_dir(&[]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "signer.key");

    assert!(!verify_flavor_integrity(&flavor, signers.path(), cas.path()));
}

#[test]
fn non_pem_files_are_ignored() {
    let signers = cert_dir(&["signer.key", "signer.pem"]);
    let cas = cert_dir(&["root-ca.pem"]);
    let flavor = sign_flavor(image_flavor(FLAVOR_PART_IMAGE, false, false), "signer.key");

    let audit = RecordingAuditSink::default();
    let verifier = FlavorIntegrityVerifier::new(signers.path(), cas.path());
    assert!(verifier.verify_with_audit(&flavor, &audit));
    assert_eq!(outcomes(&audit), vec![FlavorCheckOutcome::Verified]);
}
