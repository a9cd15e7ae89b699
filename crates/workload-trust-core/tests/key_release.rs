// crates/workload-trust-core/tests/key_release.rs
// ============================================================================
// Module: Attestation-Gated Key Release Tests
// Description: Attestation, caching and broker behavior of key release.
// Purpose: Confirm keys reach only freshly attested, trusted hosts.
// Dependencies: workload-trust-core, base64, tempfile, time
// ============================================================================
//! ## Overview
//! Drives the key release gate with in-memory attestation, verifier and
//! broker fakes.

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
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::HARDWARE_UUID;
use common::KEY_ID;
use common::RecordingAuditSink;
use common::cert_dir;
use common::fixture;
use common::image_flavor;
use common::key_url;
use common::key_url_for;
use rustls_pki_types::CertificateDer;
use tempfile::TempDir;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use workload_trust_core::AttestationError;
use workload_trust_core::AttestationService;
use workload_trust_core::BrokerEndpoint;
use workload_trust_core::BrokerError;
use workload_trust_core::KeyBroker;
use workload_trust_core::KeyCache;
use workload_trust_core::KeyReleaseConfig;
use workload_trust_core::KeyReleaseError;
use workload_trust_core::KeyReleaseGate;
use workload_trust_core::KeyTransfer;
use workload_trust_core::SamlVerifier;
use workload_trust_core::audit::KeyReleaseOutcome;
use workload_trust_core::model::FLAVOR_PART_IMAGE;
use workload_trust_core::model::FixedClock;
use workload_trust_core::runtime::CachedKey;

// ============================================================================
// SECTION: Fakes
// ============================================================================

const NOW: OffsetDateTime = datetime!(2026-10-16 12:00:00 UTC);
const OTHER_KEY_ID: &str = "7b6a5c4d-3e2f-4a1b-9c8d-7e6f5a4b3c2d";
const KEY_BYTES: &[u8] = b"wrapped-image-key";

struct FakeAttestation {
    report: Result<Vec<u8>, String>,
    calls: AtomicUsize,
}

impl AttestationService for FakeAttestation {
    fn fetch_saml_report(&self, _hardware_uuid: &str) -> Result<Vec<u8>, AttestationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report.clone().map_err(AttestationError::Transport)
    }
}

struct FakeSamlVerifier {
    accept: bool,
    calls: Mutex<Vec<(PathBuf, usize)>>,
}

impl SamlVerifier for FakeSamlVerifier {
    fn verify_saml_signature(
        &self,
        _xml: &[u8],
        saml_ca_file: &Path,
        root_cas: &[CertificateDer<'static>],
    ) -> bool {
        self.calls.lock().unwrap().push((saml_ca_file.to_path_buf(), root_cas.len()));
        self.accept
    }
}

struct FakeBroker {
    response: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl KeyBroker for FakeBroker {
    fn transfer_key_with_saml(
        &self,
        endpoint: &BrokerEndpoint,
        key_id: &str,
        _saml: &[u8],
    ) -> Result<KeyTransfer, BrokerError> {
        self.calls.lock().unwrap().push((endpoint.base_url.to_string(), key_id.to_string()));
        self.response
            .clone()
            .map(|wrapped_key| KeyTransfer {
                wrapped_key,
            })
            .map_err(BrokerError::Transport)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

fn assertion(trust: Option<&str>, not_before: &str, not_on_or_after: &str) -> Vec<u8> {
    let trust_attribute = trust.map_or_else(String::new, |value| {
        format!(
            r#"<saml2:Attribute Name="TRUST_OVERALL"><saml2:AttributeValue>{value}</saml2:AttributeValue></saml2:Attribute>"#
        )
    });
    format!(
        r#"<saml2:Assertion xmlns:saml2="urn:oasis:names:tc:SAML:2.0:assertion" ID="hvs-report" Version="2.0">
  <saml2:Subject>
    <saml2:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:sender-vouches">
      <saml2:SubjectConfirmationData NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}"/>
    </saml2:SubjectConfirmation>
  </saml2:Subject>
  <saml2:AttributeStatement>
    <saml2:Attribute Name="TRUST_PLATFORM"><saml2:AttributeValue>true</saml2:AttributeValue></saml2:Attribute>
    {trust_attribute}
  </saml2:AttributeStatement>
</saml2:Assertion>"#
    )
    .into_bytes()
}

fn current_assertion(trust: Option<&str>) -> Vec<u8> {
    assertion(trust, "2026-10-16T11:00:00Z", "2026-10-16T13:00:00Z")
}

struct Harness {
    attestation: Arc<FakeAttestation>,
    verifier: Arc<FakeSamlVerifier>,
    broker: Arc<FakeBroker>,
    cache: Arc<KeyCache>,
    audit: Arc<RecordingAuditSink>,
    gate: KeyReleaseGate,
    _cas: TempDir,
}

impl Harness {
    fn new(report: Result<Vec<u8>, String>, accept: bool, broker: Result<String, String>) -> Self {
        let cas = cert_dir(&["root-ca.pem"]);
        let attestation = Arc::new(FakeAttestation {
            report,
            calls: AtomicUsize::new(0),
        });
        let verifier = Arc::new(FakeSamlVerifier {
            accept,
            calls: Mutex::new(Vec::new()),
        });
        let broker = Arc::new(FakeBroker {
            response: broker,
            calls: Mutex::new(Vec::new()),
        });
        let cache = Arc::new(KeyCache::new());
        let audit = Arc::new(RecordingAuditSink::default());
        let config = KeyReleaseConfig::new(fixture("saml-ca.pem"), cas.path().to_path_buf());
        let gate = KeyReleaseGate::new(
            config,
            attestation.clone(),
            verifier.clone(),
            broker.clone(),
            Arc::clone(&cache),
        )
        .with_clock(Arc::new(FixedClock(NOW)))
        .with_audit(audit.clone());
        Self {
            attestation,
            verifier,
            broker,
            cache,
            audit,
            gate,
            _cas: cas,
        }
    }

    fn trusted() -> Self {
        Self::new(Ok(current_assertion(Some("true"))), true, Ok(STANDARD.encode(KEY_BYTES)))
    }

    fn broker_calls(&self) -> Vec<(String, String)> {
        self.broker.calls.lock().unwrap().clone()
    }

    fn outcomes(&self) -> Vec<KeyReleaseOutcome> {
        self.audit.key_events.lock().unwrap().iter().map(|event| event.outcome).collect()
    }
}

fn cached(key_id: &str, bytes: &[u8], expired: OffsetDateTime) -> CachedKey {
    CachedKey {
        id: key_id.to_string(),
        bytes: bytes.to_vec(),
        created: expired - Duration::seconds(300),
        expired,
    }
}

// ============================================================================
// SECTION: Release Paths
// ============================================================================

#[test]
fn trusted_host_receives_key_from_broker() {
    let harness = Harness::trusted();

    let bytes = harness.gate.transfer_key(HARDWARE_UUID, &key_url()).unwrap();
    assert_eq!(bytes, KEY_BYTES);
    assert_eq!(
        harness.broker_calls(),
        vec![("https://kbs.example.com:9443/v1/".to_string(), KEY_ID.to_string())]
    );

    let entry = harness.cache.get(HARDWARE_UUID).unwrap();
    assert_eq!(entry.id, KEY_ID);
    assert_eq!(entry.bytes, KEY_BYTES);
    assert_eq!(entry.created, NOW);
    assert_eq!(entry.expired, NOW + Duration::seconds(300));
    assert_eq!(harness.outcomes(), vec![KeyReleaseOutcome::ReleasedFromBroker]);

    let verifier_calls = harness.verifier.calls.lock().unwrap();
    assert_eq!(verifier_calls.as_slice(), &[(fixture("saml-ca.pem"), 1)]);
}

#[test]
fn cached_key_is_served_after_fresh_attestation() {
    let harness = Harness::trusted();
    harness.cache.store(HARDWARE_UUID, cached(KEY_ID, b"cached-key", NOW + Duration::minutes(5)));

    let bytes = harness.gate.transfer_key(HARDWARE_UUID, &key_url()).unwrap();
    assert_eq!(bytes, b"cached-key");
    assert!(harness.broker_calls().is_empty());
    assert_eq!(harness.attestation.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.outcomes(), vec![KeyReleaseOutcome::ReleasedFromCache]);
}

#[test]
fn cached_key_for_other_id_is_not_served() {
    let harness = Harness::trusted();
    harness.cache.store(HARDWARE_UUID, cached(KEY_ID, b"cached-key", NOW + Duration::minutes(5)));

    let bytes = harness.gate.transfer_key(HARDWARE_UUID, &key_url_for(OTHER_KEY_ID)).unwrap();
    assert_eq!(bytes, KEY_BYTES);
    assert_eq!(harness.broker_calls().len(), 1);
    assert_eq!(harness.cache.get(HARDWARE_UUID).unwrap().id, OTHER_KEY_ID);
}

#[test]
fn expired_cache_entry_is_replaced() {
    let harness = Harness::trusted();
    harness.cache.store(HARDWARE_UUID, cached(KEY_ID, b"stale-key", NOW));

    let bytes = harness.gate.transfer_key(HARDWARE_UUID, &key_url()).unwrap();
    assert_eq!(bytes, KEY_BYTES);
    assert_eq!(harness.broker_calls().len(), 1);
    assert_eq!(harness.cache.get(HARDWARE_UUID).unwrap().bytes, KEY_BYTES);
}

#[test]
fn missing_trust_attribute_does_not_block_release() {
    let harness =
        Harness::new(Ok(current_assertion(None)), true, Ok(STANDARD.encode(KEY_BYTES)));

    assert_eq!(harness.gate.transfer_key(HARDWARE_UUID, &key_url()).unwrap(), KEY_BYTES);
}

// ============================================================================
// SECTION: Attestation Failures
// ============================================================================

#[test]
fn untrusted_host_never_reaches_broker() {
    let harness =
        Harness::new(Ok(current_assertion(Some("false"))), true, Ok(STANDARD.encode(KEY_BYTES)));
    harness.cache.store(HARDWARE_UUID, cached(KEY_ID, b"cached-key", NOW + Duration::minutes(5)));

    let err = harness.gate.transfer_key(HARDWARE_UUID, &key_url()).unwrap_err();
    assert!(matches!(err, KeyReleaseError::HostUntrusted));
    assert!(!err.is_input_error());
    assert!(harness.broker_calls().is_empty());
    assert_eq!(harness.outcomes(), vec![KeyReleaseOutcome::Denied]);
}

#[test]
fn untrusted_value_is_compared_case_insensitively() {
    let harness =
        Harness::new(Ok(current_assertion(Some(" False "))), true, Ok(STANDARD.encode(KEY_BYTES)));

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::HostUntrusted)
    ));
}

#[test]
fn unverified_signature_is_rejected() {
    let harness =
        Harness::new(Ok(current_assertion(Some("true"))), false, Ok(STANDARD.encode(KEY_BYTES)));

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::SignatureInvalid)
    ));
    assert!(harness.broker_calls().is_empty());
    assert!(harness.cache.is_empty());
}

#[test]
fn malformed_report_is_rejected_before_verification() {
    let harness = Harness::new(
        Ok(b"<saml2:Assertion><broken>".to_vec()),
        true,
        Ok(STANDARD.encode(KEY_BYTES)),
    );

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::MalformedAssertion(_))
    ));
    assert!(harness.verifier.calls.lock().unwrap().is_empty());
}

#[test]
fn attestation_outage_is_an_error() {
    let harness =
        Harness::new(Err("connection refused".to_string()), true, Ok(STANDARD.encode(KEY_BYTES)));

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::Attestation(_))
    ));
}

#[test]
fn stale_assertion_is_rejected() {
    let harness = Harness::new(
        Ok(assertion(Some("true"), "2026-10-16T09:00:00Z", "2026-10-16T12:00:00Z")),
        true,
        Ok(STANDARD.encode(KEY_BYTES)),
    );

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::AssertionNotCurrent)
    ));
    assert!(harness.broker_calls().is_empty());
}

// ============================================================================
// SECTION: Broker Failures
// ============================================================================

#[test]
fn broker_failure_caches_nothing() {
    let harness =
        Harness::new(Ok(current_assertion(Some("true"))), true, Err("status 403".to_string()));

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::Broker(_))
    ));
    assert!(harness.cache.is_empty());
}

#[test]
fn undecodable_key_material_caches_nothing() {
    let harness =
        Harness::new(Ok(current_assertion(Some("true"))), true, Ok("***".to_string()));

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &key_url()),
        Err(KeyReleaseError::InvalidKey(_))
    ));
    assert!(harness.cache.is_empty());
}

// ============================================================================
// SECTION: Input Validation
// ============================================================================

#[test]
fn malformed_hardware_uuid_skips_attestation() {
    let harness = Harness::trusted();

    let err = harness.gate.transfer_key("host-1", &key_url()).unwrap_err();
    assert!(matches!(err, KeyReleaseError::InvalidHardwareUuid(_)));
    assert!(err.is_input_error());
    assert_eq!(harness.attestation.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn key_url_without_key_id_is_rejected() {
    let harness = Harness::trusted();

    let err = harness
        .gate
        .transfer_key(HARDWARE_UUID, "https://kbs.example.com/v1/keys/latest/transfer")
        .unwrap_err();
    assert!(matches!(err, KeyReleaseError::InvalidKeyUrl(_)));
    assert_eq!(harness.attestation.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn key_url_without_transfer_suffix_never_reaches_broker() {
    let harness = Harness::trusted();
    let url = format!("https://kbs.example.com/v1/keys/{KEY_ID}");

    assert!(matches!(
        harness.gate.transfer_key(HARDWARE_UUID, &url),
        Err(KeyReleaseError::InvalidKeyUrl(_))
    ));
    assert!(harness.broker_calls().is_empty());
}

// ============================================================================
// SECTION: Flavor Keys
// ============================================================================

#[test]
fn flavor_key_follows_flavor_key_url() {
    let harness = Harness::trusted();
    let flavor = image_flavor(FLAVOR_PART_IMAGE, true, false);

    let bytes = harness.gate.retrieve_flavor_key(&flavor, HARDWARE_UUID).unwrap();
    assert_eq!(bytes, KEY_BYTES);
    assert_eq!(harness.broker_calls()[0].1, KEY_ID);
}

#[test]
fn flavor_without_key_is_an_input_error() {
    let harness = Harness::trusted();

    let plain = image_flavor(FLAVOR_PART_IMAGE, false, false);
    let err = harness.gate.retrieve_flavor_key(&plain, HARDWARE_UUID).unwrap_err();
    assert!(matches!(err, KeyReleaseError::FlavorNotEncrypted));
    assert!(err.is_input_error());

    let mut keyless = image_flavor(FLAVOR_PART_IMAGE, true, false);
    keyless.encryption = None;
    let err = harness.gate.retrieve_flavor_key(&keyless, HARDWARE_UUID).unwrap_err();
    assert!(matches!(err, KeyReleaseError::MissingKeyUrl));
    assert_eq!(harness.attestation.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.outcomes(), vec![KeyReleaseOutcome::Denied, KeyReleaseOutcome::Denied]);
}
