// crates/workload-trust-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures and builders for workload-trust-core tests.
// Purpose: Provide certificate directories, signed flavors and manifests.
// Dependencies: workload-trust-core, rsa, sha2, base64, tempfile
// ============================================================================

//! ## Overview
//! Provides PEM fixture directories, flavor signing with fixture keys, and a
//! recording audit sink.

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
    dead_code,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use sha2::Digest;
use sha2::Sha384;
use tempfile::TempDir;
use workload_trust_core::audit::FlavorVerificationEvent;
use workload_trust_core::audit::KeyReleaseEvent;
use workload_trust_core::audit::TrustAuditSink;
use workload_trust_core::model::FlavorDescription;
use workload_trust_core::model::FlavorEncryption;
use workload_trust_core::model::FlavorMeta;
use workload_trust_core::model::ImageFlavor;
use workload_trust_core::model::InstanceManifest;
use workload_trust_core::model::SignedImageFlavor;
use workload_trust_core::model::flavor_signature_payload;

// ============================================================================
// SECTION: Identifiers
// ============================================================================

/// Flavor identifier (UUIDv4).
pub const FLAVOR_ID: &str = "6e8c5a3d-2f1b-4a7e-9c0d-1b2a3c4d5e6f";
/// Instance identifier (UUIDv4).
pub const INSTANCE_ID: &str = "0f6e1a84-5b1e-4b9c-8f3d-2b9a8c7d6e5f";
/// Image identifier (UUIDv4).
pub const IMAGE_ID: &str = "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d";
/// Host hardware UUID (not version 4).
pub const HARDWARE_UUID: &str = "00964993-89c1-e711-906e-00163566263e";
/// Key identifier embedded in key URLs.
pub const KEY_ID: &str = "4d3b1a2c-9f7e-4c6d-8b5a-1e2f3a4b5c6d";

/// Key URL for [`KEY_ID`].
pub fn key_url() -> String {
    key_url_for(KEY_ID)
}

/// Key URL for an arbitrary key id.
pub fn key_url_for(key_id: &str) -> String {
    format!("https://kbs.example.com:9443/v1/keys/{key_id}/transfer")
}

// ============================================================================
// SECTION: Certificate Fixtures
// ============================================================================

/// Path of a checked-in PKI fixture.
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/pki").join(name)
}

/// Creates a temporary directory holding copies of the named fixtures.
pub fn cert_dir(names: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for name in names {
        fs::copy(fixture(name), dir.path().join(name)).expect("copy fixture");
    }
    dir
}

// ============================================================================
// SECTION: Flavors and Manifests
// ============================================================================

/// Builds an unsigned flavor.
pub fn image_flavor(flavor_part: &str, encryption_required: bool, integrity_enforced: bool) -> ImageFlavor {
    ImageFlavor {
        meta: FlavorMeta {
            id: FLAVOR_ID.to_string(),
            description: FlavorDescription {
                label: format!("{}-flavor", flavor_part.to_lowercase()),
                flavor_part: flavor_part.to_string(),
            },
        },
        encryption: encryption_required.then(|| FlavorEncryption {
            key_url: key_url(),
            digest: "c2hhMzg0LWRpZ2VzdA==".to_string(),
        }),
        encryption_required,
        integrity_enforced,
    }
}

/// Signs a flavor with a fixture private key.
pub fn sign_flavor(flavor: ImageFlavor, key_fixture: &str) -> SignedImageFlavor {
    let pem = fs::read_to_string(fixture(key_fixture)).expect("read key");
    let key = RsaPrivateKey::from_pkcs8_pem(&pem).expect("decode key");
    let payload = flavor_signature_payload(&flavor).expect("payload");
    let digest = Sha384::digest(&payload);
    let signature = key.sign(Pkcs1v15Sign::new::<Sha384>(), &digest).expect("sign");
    SignedImageFlavor {
        image_flavor: flavor,
        signature: STANDARD.encode(signature),
    }
}

/// Builds a manifest for the standard identifiers.
pub fn manifest(image_encrypted: bool, image_integrity_enforced: bool) -> InstanceManifest {
    InstanceManifest {
        instance_id: INSTANCE_ID.to_string(),
        host_hardware_uuid: HARDWARE_UUID.to_string(),
        image_id: IMAGE_ID.to_string(),
        image_encrypted,
        image_integrity_enforced,
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    /// Flavor verification events.
    pub flavor_events: Mutex<Vec<FlavorVerificationEvent>>,
    /// Key release events.
    pub key_events: Mutex<Vec<KeyReleaseEvent>>,
}

impl TrustAuditSink for RecordingAuditSink {
    fn record_flavor(&self, event: &FlavorVerificationEvent) {
        self.flavor_events.lock().unwrap().push(event.clone());
    }

    fn record_key_release(&self, event: &KeyReleaseEvent) {
        self.key_events.lock().unwrap().push(event.clone());
    }
}
