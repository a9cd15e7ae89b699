// crates/workload-trust-core/src/runtime/engine.rs
// ============================================================================
// Module: Trust Verification Engine
// Description: Rule selection and report aggregation for instance manifests.
// Purpose: Decide whether a launched instance satisfies its image flavor.
// Dependencies: crate::model, crate::runtime::flavor_integrity
// ============================================================================

//! ## Overview
//! The engine validates its inputs, picks the rule set for the flavor part,
//! applies every rule in order and aggregates the results into an
//! [`InstanceTrustReport`]. Malformed input is an error; an unmet policy is a
//! report with `trusted == false`.
//! Invariants:
//! - Identical inputs and directory contents yield identical reports.
//! - Every result carries the flavor identifier.
//! - No rules means untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::audit::StderrAuditSink;
use crate::audit::TrustAuditSink;
use crate::model::flavor::FlavorPart;
use crate::model::flavor::SignedImageFlavor;
use crate::model::manifest::InstanceManifest;
use crate::model::report::CONTAINER_POLICY_NAME;
use crate::model::report::InstanceTrustReport;
use crate::model::report::RuleResult;
use crate::model::report::VM_POLICY_NAME;
use crate::model::rules::EncryptionMatches;
use crate::model::rules::FlavorIntegrityMatches;
use crate::model::rules::IntegrityMatches;
use crate::model::rules::Rule;
use crate::model::validation::is_base64;
use crate::model::validation::is_hardware_uuid;
use crate::model::validation::is_uuid_v4;
use crate::model::validation::parse_https_url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Input validation errors raised before any rule runs.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// Instance identifier is not a hyphenated UUIDv4.
    #[error("invalid instance id: {0}")]
    InvalidInstanceId(String),
    /// Image identifier is not a hyphenated UUIDv4.
    #[error("invalid image id: {0}")]
    InvalidImageId(String),
    /// Host hardware UUID is not a hyphenated UUID.
    #[error("invalid host hardware uuid: {0}")]
    InvalidHardwareUuid(String),
    /// Flavor identifier is not a hyphenated UUIDv4.
    #[error("invalid flavor id: {0}")]
    InvalidFlavorId(String),
    /// Flavor part is neither `IMAGE` nor `CONTAINER_IMAGE`.
    #[error("unsupported flavor part: {0}")]
    UnsupportedFlavorPart(String),
    /// Key URL is not an https URL.
    #[error("invalid key url: {0}")]
    InvalidKeyUrl(String),
    /// Digest is not base64.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Trust verification engine.
#[derive(Clone)]
pub struct TrustVerifier {
    /// Sink receiving flavor verification events.
    audit: Arc<dyn TrustAuditSink>,
}

impl Default for TrustVerifier {
    fn default() -> Self {
        Self::new(Arc::new(StderrAuditSink))
    }
}

impl TrustVerifier {
    /// Creates an engine reporting to the given audit sink.
    #[must_use]
    pub fn new(audit: Arc<dyn TrustAuditSink>) -> Self {
        Self {
            audit,
        }
    }

    /// Verifies a manifest against a signed flavor.
    ///
    /// # Errors
    ///
    /// Returns [`VerificationError`] when the manifest or flavor is malformed.
    pub fn verify(
        &self,
        manifest: &InstanceManifest,
        flavor: &SignedImageFlavor,
        signing_certs_dir: &Path,
        trusted_cas_dir: &Path,
        skip_flavor_signature_verification: bool,
    ) -> Result<InstanceTrustReport, VerificationError> {
        let flavor_part = validate_inputs(manifest, flavor)?;
        let rules = rules_for(
            flavor_part,
            flavor,
            signing_certs_dir,
            trusted_cas_dir,
            skip_flavor_signature_verification,
        );
        let flavor_id = &flavor.image_flavor.meta.id;
        let results = rules
            .into_iter()
            .map(|rule| {
                let outcome = rule.apply(manifest, flavor, self.audit.as_ref());
                RuleResult::new(rule, flavor_id.clone(), outcome)
            })
            .collect();
        Ok(InstanceTrustReport::new(manifest.clone(), policy_name(flavor_part), results))
    }
}

/// Verifies a manifest against a signed flavor with a stderr audit sink.
///
/// # Errors
///
/// Returns [`VerificationError`] when the manifest or flavor is malformed.
pub fn verify(
    manifest: &InstanceManifest,
    flavor: &SignedImageFlavor,
    signing_certs_dir: &Path,
    trusted_cas_dir: &Path,
    skip_flavor_signature_verification: bool,
) -> Result<InstanceTrustReport, VerificationError> {
    TrustVerifier::default().verify(
        manifest,
        flavor,
        signing_certs_dir,
        trusted_cas_dir,
        skip_flavor_signature_verification,
    )
}

// ============================================================================
// SECTION: Rule Selection
// ============================================================================

/// Builds the ordered rule set for a flavor part.
#[must_use]
pub fn rules_for(
    flavor_part: FlavorPart,
    flavor: &SignedImageFlavor,
    signing_certs_dir: &Path,
    trusted_cas_dir: &Path,
    skip_flavor_signature_verification: bool,
) -> Vec<Rule> {
    let image_flavor = &flavor.image_flavor;
    let mut rules = vec![Rule::from(EncryptionMatches::new(
        flavor_part,
        image_flavor.encryption_required,
    ))];
    if flavor_part == FlavorPart::ContainerImage {
        rules.push(IntegrityMatches::new(flavor_part, image_flavor.integrity_enforced).into());
    }
    if !skip_flavor_signature_verification {
        rules.push(
            FlavorIntegrityMatches::new(flavor_part, signing_certs_dir, trusted_cas_dir).into(),
        );
    }
    rules
}

/// Policy name reported for a flavor part.
#[must_use]
pub const fn policy_name(flavor_part: FlavorPart) -> &'static str {
    match flavor_part {
        FlavorPart::Image => VM_POLICY_NAME,
        FlavorPart::ContainerImage => CONTAINER_POLICY_NAME,
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates manifest and flavor formats, returning the flavor part.
fn validate_inputs(
    manifest: &InstanceManifest,
    flavor: &SignedImageFlavor,
) -> Result<FlavorPart, VerificationError> {
    if !is_uuid_v4(&manifest.instance_id) {
        return Err(VerificationError::InvalidInstanceId(manifest.instance_id.clone()));
    }
    if !is_uuid_v4(&manifest.image_id) {
        return Err(VerificationError::InvalidImageId(manifest.image_id.clone()));
    }
    if !is_hardware_uuid(&manifest.host_hardware_uuid) {
        return Err(VerificationError::InvalidHardwareUuid(manifest.host_hardware_uuid.clone()));
    }

    let image_flavor = &flavor.image_flavor;
    if !is_uuid_v4(&image_flavor.meta.id) {
        return Err(VerificationError::InvalidFlavorId(image_flavor.meta.id.clone()));
    }
    let label = &image_flavor.meta.description.flavor_part;
    let flavor_part = FlavorPart::parse(label)
        .ok_or_else(|| VerificationError::UnsupportedFlavorPart(label.clone()))?;

    if let Some(encryption) = &image_flavor.encryption {
        if !encryption.key_url.is_empty() && parse_https_url(&encryption.key_url).is_none() {
            return Err(VerificationError::InvalidKeyUrl(encryption.key_url.clone()));
        }
        if !encryption.digest.is_empty() && !is_base64(&encryption.digest) {
            return Err(VerificationError::InvalidDigest(encryption.digest.clone()));
        }
    }
    Ok(flavor_part)
}
