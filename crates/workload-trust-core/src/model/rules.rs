// crates/workload-trust-core/src/model/rules.rs
// ============================================================================
// Module: Trust Rules
// Description: Policy rules comparing one flavor expectation to one observed fact.
// Purpose: Provide the rule variants used by the trust verification engine.
// Dependencies: serde, crate::runtime::flavor_integrity
// ============================================================================

//! ## Overview
//! [`Rule`] is a closed, name-tagged union of the three rule kinds. The
//! `rule_name` discriminator is the serialized identity of a rule; decoding an
//! unknown name fails.
//! Invariants:
//! - A rule that does not hold produces exactly one [`Fault`].
//! - Certificate directories used by [`FlavorIntegrityMatches`] are runtime
//!   configuration and are never serialized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::audit::TrustAuditSink;
use crate::model::flavor::FlavorPart;
use crate::model::flavor::SignedImageFlavor;
use crate::model::manifest::InstanceManifest;
use crate::runtime::flavor_integrity::FlavorIntegrityVerifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Discriminator for [`EncryptionMatches`].
pub const ENCRYPTION_MATCHES: &str = "EncryptionMatches";
/// Discriminator for [`IntegrityMatches`].
pub const INTEGRITY_MATCHES: &str = "IntegrityMatches";
/// Discriminator for [`FlavorIntegrityMatches`].
pub const FLAVOR_INTEGRITY_MATCHES: &str = "FlavorIntegrityMatches";

/// Fault description emitted when a flavor signature cannot be trusted.
pub const FLAVOR_NOT_TRUSTED: &str = "Flavor is not trusted";

// ============================================================================
// SECTION: Faults and Outcomes
// ============================================================================

/// Structured explanation of why a rule did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Human-readable description.
    pub description: String,
    /// Rendered underlying error, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl Fault {
    /// Creates a fault without an underlying cause.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            cause: None,
        }
    }
}

/// Outcome of applying a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Whether the rule held.
    pub trusted: bool,
    /// Faults explaining a failed rule.
    pub faults: Vec<Fault>,
}

impl RuleOutcome {
    /// Outcome for a rule that held.
    #[must_use]
    pub const fn trusted() -> Self {
        Self {
            trusted: true,
            faults: Vec::new(),
        }
    }

    /// Outcome for a rule that did not hold.
    #[must_use]
    pub fn untrusted(fault: Fault) -> Self {
        Self {
            trusted: false,
            faults: vec![fault],
        }
    }
}

/// Named boolean expectation carried by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValue {
    /// Policy attribute name.
    pub name: String,
    /// Expected attribute value.
    pub value: bool,
}

// ============================================================================
// SECTION: Rule Variants
// ============================================================================

/// Compares the flavor's encryption requirement with the launched image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMatches {
    /// Image type markers the rule applies to.
    pub markers: Vec<String>,
    /// Expected `encryption_required` value.
    pub expected: ExpectedValue,
}

impl EncryptionMatches {
    /// Creates the rule for an image type.
    #[must_use]
    pub fn new(image_type: FlavorPart, expected: bool) -> Self {
        Self {
            markers: vec![image_type.as_str().to_string()],
            expected: ExpectedValue {
                name: "encryption_required".to_string(),
                value: expected,
            },
        }
    }

    /// Applies the rule to an instance manifest.
    #[must_use]
    pub fn apply(&self, manifest: &InstanceManifest) -> RuleOutcome {
        if manifest.image_encrypted == self.expected.value {
            return RuleOutcome::trusted();
        }
        RuleOutcome::untrusted(Fault::new(format!(
            "Encryption does not match: expected {}, actual {}",
            self.expected.value, manifest.image_encrypted
        )))
    }
}

/// Compares the flavor's integrity requirement with the launched container image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityMatches {
    /// Image type markers the rule applies to.
    pub markers: Vec<String>,
    /// Expected `integrity_enforced` value.
    pub expected: ExpectedValue,
}

impl IntegrityMatches {
    /// Creates the rule for an image type.
    #[must_use]
    pub fn new(image_type: FlavorPart, expected: bool) -> Self {
        Self {
            markers: vec![image_type.as_str().to_string()],
            expected: ExpectedValue {
                name: "integrity_enforced".to_string(),
                value: expected,
            },
        }
    }

    /// Applies the rule to an instance manifest.
    #[must_use]
    pub fn apply(&self, manifest: &InstanceManifest) -> RuleOutcome {
        if manifest.image_integrity_enforced == self.expected.value {
            return RuleOutcome::trusted();
        }
        RuleOutcome::untrusted(Fault::new(format!(
            "Integrity enforcement does not match: expected {}, actual {}",
            self.expected.value, manifest.image_integrity_enforced
        )))
    }
}

/// Requires the flavor signature to verify against the configured signers.
///
/// Equality covers the serialized fields only; the certificate directories
/// are evaluation context and do not survive a report round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorIntegrityMatches {
    /// Image type markers the rule applies to.
    pub markers: Vec<String>,
    /// Expected flavor trust (always `true`).
    pub expected: ExpectedValue,
    /// Directory of candidate signing certificates.
    #[serde(skip)]
    signing_certs_dir: PathBuf,
    /// Directory of trusted root CA certificates.
    #[serde(skip)]
    trusted_cas_dir: PathBuf,
}

impl FlavorIntegrityMatches {
    /// Creates the rule bound to certificate directories.
    #[must_use]
    pub fn new(image_type: FlavorPart, signing_certs_dir: &Path, trusted_cas_dir: &Path) -> Self {
        Self {
            markers: vec![image_type.as_str().to_string()],
            expected: ExpectedValue {
                name: "flavor_trusted".to_string(),
                value: true,
            },
            signing_certs_dir: signing_certs_dir.to_path_buf(),
            trusted_cas_dir: trusted_cas_dir.to_path_buf(),
        }
    }

    /// Applies the rule to a signed flavor.
    #[must_use]
    pub fn apply(&self, flavor: &SignedImageFlavor, audit: &dyn TrustAuditSink) -> RuleOutcome {
        let verifier =
            FlavorIntegrityVerifier::new(&self.signing_certs_dir, &self.trusted_cas_dir);
        if verifier.verify_with_audit(flavor, audit) {
            return RuleOutcome::trusted();
        }
        RuleOutcome::untrusted(Fault::new(FLAVOR_NOT_TRUSTED))
    }
}

impl PartialEq for FlavorIntegrityMatches {
    fn eq(&self, other: &Self) -> bool {
        self.markers == other.markers && self.expected == other.expected
    }
}

impl Eq for FlavorIntegrityMatches {}

// ============================================================================
// SECTION: Rule Union
// ============================================================================

/// Closed set of trust rules, tagged by `rule_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule_name")]
pub enum Rule {
    /// Encryption requirement rule.
    EncryptionMatches(EncryptionMatches),
    /// Integrity enforcement rule.
    IntegrityMatches(IntegrityMatches),
    /// Flavor signature rule.
    FlavorIntegrityMatches(FlavorIntegrityMatches),
}

impl Rule {
    /// Returns the stable rule name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EncryptionMatches(_) => ENCRYPTION_MATCHES,
            Self::IntegrityMatches(_) => INTEGRITY_MATCHES,
            Self::FlavorIntegrityMatches(_) => FLAVOR_INTEGRITY_MATCHES,
        }
    }

    /// Applies the rule to the manifest/flavor pair under evaluation.
    #[must_use]
    pub fn apply(
        &self,
        manifest: &InstanceManifest,
        flavor: &SignedImageFlavor,
        audit: &dyn TrustAuditSink,
    ) -> RuleOutcome {
        match self {
            Self::EncryptionMatches(rule) => rule.apply(manifest),
            Self::IntegrityMatches(rule) => rule.apply(manifest),
            Self::FlavorIntegrityMatches(rule) => rule.apply(flavor, audit),
        }
    }
}

impl From<EncryptionMatches> for Rule {
    fn from(rule: EncryptionMatches) -> Self {
        Self::EncryptionMatches(rule)
    }
}

impl From<IntegrityMatches> for Rule {
    fn from(rule: IntegrityMatches) -> Self {
        Self::IntegrityMatches(rule)
    }
}

impl From<FlavorIntegrityMatches> for Rule {
    fn from(rule: FlavorIntegrityMatches) -> Self {
        Self::FlavorIntegrityMatches(rule)
    }
}
