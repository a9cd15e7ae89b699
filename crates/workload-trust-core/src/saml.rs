// crates/workload-trust-core/src/saml.rs
// ============================================================================
// Module: SAML Attestation Reports
// Description: Parsing of host attestation SAML assertions.
// Purpose: Extract validity window, attributes and signer certificate.
// Dependencies: xmltree, time, base64, rustls-pki-types
// ============================================================================

//! ## Overview
//! The attestation service reports host trust as a signed SAML 2.0 assertion.
//! Elements are matched by local name so namespace prefixes do not matter.
//! This module only reads the assertion; signature checks belong to a
//! [`crate::interfaces::SamlVerifier`].
//! Invariants:
//! - Input that is not well-formed XML is rejected before any field is read.
//! - Attribute values are kept verbatim; callers decide how to compare them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustls_pki_types::CertificateDer;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use xmltree::Element;
use xmltree::XMLNode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted assertion size, in bytes.
pub const MAX_SAML_BYTES: usize = 1024 * 1024;

/// Attribute carrying the overall host trust decision.
pub const TRUST_OVERALL: &str = "TRUST_OVERALL";

/// Local name of the assertion root element.
const ASSERTION: &str = "Assertion";
/// Local name of the subject confirmation data element.
const SUBJECT_CONFIRMATION_DATA: &str = "SubjectConfirmationData";
/// Local name of an attribute element.
const ATTRIBUTE: &str = "Attribute";
/// Local name of an attribute value element.
const ATTRIBUTE_VALUE: &str = "AttributeValue";
/// Local name of the embedded signer certificate.
const X509_CERTIFICATE: &str = "X509Certificate";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SAML assertion parsing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Input is not well-formed XML.
    #[error("malformed saml xml: {0}")]
    Malformed(String),
    /// Root element is not an assertion.
    #[error("unexpected saml root element: {0}")]
    UnexpectedRoot(String),
    /// Input exceeds the size limit.
    #[error("saml assertion exceeds {MAX_SAML_BYTES} bytes")]
    TooLarge,
    /// Validity timestamp is not RFC 3339.
    #[error("invalid saml timestamp {value}: {message}")]
    InvalidTimestamp {
        /// Offending timestamp text.
        value: String,
        /// Parser error.
        message: String,
    },
    /// Embedded certificate is not valid base64.
    #[error("invalid saml signing certificate: {0}")]
    InvalidCertificate(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Named attribute asserted about the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlAttribute {
    /// Attribute name.
    pub name: String,
    /// First attribute value, trimmed of surrounding whitespace.
    pub value: String,
}

/// Parsed host attestation assertion.
#[derive(Debug, Clone)]
pub struct SamlAssertion {
    /// Start of the subject confirmation window.
    pub not_before: Option<OffsetDateTime>,
    /// End (exclusive) of the subject confirmation window.
    pub not_on_or_after: Option<OffsetDateTime>,
    /// Attributes in document order.
    pub attributes: Vec<SamlAttribute>,
    /// Certificate embedded in the assertion signature.
    pub signing_certificate: Option<CertificateDer<'static>>,
}

impl SamlAssertion {
    /// Parses an assertion document.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError`] when the document is oversized, not well-formed,
    /// not an assertion, or carries unreadable timestamps or certificates.
    pub fn parse(xml: &[u8]) -> Result<Self, SamlError> {
        if xml.len() > MAX_SAML_BYTES {
            return Err(SamlError::TooLarge);
        }
        let root = Element::parse(xml).map_err(|err| SamlError::Malformed(err.to_string()))?;
        if root.name != ASSERTION {
            return Err(SamlError::UnexpectedRoot(root.name));
        }

        let confirmation = find_descendant(&root, SUBJECT_CONFIRMATION_DATA);
        let not_before = confirmation
            .and_then(|element| element.attributes.get("NotBefore"))
            .map(|value| parse_timestamp(value))
            .transpose()?;
        let not_on_or_after = confirmation
            .and_then(|element| element.attributes.get("NotOnOrAfter"))
            .map(|value| parse_timestamp(value))
            .transpose()?;

        let mut attribute_elements = Vec::new();
        collect_descendants(&root, ATTRIBUTE, &mut attribute_elements);
        let attributes = attribute_elements
            .into_iter()
            .filter_map(|element| {
                let name = element.attributes.get("Name")?.clone();
                let value = element
                    .get_child(ATTRIBUTE_VALUE)
                    .and_then(Element::get_text)
                    .map(|text| text.trim().to_string())
                    .unwrap_or_default();
                Some(SamlAttribute {
                    name,
                    value,
                })
            })
            .collect();

        let signing_certificate = find_descendant(&root, X509_CERTIFICATE)
            .and_then(Element::get_text)
            .map(|text| decode_certificate(&text))
            .transpose()?;

        Ok(Self {
            not_before,
            not_on_or_after,
            attributes,
            signing_certificate,
        })
    }

    /// Returns the value of the first attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    /// Returns the `TRUST_OVERALL` attribute value, when present.
    #[must_use]
    pub fn trust_overall(&self) -> Option<&str> {
        self.attribute(TRUST_OVERALL)
    }

    /// Returns true only when the host is explicitly reported as untrusted.
    ///
    /// Absent or unrecognized values do not mark the host untrusted.
    #[must_use]
    pub fn reports_untrusted(&self) -> bool {
        self.trust_overall().is_some_and(|value| value.trim().eq_ignore_ascii_case("false"))
    }

    /// Returns true when `now` falls inside the subject confirmation window.
    #[must_use]
    pub fn is_current(&self, now: OffsetDateTime) -> bool {
        let started = self.not_before.is_none_or(|not_before| now >= not_before);
        let not_ended = self.not_on_or_after.is_none_or(|not_on_or_after| now < not_on_or_after);
        started && not_ended
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the first descendant element with the given local name.
fn find_descendant<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    for child in element.children.iter().filter_map(XMLNode::as_element) {
        if child.name == name {
            return Some(child);
        }
        if let Some(found) = find_descendant(child, name) {
            return Some(found);
        }
    }
    None
}

/// Collects every descendant element with the given local name, in document order.
fn collect_descendants<'a>(element: &'a Element, name: &str, out: &mut Vec<&'a Element>) {
    for child in element.children.iter().filter_map(XMLNode::as_element) {
        if child.name == name {
            out.push(child);
        }
        collect_descendants(child, name, out);
    }
}

/// Parses an RFC 3339 timestamp attribute.
fn parse_timestamp(value: &str) -> Result<OffsetDateTime, SamlError> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).map_err(|err| SamlError::InvalidTimestamp {
        value: value.to_string(),
        message: err.to_string(),
    })
}

/// Decodes a base64 DER certificate, ignoring embedded whitespace.
fn decode_certificate(text: &str) -> Result<CertificateDer<'static>, SamlError> {
    let compact: String = text.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    let der =
        STANDARD.decode(compact).map_err(|err| SamlError::InvalidCertificate(err.to_string()))?;
    Ok(CertificateDer::from(der))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
