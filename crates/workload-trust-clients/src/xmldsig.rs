// crates/workload-trust-clients/src/xmldsig.rs
// ============================================================================
// Module: Enveloped XML Signatures
// Description: XML-DSig verification of signed SAML assertions.
// Purpose: Bind the assertion content to the signer certificate's key.
// Dependencies: xmltree, rsa, sha2, base64, x509-parser
// ============================================================================

//! ## Overview
//! An assertion is accepted only when its enveloped `ds:Signature` covers the
//! whole assertion: a single `Reference` to the document element, a digest
//! that matches the canonical assertion without its signature, and an RSA
//! PKCS #1 v1.5 `SignatureValue` over the canonical `SignedInfo`.
//! Invariants:
//! - Only exclusive c14n and the enveloped-signature transform are accepted.
//! - Unknown algorithms, extra references and foreign URIs are rejected.
//! - The verifying key is always the one of the certificate passed in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::Pkcs1v15Sign;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rustls_pki_types::CertificateDer;
use sha2::Digest;
use sha2::Sha256;
use sha2::Sha384;
use sha2::Sha512;
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use xmltree::Element;
use xmltree::XMLNode;

use crate::c14n::C14nTarget;
use crate::c14n::canonicalize;

// ============================================================================
// SECTION: Algorithm Identifiers
// ============================================================================

/// XML-DSig namespace.
pub(crate) const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
/// Exclusive canonicalization without comments.
const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// Enveloped signature transform.
const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
/// RSA PKCS #1 v1.5 with SHA-256.
const RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
/// RSA PKCS #1 v1.5 with SHA-384.
const RSA_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384";
/// RSA PKCS #1 v1.5 with SHA-512.
const RSA_SHA512: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512";
/// SHA-256 digest.
const DIGEST_SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
/// SHA-384 digest.
const DIGEST_SHA384: &str = "http://www.w3.org/2001/04/xmldsig-more#sha384";
/// SHA-512 digest.
const DIGEST_SHA512: &str = "http://www.w3.org/2001/04/xmlenc#sha512";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// XML signature verification errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Document or signature structure is unreadable.
    #[error("malformed signed xml: {0}")]
    Malformed(String),
    /// Algorithm or reference form is not accepted.
    #[error("unsupported signature: {0}")]
    Unsupported(String),
    /// Signer certificate does not carry a usable RSA key.
    #[error("unsupported signer key: {0}")]
    PublicKey(String),
    /// Canonical assertion does not match the signed digest.
    #[error("reference digest mismatch")]
    DigestMismatch,
    /// `SignatureValue` does not verify under the signer key.
    #[error("signature value mismatch: {0}")]
    SignatureMismatch(String),
}

// ============================================================================
// SECTION: Signature Model
// ============================================================================

/// Hash functions usable for digests and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashAlgorithm {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Maps a `DigestMethod` URI.
    fn from_digest_uri(uri: &str) -> Result<Self, SignatureError> {
        match uri {
            DIGEST_SHA256 => Ok(Self::Sha256),
            DIGEST_SHA384 => Ok(Self::Sha384),
            DIGEST_SHA512 => Ok(Self::Sha512),
            other => Err(SignatureError::Unsupported(format!("digest method {other}"))),
        }
    }

    /// Maps a `SignatureMethod` URI.
    fn from_signature_uri(uri: &str) -> Result<Self, SignatureError> {
        match uri {
            RSA_SHA256 => Ok(Self::Sha256),
            RSA_SHA384 => Ok(Self::Sha384),
            RSA_SHA512 => Ok(Self::Sha512),
            other => Err(SignatureError::Unsupported(format!("signature method {other}"))),
        }
    }

    /// Hashes `data`.
    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// PKCS #1 v1.5 padding scheme for this hash.
    fn pkcs1v15(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }
}

/// Enveloped signature read from the document element.
#[derive(Debug, Clone)]
pub struct EnvelopedSignature {
    /// Inclusive prefixes for canonicalizing `SignedInfo`.
    signed_info_prefixes: Vec<String>,
    /// Hash used by `SignatureMethod`.
    signature_hash: HashAlgorithm,
    /// Whether the reference drops the signature before digesting.
    enveloped: bool,
    /// Inclusive prefixes for canonicalizing the assertion.
    reference_prefixes: Vec<String>,
    /// Hash used by `DigestMethod`.
    digest_hash: HashAlgorithm,
    /// Decoded `DigestValue`.
    digest_value: Vec<u8>,
    /// Decoded `SignatureValue`.
    signature_value: Vec<u8>,
    /// Certificate from `KeyInfo`, when present.
    certificate: Option<CertificateDer<'static>>,
}

impl EnvelopedSignature {
    /// Reads the signature of the document element.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] when the document carries no single
    /// well-formed signature over itself or uses unaccepted algorithms.
    pub fn parse(xml: &[u8]) -> Result<Self, SignatureError> {
        let root = Element::parse(xml).map_err(|err| SignatureError::Malformed(err.to_string()))?;
        let mut signatures = dsig_children(&root, "Signature");
        let signature = match (signatures.next(), signatures.next()) {
            (Some(signature), None) => signature,
            (None, _) => return Err(SignatureError::Malformed("signature missing".to_string())),
            (Some(_), Some(_)) => {
                return Err(SignatureError::Unsupported("multiple signatures".to_string()));
            }
        };
        let signed_info = required_child(signature, "SignedInfo")?;

        let canonicalization = required_child(signed_info, "CanonicalizationMethod")?;
        let method = algorithm(canonicalization)?;
        if method != EXC_C14N {
            return Err(SignatureError::Unsupported(format!("canonicalization method {method}")));
        }
        let signed_info_prefixes = inclusive_prefixes(canonicalization);
        let signature_hash = HashAlgorithm::from_signature_uri(algorithm(required_child(
            signed_info,
            "SignatureMethod",
        )?)?)?;

        let mut references = dsig_children(signed_info, "Reference");
        let reference = match (references.next(), references.next()) {
            (Some(reference), None) => reference,
            _ => {
                return Err(SignatureError::Unsupported(
                    "exactly one reference is required".to_string(),
                ));
            }
        };
        let uri = reference.attributes.get("URI").map_or("", String::as_str);
        let root_id = root.attributes.get("ID").map_or("", String::as_str);
        let targets_root = uri.is_empty() || (!root_id.is_empty() && uri == format!("#{root_id}"));
        if !targets_root {
            return Err(SignatureError::Unsupported(format!("reference uri {uri}")));
        }

        let mut enveloped = false;
        let mut reference_prefixes = None;
        if let Some(transforms) = dsig_children(reference, "Transforms").next() {
            for transform in dsig_children(transforms, "Transform") {
                match algorithm(transform)? {
                    ENVELOPED_SIGNATURE => enveloped = true,
                    EXC_C14N => reference_prefixes = Some(inclusive_prefixes(transform)),
                    other => {
                        return Err(SignatureError::Unsupported(format!("transform {other}")));
                    }
                }
            }
        }
        let Some(reference_prefixes) = reference_prefixes else {
            return Err(SignatureError::Unsupported(
                "reference must use exclusive canonicalization".to_string(),
            ));
        };
        let digest_hash = HashAlgorithm::from_digest_uri(algorithm(required_child(
            reference,
            "DigestMethod",
        )?)?)?;
        let digest_value = decode_base64(&required_text(reference, "DigestValue")?)?;
        let signature_value = decode_base64(&required_text(signature, "SignatureValue")?)?;

        let certificate = dsig_children(signature, "KeyInfo")
            .flat_map(|key_info| dsig_children(key_info, "X509Data"))
            .flat_map(|data| dsig_children(data, "X509Certificate"))
            .next()
            .and_then(Element::get_text)
            .map(|text| decode_base64(&text).map(CertificateDer::from))
            .transpose()?;

        Ok(Self {
            signed_info_prefixes,
            signature_hash,
            enveloped,
            reference_prefixes,
            digest_hash,
            digest_value,
            signature_value,
            certificate,
        })
    }

    /// Certificate carried in the signature's `KeyInfo`.
    #[must_use]
    pub const fn certificate(&self) -> Option<&CertificateDer<'static>> {
        self.certificate.as_ref()
    }

    /// Checks the reference digest and the signature value of `xml`.
    ///
    /// `xml` must be the document this signature was parsed from.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] when the content was altered after
    /// signing or the signature was not made by `signer`'s key.
    pub fn verify(&self, xml: &[u8], signer: &X509Certificate<'_>) -> Result<(), SignatureError> {
        let canonical = canonicalize(
            xml,
            C14nTarget::Document {
                enveloped: self.enveloped,
            },
            &self.reference_prefixes,
        )?;
        if self.digest_hash.digest(&canonical) != self.digest_value {
            return Err(SignatureError::DigestMismatch);
        }

        let signed_info = canonicalize(xml, C14nTarget::SignedInfo, &self.signed_info_prefixes)?;
        let public_key = RsaPublicKey::from_public_key_der(signer.public_key().raw)
            .map_err(|err| SignatureError::PublicKey(err.to_string()))?;
        public_key
            .verify(
                self.signature_hash.pkcs1v15(),
                &self.signature_hash.digest(&signed_info),
                &self.signature_value,
            )
            .map_err(|err| SignatureError::SignatureMismatch(err.to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Iterates XML-DSig child elements with the given local name.
fn dsig_children<'a>(element: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    element
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .filter(move |child| child.name == name && child.namespace.as_deref() == Some(DSIG_NS))
}

/// Returns the single required XML-DSig child.
fn required_child<'a>(element: &'a Element, name: &'a str) -> Result<&'a Element, SignatureError> {
    dsig_children(element, name)
        .next()
        .ok_or_else(|| SignatureError::Malformed(format!("{name} missing")))
}

/// Returns the text of a required XML-DSig child.
fn required_text(element: &Element, name: &str) -> Result<String, SignatureError> {
    required_child(element, name)?
        .get_text()
        .map(|text| text.into_owned())
        .ok_or_else(|| SignatureError::Malformed(format!("{name} is empty")))
}

/// Returns the `Algorithm` attribute.
fn algorithm(element: &Element) -> Result<&str, SignatureError> {
    element
        .attributes
        .get("Algorithm")
        .map(String::as_str)
        .ok_or_else(|| SignatureError::Malformed(format!("{} has no Algorithm", element.name)))
}

/// Reads the `InclusiveNamespaces` prefix list of a canonicalization element.
fn inclusive_prefixes(element: &Element) -> Vec<String> {
    element
        .children
        .iter()
        .filter_map(XMLNode::as_element)
        .find(|child| {
            child.name == "InclusiveNamespaces" && child.namespace.as_deref() == Some(EXC_C14N)
        })
        .and_then(|child| child.attributes.get("PrefixList"))
        .map(|list| list.split_ascii_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Decodes base64 text, ignoring embedded whitespace.
fn decode_base64(text: &str) -> Result<Vec<u8>, SignatureError> {
    let compact: String = text.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    STANDARD.decode(compact).map_err(|err| SignatureError::Malformed(err.to_string()))
}
