// crates/workload-trust-core/src/model/flavor.rs
// ============================================================================
// Module: Image Flavors
// Description: Image flavor policy documents and their signed envelope.
// Purpose: Provide the wire model shared by trust verification and key release.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`ImageFlavor`] declares the encryption and integrity properties an image
//! must exhibit. A [`SignedImageFlavor`] pairs it with a detached RSA signature.
//! Field names and field order are part of the signature input and must not
//! change.
//! Invariants:
//! - Serialization order follows struct declaration order.
//! - Optional encryption fields are omitted when empty.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Flavor Part
// ============================================================================

/// Wire label for VM image flavors.
pub const FLAVOR_PART_IMAGE: &str = "IMAGE";
/// Wire label for container image flavors.
pub const FLAVOR_PART_CONTAINER_IMAGE: &str = "CONTAINER_IMAGE";

/// Flavor part recognized by the trust engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlavorPart {
    /// Virtual machine image.
    Image,
    /// Container image.
    ContainerImage,
}

impl FlavorPart {
    /// Parses a wire label. Returns `None` for unsupported parts.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            FLAVOR_PART_IMAGE => Some(Self::Image),
            FLAVOR_PART_CONTAINER_IMAGE => Some(Self::ContainerImage),
            _ => None,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => FLAVOR_PART_IMAGE,
            Self::ContainerImage => FLAVOR_PART_CONTAINER_IMAGE,
        }
    }
}

impl fmt::Display for FlavorPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Flavor Types
// ============================================================================

/// Human-readable flavor description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorDescription {
    /// Unique flavor label.
    pub label: String,
    /// Flavor part label (`IMAGE` or `CONTAINER_IMAGE`).
    pub flavor_part: String,
}

/// Flavor identity metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorMeta {
    /// Flavor identifier (UUIDv4 string).
    pub id: String,
    /// Flavor description.
    pub description: FlavorDescription,
}

/// Encryption details for an encrypted image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorEncryption {
    /// Key broker transfer URL for the image decryption key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_url: String,
    /// Base64 digest of the encrypted image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
}

/// Image flavor policy document.
///
/// # Invariants
/// - Immutable once created; identified by `meta.id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFlavor {
    /// Identity metadata.
    pub meta: FlavorMeta,
    /// Optional encryption block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<FlavorEncryption>,
    /// Whether instances launched from this image must be encrypted.
    pub encryption_required: bool,
    /// Whether container image integrity must be enforced.
    #[serde(default)]
    pub integrity_enforced: bool,
}

impl ImageFlavor {
    /// Returns the key URL when one is configured and non-empty.
    #[must_use]
    pub fn key_url(&self) -> Option<&str> {
        self.encryption
            .as_ref()
            .map(|encryption| encryption.key_url.as_str())
            .filter(|url| !url.is_empty())
    }
}

/// Image flavor paired with its detached signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedImageFlavor {
    /// Signed flavor document.
    #[serde(rename = "flavor")]
    pub image_flavor: ImageFlavor,
    /// Base64 RSA PKCS#1 v1.5 signature over the SHA-384 flavor digest.
    pub signature: String,
}

/// Wrapper whose canonical encoding is the signature input.
#[derive(Debug, Serialize)]
pub(crate) struct SignedFlavorPayload<'a> {
    /// Flavor being signed.
    #[serde(rename = "Image")]
    pub(crate) image: &'a ImageFlavor,
}
