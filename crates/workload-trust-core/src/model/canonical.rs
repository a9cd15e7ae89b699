// crates/workload-trust-core/src/model/canonical.rs
// ============================================================================
// Module: Canonical Flavor Encoding
// Description: Byte-exact JSON encoding of the flavor signature input.
// Purpose: Reproduce the bytes existing flavor signers hash and sign.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Flavor signatures cover the compact JSON encoding of `{"Image": <flavor>}`
//! in struct field order. Existing signers escape `<`, `>`, `&`, U+2028 and
//! U+2029 inside strings, so the encoder here does the same.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;

use serde::Serialize;
use serde_json::ser::CompactFormatter;
use serde_json::ser::Formatter;
use serde_json::ser::Serializer;
use thiserror::Error;

use crate::model::flavor::ImageFlavor;
use crate::model::flavor::SignedFlavorPayload;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while encoding the signature input.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// JSON serialization failed.
    #[error("failed to encode flavor: {0}")]
    Encode(String),
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Returns the bytes a flavor signature is computed over.
///
/// # Errors
///
/// Returns [`CanonicalError::Encode`] when serialization fails.
pub fn flavor_signature_payload(flavor: &ImageFlavor) -> Result<Vec<u8>, CanonicalError> {
    to_signer_json(&SignedFlavorPayload {
        image: flavor,
    })
}

/// Serializes a value as compact JSON with signer-compatible string escaping.
///
/// # Errors
///
/// Returns [`CanonicalError::Encode`] when serialization fails.
pub fn to_signer_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let mut out = Vec::with_capacity(256);
    let mut serializer = Serializer::with_formatter(&mut out, SignerFormatter::default());
    value.serialize(&mut serializer).map_err(|err| CanonicalError::Encode(err.to_string()))?;
    Ok(out)
}

// ============================================================================
// SECTION: Formatter
// ============================================================================

/// Compact formatter escaping HTML-significant and line-separator characters.
#[derive(Debug, Default)]
struct SignerFormatter {
    /// Underlying compact formatter.
    inner: CompactFormatter,
}

impl Formatter for SignerFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            let escape = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            if start < index {
                self.inner.write_string_fragment(writer, &fragment[start..index])?;
            }
            writer.write_all(escape.as_bytes())?;
            start = index + ch.len_utf8();
        }
        if start < fragment.len() {
            self.inner.write_string_fragment(writer, &fragment[start..])?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions on known-good payloads.")]
mod tests {
    use super::*;
    use crate::model::flavor::FlavorDescription;
    use crate::model::flavor::FlavorEncryption;
    use crate::model::flavor::FlavorMeta;

    fn flavor(label: &str, encryption: Option<FlavorEncryption>) -> ImageFlavor {
        ImageFlavor {
            meta: FlavorMeta {
                id: "4e3f4f3c-5a7b-4d58-9b6a-0a8c1f1f2b3c".to_string(),
                description: FlavorDescription {
                    label: label.to_string(),
                    flavor_part: "IMAGE".to_string(),
                },
            },
            encryption_required: encryption.is_some(),
            encryption,
            integrity_enforced: false,
        }
    }

    #[test]
    fn payload_wraps_flavor_in_image_key_with_field_order() {
        let bytes = flavor_signature_payload(&flavor("plain", None)).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            concat!(
                r#"{"Image":{"meta":{"id":"4e3f4f3c-5a7b-4d58-9b6a-0a8c1f1f2b3c","#,
                r#""description":{"label":"plain","flavor_part":"IMAGE"}},"#,
                r#""encryption_required":false,"integrity_enforced":false}}"#
            )
        );
    }

    #[test]
    fn payload_includes_encryption_block_when_present() {
        let encryption = FlavorEncryption {
            key_url: "https://kbs.example.com/v1/keys/k/transfer".to_string(),
            digest: "YWJj".to_string(),
        };
        let bytes = flavor_signature_payload(&flavor("enc-image", Some(encryption))).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(
            r#""encryption":{"key_url":"https://kbs.example.com/v1/keys/k/transfer","digest":"YWJj"},"encryption_required":true"#
        ));
    }

    #[test]
    fn payload_escapes_html_characters_like_existing_signers() {
        let bytes = flavor_signature_payload(&flavor("a<b>&c\u{2028}", None)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""label":"a\u003cb\u003e\u0026c\u2028""#));
    }

    #[test]
    fn payload_keeps_standard_escapes() {
        let bytes = flavor_signature_payload(&flavor("quote\"back\\slash\n", None)).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""label":"quote\"back\\slash\n""#));
    }
}
