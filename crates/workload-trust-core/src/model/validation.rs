// crates/workload-trust-core/src/model/validation.rs
// ============================================================================
// Module: Input Validation
// Description: Format checks for identifiers, URLs and digests.
// Purpose: Reject malformed input before any rule or network call runs.
// Dependencies: base64, url, uuid
// ============================================================================

//! ## Overview
//! Identifier checks accept only the hyphenated, 36-character UUID form.
//! Instance, image and flavor identifiers must additionally be version 4;
//! hardware UUIDs are reported by firmware and may use any version.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;
use uuid::Uuid;
use uuid::Version;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Length of the hyphenated UUID form.
const HYPHENATED_UUID_LEN: usize = 36;

// ============================================================================
// SECTION: Validators
// ============================================================================

/// Parses a hyphenated UUID, rejecting simple, braced and URN forms.
#[must_use]
pub fn parse_hyphenated_uuid(value: &str) -> Option<Uuid> {
    if value.len() != HYPHENATED_UUID_LEN {
        return None;
    }
    Uuid::try_parse(value).ok()
}

/// Returns true when the value is a hyphenated version 4 UUID.
#[must_use]
pub fn is_uuid_v4(value: &str) -> bool {
    parse_hyphenated_uuid(value).is_some_and(|uuid| uuid.get_version() == Some(Version::Random))
}

/// Returns true when the value is a hyphenated hardware UUID.
#[must_use]
pub fn is_hardware_uuid(value: &str) -> bool {
    parse_hyphenated_uuid(value).is_some()
}

/// Parses a URL and requires the `https` scheme.
#[must_use]
pub fn parse_https_url(value: &str) -> Option<Url> {
    Url::parse(value).ok().filter(|url| url.scheme() == "https")
}

/// Returns true when the value is valid standard base64.
#[must_use]
pub fn is_base64(value: &str) -> bool {
    STANDARD.decode(value).is_ok()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_v4_requires_version_four() {
        assert!(is_uuid_v4("0f6e1a84-5b1e-4b9c-8f3d-2b9a8c7d6e5f"));
        assert!(!is_uuid_v4("0f6e1a84-5b1e-1b9c-8f3d-2b9a8c7d6e5f"));
    }

    #[test]
    fn uuid_checks_reject_non_hyphenated_forms() {
        assert!(!is_hardware_uuid("0f6e1a845b1e4b9c8f3d2b9a8c7d6e5f"));
        assert!(!is_hardware_uuid("{0f6e1a84-5b1e-4b9c-8f3d-2b9a8c7d6e5f}"));
        assert!(!is_hardware_uuid("not-a-uuid"));
        assert!(is_hardware_uuid("00964993-89c1-e711-906e-00163566263e"));
    }

    #[test]
    fn https_url_rejects_other_schemes() {
        assert!(parse_https_url("https://kbs.example.com/v1/keys").is_some());
        assert!(parse_https_url("http://kbs.example.com/v1/keys").is_none());
        assert!(parse_https_url("kbs.example.com").is_none());
    }

    #[test]
    fn base64_validation() {
        assert!(is_base64("c2hhMzg0"));
        assert!(!is_base64("not base64!"));
    }
}
