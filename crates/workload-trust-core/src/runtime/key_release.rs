// crates/workload-trust-core/src/runtime/key_release.rs
// ============================================================================
// Module: Attestation-Gated Key Release
// Description: Releases image decryption keys to freshly attested hosts.
// Purpose: Bind key release to a verified, current host trust report.
// Dependencies: crate::interfaces, crate::saml, crate::runtime::key_cache
// ============================================================================

//! ## Overview
//! Every request fetches a new attestation report for the host, even when a
//! key is cached. The report must be well-formed, carry a signature that
//! chains to the configured CAs, be inside its validity window and must not
//! report the host untrusted. Only then is a cached key served or the key
//! broker asked for one.
//! Invariants:
//! - No key bytes are returned together with an error.
//! - A cached key is served only for the same key id and before it expires.
//! - A failed broker call leaves the cache untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use time::Duration;
use url::Url;

use crate::audit::KeyReleaseEvent;
use crate::audit::KeyReleaseOutcome;
use crate::audit::StderrAuditSink;
use crate::audit::TrustAuditSink;
use crate::certs::load_root_cas;
use crate::interfaces::AttestationService;
use crate::interfaces::BrokerEndpoint;
use crate::interfaces::KeyBroker;
use crate::interfaces::SamlVerifier;
use crate::model::clock::Clock;
use crate::model::clock::SystemClock;
use crate::model::flavor::ImageFlavor;
use crate::model::validation::is_hardware_uuid;
use crate::model::validation::parse_hyphenated_uuid;
use crate::model::validation::parse_https_url;
use crate::runtime::key_cache::CachedKey;
use crate::runtime::key_cache::KeyCache;
use crate::saml::SamlAssertion;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default lifetime of a cached key, in seconds.
pub const DEFAULT_CACHE_TTL_SECONDS: i64 = 300;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Key release settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReleaseConfig {
    /// PEM file of CAs trusted to sign attestation assertions.
    pub saml_ca_file: PathBuf,
    /// Directory of trusted root CA certificates.
    pub trusted_cas_dir: PathBuf,
    /// Lifetime of cached keys.
    pub cache_ttl: Duration,
}

impl KeyReleaseConfig {
    /// Creates settings with the default cache lifetime.
    #[must_use]
    pub fn new(saml_ca_file: PathBuf, trusted_cas_dir: PathBuf) -> Self {
        Self {
            saml_ca_file,
            trusted_cas_dir,
            cache_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECONDS),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key release errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum KeyReleaseError {
    /// Hardware UUID is malformed.
    #[error("invalid hardware uuid: {0}")]
    InvalidHardwareUuid(String),
    /// Key URL is malformed or carries no key id.
    #[error("invalid key url: {0}")]
    InvalidKeyUrl(String),
    /// Attestation report could not be fetched.
    #[error("attestation report unavailable: {0}")]
    Attestation(String),
    /// Attestation report is not a readable assertion.
    #[error("malformed attestation report: {0}")]
    MalformedAssertion(String),
    /// Assertion signature did not verify.
    #[error("attestation report signature is not trusted")]
    SignatureInvalid,
    /// Assertion validity window does not contain the current time.
    #[error("attestation report is not current")]
    AssertionNotCurrent,
    /// Attestation reports the host as untrusted.
    #[error("host is untrusted")]
    HostUntrusted,
    /// Trusted CA certificates could not be loaded.
    #[error("trusted certificates unavailable: {0}")]
    Certificates(String),
    /// Key broker refused or failed.
    #[error("key broker transfer failed: {0}")]
    Broker(String),
    /// Broker returned key material that is not base64.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// Flavor does not require encryption.
    #[error("flavor does not require encryption")]
    FlavorNotEncrypted,
    /// Flavor requires encryption but carries no key URL.
    #[error("flavor has no key url")]
    MissingKeyUrl,
}

impl KeyReleaseError {
    /// Returns true when the caller supplied bad input rather than the
    /// release being refused or failing downstream.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHardwareUuid(_)
                | Self::InvalidKeyUrl(_)
                | Self::FlavorNotEncrypted
                | Self::MissingKeyUrl
        )
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Releases keys only to hosts with a fresh, verified, trusted attestation.
#[derive(Clone)]
pub struct KeyReleaseGate {
    /// Release settings.
    config: KeyReleaseConfig,
    /// Attestation report source.
    attestation: Arc<dyn AttestationService>,
    /// Assertion signature verifier.
    saml_verifier: Arc<dyn SamlVerifier>,
    /// Key broker.
    broker: Arc<dyn KeyBroker>,
    /// Shared key cache.
    cache: Arc<KeyCache>,
    /// Time source for expiry decisions.
    clock: Arc<dyn Clock>,
    /// Sink receiving release decisions.
    audit: Arc<dyn TrustAuditSink>,
}

impl KeyReleaseGate {
    /// Creates a gate using the system clock and a stderr audit sink.
    #[must_use]
    pub fn new(
        config: KeyReleaseConfig,
        attestation: Arc<dyn AttestationService>,
        saml_verifier: Arc<dyn SamlVerifier>,
        broker: Arc<dyn KeyBroker>,
        cache: Arc<KeyCache>,
    ) -> Self {
        Self {
            config,
            attestation,
            saml_verifier,
            broker,
            cache,
            clock: Arc::new(SystemClock),
            audit: Arc::new(StderrAuditSink),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn TrustAuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the shared key cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    /// Releases the key at `key_url` to the host with the given hardware UUID.
    ///
    /// # Errors
    ///
    /// Returns [`KeyReleaseError`] when input is malformed, attestation
    /// cannot be verified, the host is untrusted, or the broker fails.
    pub fn transfer_key(
        &self,
        hardware_uuid: &str,
        key_url: &str,
    ) -> Result<Vec<u8>, KeyReleaseError> {
        let key_id = extract_key_id(key_url);
        match self.release(hardware_uuid, key_url) {
            Ok((bytes, outcome)) => {
                self.record(hardware_uuid, key_id.as_deref(), outcome, None);
                Ok(bytes)
            }
            Err(err) => {
                self.record(
                    hardware_uuid,
                    key_id.as_deref(),
                    KeyReleaseOutcome::Denied,
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Releases the key of an encrypted image flavor to a host.
    ///
    /// # Errors
    ///
    /// Returns [`KeyReleaseError::FlavorNotEncrypted`] or
    /// [`KeyReleaseError::MissingKeyUrl`] for flavors without a key, and any
    /// [`Self::transfer_key`] error otherwise.
    pub fn retrieve_flavor_key(
        &self,
        flavor: &ImageFlavor,
        hardware_uuid: &str,
    ) -> Result<Vec<u8>, KeyReleaseError> {
        let key_url = if flavor.encryption_required {
            flavor.key_url().ok_or(KeyReleaseError::MissingKeyUrl)
        } else {
            Err(KeyReleaseError::FlavorNotEncrypted)
        };
        match key_url {
            Ok(key_url) => self.transfer_key(hardware_uuid, key_url),
            Err(err) => {
                self.record(hardware_uuid, None, KeyReleaseOutcome::Denied, Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Runs the release sequence without auditing.
    fn release(
        &self,
        hardware_uuid: &str,
        key_url: &str,
    ) -> Result<(Vec<u8>, KeyReleaseOutcome), KeyReleaseError> {
        if !is_hardware_uuid(hardware_uuid) {
            return Err(KeyReleaseError::InvalidHardwareUuid(hardware_uuid.to_string()));
        }
        let key_id =
            extract_key_id(key_url).ok_or_else(|| KeyReleaseError::InvalidKeyUrl(key_url.to_string()))?;

        let saml = self
            .attestation
            .fetch_saml_report(hardware_uuid)
            .map_err(|err| KeyReleaseError::Attestation(err.to_string()))?;
        let assertion = SamlAssertion::parse(&saml)
            .map_err(|err| KeyReleaseError::MalformedAssertion(err.to_string()))?;

        let root_cas = load_root_cas(&self.config.trusted_cas_dir)
            .map_err(|err| KeyReleaseError::Certificates(err.to_string()))?;
        if !self.saml_verifier.verify_saml_signature(&saml, &self.config.saml_ca_file, &root_cas) {
            return Err(KeyReleaseError::SignatureInvalid);
        }

        let now = self.clock.now();
        if !assertion.is_current(now) {
            return Err(KeyReleaseError::AssertionNotCurrent);
        }
        if assertion.reports_untrusted() {
            return Err(KeyReleaseError::HostUntrusted);
        }

        if let Some(cached) = self.cache.get(hardware_uuid)
            && !cached.is_expired(now)
            && cached.id == key_id
        {
            return Ok((cached.bytes, KeyReleaseOutcome::ReleasedFromCache));
        }

        let base_url = parse_https_url(key_url)
            .and_then(|url| broker_base_url(&url, &key_id))
            .ok_or_else(|| KeyReleaseError::InvalidKeyUrl(key_url.to_string()))?;
        let endpoint = BrokerEndpoint {
            base_url,
            root_cas,
        };
        let transfer = self
            .broker
            .transfer_key_with_saml(&endpoint, &key_id, &saml)
            .map_err(|err| KeyReleaseError::Broker(err.to_string()))?;
        let bytes = STANDARD
            .decode(transfer.wrapped_key.trim())
            .map_err(|err| KeyReleaseError::InvalidKey(err.to_string()))?;

        self.cache.store(
            hardware_uuid,
            CachedKey {
                id: key_id,
                bytes: bytes.clone(),
                created: now,
                expired: now.saturating_add(self.config.cache_ttl),
            },
        );
        Ok((bytes, KeyReleaseOutcome::ReleasedFromBroker))
    }

    /// Emits a key release audit event.
    fn record(
        &self,
        hardware_uuid: &str,
        key_id: Option<&str>,
        outcome: KeyReleaseOutcome,
        reason: Option<String>,
    ) {
        self.audit.record_key_release(&KeyReleaseEvent::new(hardware_uuid, key_id, outcome, reason));
    }
}

// ============================================================================
// SECTION: Key URL Helpers
// ============================================================================

/// Returns the first UUID-shaped path segment of an https key URL.
#[must_use]
pub fn extract_key_id(key_url: &str) -> Option<String> {
    let url = parse_https_url(key_url)?;
    url.path_segments()?
        .find(|segment| parse_hyphenated_uuid(segment).is_some())
        .map(str::to_string)
}

/// Strips the trailing `keys/<id>/transfer` from a key URL.
///
/// Returns `None` when the URL does not end with that suffix.
#[must_use]
pub fn broker_base_url(key_url: &Url, key_id: &str) -> Option<Url> {
    let segments: Vec<&str> =
        key_url.path_segments()?.filter(|segment| !segment.is_empty()).collect();
    let [prefix @ .., keys, id, transfer] = segments.as_slice() else {
        return None;
    };
    if *keys != "keys" || *id != key_id || *transfer != "transfer" {
        return None;
    }
    let mut path = String::from("/");
    for segment in prefix {
        path.push_str(segment);
        path.push('/');
    }
    let mut base = key_url.clone();
    base.set_path(&path);
    base.set_query(None);
    base.set_fragment(None);
    Some(base)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
