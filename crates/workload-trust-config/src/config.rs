// crates/workload-trust-config/src/config.rs
// ============================================================================
// Module: Workload Trust Configuration
// Description: Configuration loading and validation for workload trust.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: workload-trust-core, workload-trust-clients, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Certificate directories and files must exist when the config is loaded;
//! missing or invalid configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Duration;
use url::Url;
use workload_trust_clients::HttpPolicy;
use workload_trust_clients::HvsClientConfig;
use workload_trust_core::FileAuditSink;
use workload_trust_core::KeyReleaseConfig;
use workload_trust_core::NoopAuditSink;
use workload_trust_core::StderrAuditSink;
use workload_trust_core::TrustAuditSink;
use workload_trust_core::certs::load_root_cas;
use workload_trust_core::runtime::DEFAULT_CACHE_TTL_SECONDS as CORE_CACHE_TTL_SECONDS;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "workload-trust.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "WORKLOAD_TRUST_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default outbound request timeout in milliseconds.
pub(crate) const DEFAULT_TIMEOUT_MS: u64 = 10_000;
/// Maximum outbound request timeout in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 120_000;
/// Default maximum response size in bytes.
pub(crate) const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
/// Upper bound for configured response size limits.
pub(crate) const MAX_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
/// Default key cache lifetime in seconds.
pub(crate) const DEFAULT_CACHE_TTL_SECONDS: u64 = CORE_CACHE_TTL_SECONDS.unsigned_abs();
/// Maximum key cache lifetime in seconds.
pub(crate) const MAX_CACHE_TTL_SECONDS: u64 = 86_400;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Workload trust configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadTrustConfig {
    /// Flavor verification settings.
    pub verification: VerificationConfig,
    /// Attestation service settings; required for key release.
    #[serde(default)]
    pub attestation: Option<AttestationConfig>,
    /// Key release settings; required for key release.
    #[serde(default)]
    pub key_release: Option<KeyReleaseSettings>,
    /// Audit logging settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl WorkloadTrustConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.verification.validate()?;
        if let Some(attestation) = &self.attestation {
            attestation.validate()?;
        }
        if let Some(key_release) = &self.key_release {
            key_release.validate()?;
        }
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the key release settings for the core gate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `[key_release]` is absent.
    pub fn key_release_config(&self) -> Result<KeyReleaseConfig, ConfigError> {
        let settings = self.key_release.as_ref().ok_or_else(|| missing_section("key_release"))?;
        settings.to_core(self.verification.trusted_cas_dir())
    }

    /// Returns the attestation settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `[attestation]` is absent.
    pub fn attestation(&self) -> Result<&AttestationConfig, ConfigError> {
        self.attestation.as_ref().ok_or_else(|| missing_section("attestation"))
    }

    /// Builds the attestation client configuration.
    ///
    /// The client trusts the certificates of `verification.trusted_cas_dir`
    /// in addition to the bundled web roots.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `[attestation]` is absent, the URL or
    /// bearer token cannot be resolved, or the trusted CAs cannot be loaded.
    pub fn attestation_client_config(&self) -> Result<HvsClientConfig, ConfigError> {
        let attestation = self.attestation()?;
        let root_cas = load_root_cas(self.verification.trusted_cas_dir()).map_err(|err| {
            ConfigError::Invalid(format!("verification.trusted_cas_dir is unusable: {err}"))
        })?;
        Ok(HvsClientConfig {
            base_url: attestation.base_url()?,
            bearer_token: attestation.bearer_token()?,
            root_cas,
            policy: attestation.http_policy(),
        })
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Flavor verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
    /// Directory of candidate flavor signing certificates (PEM).
    pub signing_certs_dir: String,
    /// Directory of trusted root CA certificates (PEM).
    pub trusted_cas_dir: String,
    /// Skip the flavor signature rule (explicit opt-in only).
    #[serde(default)]
    pub skip_flavor_signature_verification: bool,
}

impl VerificationConfig {
    /// Validates verification configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_existing_dir("verification.signing_certs_dir", &self.signing_certs_dir)?;
        validate_existing_dir("verification.trusted_cas_dir", &self.trusted_cas_dir)
    }

    /// Signing certificate directory.
    #[must_use]
    pub fn signing_certs_dir(&self) -> &Path {
        Path::new(self.signing_certs_dir.trim())
    }

    /// Trusted CA directory.
    #[must_use]
    pub fn trusted_cas_dir(&self) -> &Path {
        Path::new(self.trusted_cas_dir.trim())
    }
}

// ============================================================================
// SECTION: Attestation
// ============================================================================

/// Attestation service (HVS) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttestationConfig {
    /// Service base URL.
    pub base_url: String,
    /// Environment variable holding the bearer token, when one is required.
    #[serde(default)]
    pub bearer_token_env: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum report size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Allow cleartext HTTP (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
}

impl AttestationConfig {
    /// Validates attestation configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url()?;
        validate_scheme("attestation.base_url", &url, self.allow_http)?;
        if let Some(name) = &self.bearer_token_env
            && name.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "attestation.bearer_token_env must be non-empty".to_string(),
            ));
        }
        validate_limits("attestation", self.timeout_ms, self.max_response_bytes)
    }

    /// Parses the base URL, ensuring it ends with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the URL does not parse.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(self.base_url.trim()).map_err(|err| {
            ConfigError::Invalid(format!("attestation.base_url is invalid: {err}"))
        })?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Reads the bearer token from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is configured but unset.
    pub fn bearer_token(&self) -> Result<Option<String>, ConfigError> {
        let Some(name) = &self.bearer_token_env else {
            return Ok(None);
        };
        env::var(name.trim())
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("environment variable {name} is not set")))
    }

    /// Transport limits for the attestation client.
    #[must_use]
    pub fn http_policy(&self) -> HttpPolicy {
        http_policy(self.allow_http, self.timeout_ms, self.max_response_bytes)
    }
}

// ============================================================================
// SECTION: Key Release
// ============================================================================

/// Key release configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyReleaseSettings {
    /// PEM file of CAs trusted to sign attestation assertions.
    pub saml_ca_file: String,
    /// Lifetime of cached keys in seconds.
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    /// Key broker request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum key broker response size in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// Allow cleartext HTTP to the key broker (disabled by default).
    #[serde(default)]
    pub allow_http: bool,
}

impl KeyReleaseSettings {
    /// Validates key release configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("key_release.saml_ca_file", &self.saml_ca_file)?;
        if !Path::new(self.saml_ca_file.trim()).is_file() {
            return Err(ConfigError::Invalid(
                "key_release.saml_ca_file must be an existing file".to_string(),
            ));
        }
        if self.cache_ttl_seconds == 0 || self.cache_ttl_seconds > MAX_CACHE_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "key_release.cache_ttl_seconds must be between 1 and {MAX_CACHE_TTL_SECONDS}"
            )));
        }
        validate_limits("key_release", self.timeout_ms, self.max_response_bytes)
    }

    /// Converts the settings to the core gate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the cache lifetime overflows.
    pub fn to_core(&self, trusted_cas_dir: &Path) -> Result<KeyReleaseConfig, ConfigError> {
        let seconds = i64::try_from(self.cache_ttl_seconds).map_err(|_| {
            ConfigError::Invalid("key_release.cache_ttl_seconds is too large".to_string())
        })?;
        Ok(KeyReleaseConfig {
            saml_ca_file: PathBuf::from(self.saml_ca_file.trim()),
            trusted_cas_dir: trusted_cas_dir.to_path_buf(),
            cache_ttl: Duration::seconds(seconds),
        })
    }

    /// Transport limits for the key broker client.
    #[must_use]
    pub fn http_policy(&self) -> HttpPolicy {
        http_policy(self.allow_http, self.timeout_ms, self.max_response_bytes)
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Audit events discarded.
    #[serde(rename = "none")]
    Disabled,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Audit sink selection.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path (JSON lines), required for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()));
        }
        Ok(())
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn build_sink(&self) -> Result<Arc<dyn TrustAuditSink>, ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::Stderr, _) => Ok(Arc::new(StderrAuditSink)),
            (AuditSinkKind::Disabled, _) => Ok(Arc::new(NoopAuditSink)),
            (AuditSinkKind::File, Some(path)) => FileAuditSink::new(Path::new(path.trim()))
                .map(|sink| Arc::new(sink) as Arc<dyn TrustAuditSink>)
                .map_err(|err| ConfigError::Io(err.to_string())),
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a path string naming an existing directory.
fn validate_existing_dir(field: &str, value: &str) -> Result<(), ConfigError> {
    validate_path_string(field, value)?;
    if !Path::new(value.trim()).is_dir() {
        return Err(ConfigError::Invalid(format!("{field} must be an existing directory")));
    }
    Ok(())
}

/// Requires `https`, or `http` when explicitly allowed.
fn validate_scheme(field: &str, url: &Url, allow_http: bool) -> Result<(), ConfigError> {
    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        other => Err(ConfigError::Invalid(format!("{field} scheme {other} is not allowed"))),
    }
}

/// Validates timeout and response size bounds.
fn validate_limits(section: &str, timeout_ms: u64, max_response_bytes: usize) -> Result<(), ConfigError> {
    if timeout_ms == 0 || timeout_ms > MAX_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "{section}.timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"
        )));
    }
    if max_response_bytes == 0 || max_response_bytes > MAX_MAX_RESPONSE_BYTES {
        return Err(ConfigError::Invalid(format!(
            "{section}.max_response_bytes must be between 1 and {MAX_MAX_RESPONSE_BYTES}"
        )));
    }
    Ok(())
}

/// Builds client transport limits.
fn http_policy(allow_http: bool, timeout_ms: u64, max_response_bytes: usize) -> HttpPolicy {
    HttpPolicy {
        allow_http,
        timeout_ms,
        max_response_bytes,
        ..HttpPolicy::default()
    }
}

/// Error for a section required by the requested operation.
fn missing_section(section: &str) -> ConfigError {
    ConfigError::Invalid(format!("[{section}] section is required"))
}

/// Default request timeout.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Default response size limit.
const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

/// Default cache lifetime.
const fn default_cache_ttl_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}
