// crates/workload-trust-clients/src/http.rs
// ============================================================================
// Module: HTTP Client Helpers
// Description: Shared reqwest client construction and bounded body reads.
// Purpose: Apply one transport policy to attestation and broker clients.
// Dependencies: reqwest, rustls-pki-types
// ============================================================================

//! ## Overview
//! Clients never follow redirects, always carry a timeout, and read at most
//! `max_response_bytes` of any body. Cleartext URLs are refused unless the
//! caller opts in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::Certificate;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use rustls_pki_types::CertificateDer;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Transport limits shared by the HTTP clients.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` URLs.
/// - `max_response_bytes` is a hard upper bound on response bodies.
/// - `timeout_ms` applies to the full request lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPolicy {
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            allow_http: false,
            timeout_ms: 10_000,
            max_response_bytes: 1024 * 1024,
            user_agent: "workload-trust/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a blocking client trusting the built-in roots plus `root_cas`.
pub(crate) fn build_client(
    policy: &HttpPolicy,
    root_cas: &[CertificateDer<'static>],
) -> Result<Client, String> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(policy.timeout_ms))
        .user_agent(policy.user_agent.clone())
        .redirect(Policy::none());
    for der in root_cas {
        let cert = Certificate::from_der(der.as_ref())
            .map_err(|err| format!("invalid root certificate: {err}"))?;
        builder = builder.add_root_certificate(cert);
    }
    builder.build().map_err(|err| format!("http client build failed: {err}"))
}

/// Rejects URLs with unsupported schemes or embedded credentials.
pub(crate) fn validate_url(url: &Url, policy: &HttpPolicy) -> Result<(), String> {
    match url.scheme() {
        "https" => {}
        "http" if policy.allow_http => {}
        other => return Err(format!("unsupported url scheme: {other}")),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err("url credentials are not allowed".to_string());
    }
    Ok(())
}

/// Reads a response body while enforcing a maximum size.
pub(crate) fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, String> {
    let max_bytes_u64 =
        u64::try_from(max_bytes).map_err(|_| "response size limit exceeds u64".to_string())?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err("response exceeds size limit".to_string());
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| format!("failed to read response: {err}"))?;
    if buf.len() > max_bytes {
        return Err("response exceeds size limit".to_string());
    }
    Ok(buf)
}
