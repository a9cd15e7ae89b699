// crates/workload-trust-clients/src/hvs.rs
// ============================================================================
// Module: Host Verification Service Client
// Description: Fetches host attestation reports as SAML assertions.
// Purpose: Provide the production attestation service for key release.
// Dependencies: workload-trust-core, reqwest, url
// ============================================================================

//! ## Overview
//! The client asks the host verification service for the latest report of a
//! host, identified by hardware UUID, in SAML form. Any non-success status,
//! oversize body or empty body is an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use rustls_pki_types::CertificateDer;
use url::Url;
use workload_trust_core::AttestationError;
use workload_trust_core::AttestationService;

use crate::http::HttpPolicy;
use crate::http::build_client;
use crate::http::read_response_limited;
use crate::http::validate_url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Media type of SAML reports.
pub const SAML_CONTENT_TYPE: &str = "application/samlassertion+xml";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Host verification service client settings.
#[derive(Debug, Clone)]
pub struct HvsClientConfig {
    /// Service base URL; `reports` is resolved against it.
    pub base_url: Url,
    /// Bearer token sent with every request, when set.
    pub bearer_token: Option<String>,
    /// Extra CAs trusted for the service endpoint.
    pub root_cas: Vec<CertificateDer<'static>>,
    /// Transport limits.
    pub policy: HttpPolicy,
}

impl HvsClientConfig {
    /// Creates settings for a base URL with default transport limits.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            bearer_token: None,
            root_cas: Vec::new(),
            policy: HttpPolicy::default(),
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Attestation service backed by the host verification service REST API.
pub struct HvsClient {
    /// Client settings.
    config: HvsClientConfig,
    /// HTTP client used for outbound requests.
    client: Client,
}

impl HvsClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Transport`] when the base URL is refused
    /// or the HTTP client cannot be built.
    pub fn new(config: HvsClientConfig) -> Result<Self, AttestationError> {
        validate_url(&config.base_url, &config.policy).map_err(AttestationError::Transport)?;
        let client =
            build_client(&config.policy, &config.root_cas).map_err(AttestationError::Transport)?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Builds the report query URL for a host.
    fn report_url(&self, hardware_uuid: &str) -> Result<Url, AttestationError> {
        let mut url = self
            .config
            .base_url
            .join("reports")
            .map_err(|err| AttestationError::Transport(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("latestPerHost", "true")
            .append_pair("hostHardwareId", hardware_uuid);
        Ok(url)
    }
}

impl AttestationService for HvsClient {
    fn fetch_saml_report(&self, hardware_uuid: &str) -> Result<Vec<u8>, AttestationError> {
        let url = self.report_url(hardware_uuid)?;
        let mut request = self.client.get(url.as_str()).header(ACCEPT, SAML_CONTENT_TYPE);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        let mut response =
            request.send().map_err(|err| AttestationError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttestationError::Status(status.as_u16()));
        }
        let body = read_response_limited(&mut response, self.config.policy.max_response_bytes)
            .map_err(AttestationError::InvalidResponse)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AttestationError::InvalidResponse("empty report".to_string()));
        }
        Ok(body)
    }
}
