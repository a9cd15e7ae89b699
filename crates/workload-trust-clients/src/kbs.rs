// crates/workload-trust-clients/src/kbs.rs
// ============================================================================
// Module: Key Broker Service Client
// Description: Requests key transfers authorized by SAML assertions.
// Purpose: Provide the production key broker for key release.
// Dependencies: workload-trust-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! Each transfer POSTs the host's assertion to `keys/<id>/transfer` under
//! the endpoint base URL. The TLS connection trusts the endpoint's root CAs,
//! so a client is built per call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use reqwest::header::ACCEPT;
use reqwest::header::CONTENT_TYPE;
use workload_trust_core::BrokerEndpoint;
use workload_trust_core::BrokerError;
use workload_trust_core::KeyBroker;
use workload_trust_core::KeyTransfer;

use crate::http::HttpPolicy;
use crate::http::build_client;
use crate::http::read_response_limited;
use crate::http::validate_url;
use crate::hvs::SAML_CONTENT_TYPE;

// ============================================================================
// SECTION: Client
// ============================================================================

/// Key broker backed by the key broker service REST API.
#[derive(Debug, Clone, Default)]
pub struct KbsClient {
    /// Transport limits.
    policy: HttpPolicy,
}

impl KbsClient {
    /// Creates a client with the given transport limits.
    #[must_use]
    pub const fn new(policy: HttpPolicy) -> Self {
        Self {
            policy,
        }
    }
}

impl KeyBroker for KbsClient {
    fn transfer_key_with_saml(
        &self,
        endpoint: &BrokerEndpoint,
        key_id: &str,
        saml: &[u8],
    ) -> Result<KeyTransfer, BrokerError> {
        let url = endpoint
            .base_url
            .join(&format!("keys/{key_id}/transfer"))
            .map_err(|err| BrokerError::Transport(err.to_string()))?;
        validate_url(&url, &self.policy).map_err(BrokerError::Transport)?;
        let client = build_client(&self.policy, &endpoint.root_cas).map_err(BrokerError::Transport)?;

        let mut response = client
            .post(url.as_str())
            .header(CONTENT_TYPE, SAML_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(saml.to_vec())
            .send()
            .map_err(|err| BrokerError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrokerError::Status(status.as_u16()));
        }
        let body = read_response_limited(&mut response, self.policy.max_response_bytes)
            .map_err(BrokerError::InvalidResponse)?;
        serde_json::from_slice(&body).map_err(|err| BrokerError::InvalidResponse(err.to_string()))
    }
}
