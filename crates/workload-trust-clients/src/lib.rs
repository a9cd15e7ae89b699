// crates/workload-trust-clients/src/lib.rs
// ============================================================================
// Module: Workload Trust Clients
// Description: HTTP and certificate implementations of core collaborator traits.
// Purpose: Connect key release to the attestation service and key broker.
// Dependencies: workload-trust-core, reqwest, rustls-webpki, xmltree, rsa
// ============================================================================

//! ## Overview
//! This crate ships the attestation service client, the key broker client
//! and the XML-DSig SAML verifier used by key release in production.
//! Invariants:
//! - Redirects are never followed and response bodies are size bounded.
//! - Non-success statuses fail closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod hvs;
pub mod kbs;
pub mod saml;
pub mod xmldsig;

mod c14n;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpPolicy;
pub use hvs::HvsClient;
pub use hvs::HvsClientConfig;
pub use hvs::SAML_CONTENT_TYPE;
pub use kbs::KbsClient;
pub use saml::SamlVerifyError;
pub use saml::XmlDsigSamlVerifier;
pub use xmldsig::EnvelopedSignature;
pub use xmldsig::SignatureError;
