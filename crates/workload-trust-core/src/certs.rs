// crates/workload-trust-core/src/certs.rs
// ============================================================================
// Module: Certificate Directories
// Description: PEM certificate loading from configured directories and files.
// Purpose: Provide signer candidates and trust anchors for verification.
// Dependencies: rustls-pki-types, thiserror
// ============================================================================

//! ## Overview
//! Certificate directories are read on every call so certificate rotation
//! takes effect on the next verification. Only `*.pem` regular files are
//! considered and they are visited in file-name order.
//! Invariants:
//! - A PEM file yields at least one certificate or an error.
//! - The first certificate in a file is the leaf; the rest are intermediates.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use rustls_pki_types::CertificateDer;
use rustls_pki_types::pem::PemObject;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted size of a single PEM file, in bytes.
pub const MAX_PEM_FILE_BYTES: u64 = 1024 * 1024;

/// File extension of certificate files.
const PEM_EXTENSION: &str = "pem";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading certificates.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// Directory or file could not be read.
    #[error("certificate io error for {path}: {message}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        message: String,
    },
    /// PEM content could not be decoded.
    #[error("invalid pem in {path}: {message}")]
    InvalidPem {
        /// Path that failed.
        path: String,
        /// Underlying error.
        message: String,
    },
    /// PEM file contained no certificates.
    #[error("no certificates found in {0}")]
    Empty(String),
    /// PEM file exceeds the size limit.
    #[error("certificate file {0} exceeds size limit")]
    TooLarge(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Lists the `*.pem` regular files of a directory in file-name order.
///
/// # Errors
///
/// Returns [`CertificateError::Io`] when the directory cannot be read.
pub fn list_pem_files(dir: &Path) -> Result<Vec<PathBuf>, CertificateError> {
    let entries = fs::read_dir(dir).map_err(|err| io_error(dir, &err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| io_error(dir, &err))?;
        let path = entry.path();
        let is_pem = path.extension().is_some_and(|ext| ext == PEM_EXTENSION);
        let is_file = entry.file_type().map_err(|err| io_error(&path, &err))?.is_file();
        if is_pem && is_file {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every certificate from one PEM file, leaf first.
///
/// # Errors
///
/// Returns [`CertificateError`] when the file cannot be read, is not valid
/// PEM, or holds no certificates.
pub fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let size = fs::metadata(path).map_err(|err| io_error(path, &err))?.len();
    if size > MAX_PEM_FILE_BYTES {
        return Err(CertificateError::TooLarge(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(|err| io_error(path, &err))?;
    let certificates = CertificateDer::pem_slice_iter(&bytes)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CertificateError::InvalidPem {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
    if certificates.is_empty() {
        return Err(CertificateError::Empty(path.display().to_string()));
    }
    Ok(certificates)
}

/// Loads every certificate found in a directory of trusted CAs.
///
/// # Errors
///
/// Returns [`CertificateError`] when the directory or any PEM file in it
/// cannot be loaded.
pub fn load_root_cas(dir: &Path) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let mut roots = Vec::new();
    for path in list_pem_files(dir)? {
        roots.extend(read_certificates(&path)?);
    }
    Ok(roots)
}

/// Builds an I/O error for a path.
fn io_error(path: &Path, err: &std::io::Error) -> CertificateError {
    CertificateError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
