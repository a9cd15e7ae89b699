// crates/workload-trust-cli/src/main.rs
// ============================================================================
// Module: Workload Trust CLI Entry Point
// Description: Command dispatcher for trust verification and key release.
// Purpose: Drive the core engine and key release gate from the command line.
// Dependencies: clap, workload-trust-core, workload-trust-clients, workload-trust-config
// ============================================================================

//! ## Overview
//! The `workload-trust` binary loads `workload-trust.toml`, then either
//! evaluates an instance manifest against a signed flavor or requests a key
//! release for a host. Results are written to stdout as JSON; errors go to
//! stderr with a failure exit code. Security posture: input files are
//! untrusted and read with size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use workload_trust_clients::HvsClient;
use workload_trust_clients::KbsClient;
use workload_trust_clients::XmlDsigSamlVerifier;
use workload_trust_config::WorkloadTrustConfig;
use workload_trust_core::InstanceManifest;
use workload_trust_core::KeyCache;
use workload_trust_core::KeyReleaseGate;
use workload_trust_core::SignedImageFlavor;
use workload_trust_core::TrustVerifier;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a manifest or flavor JSON input.
const MAX_INPUT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "workload-trust", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `WORKLOAD_TRUST_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate an instance manifest against a signed image flavor.
    Verify(VerifyCommand),
    /// Release a key to an attested host.
    TransferKey(TransferKeyCommand),
    /// Release the key of an encrypted flavor to an attested host.
    FlavorKey(FlavorKeyCommand),
    /// Load and validate the configuration file.
    CheckConfig,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Instance manifest JSON file.
    #[arg(long, value_name = "PATH")]
    manifest: PathBuf,
    /// Signed image flavor JSON file.
    #[arg(long, value_name = "PATH")]
    flavor: PathBuf,
}

/// Arguments for `transfer-key`.
#[derive(Args, Debug)]
struct TransferKeyCommand {
    /// Hardware UUID of the requesting host.
    #[arg(long, value_name = "UUID")]
    hardware_uuid: String,
    /// Key transfer URL.
    #[arg(long, value_name = "URL")]
    key_url: String,
}

/// Arguments for `flavor-key`.
#[derive(Args, Debug)]
struct FlavorKeyCommand {
    /// Signed image flavor JSON file.
    #[arg(long, value_name = "PATH")]
    flavor: PathBuf,
    /// Hardware UUID of the requesting host.
    #[arg(long, value_name = "UUID")]
    hardware_uuid: String,
}

/// Key release output.
#[derive(Debug, Serialize)]
struct ReleasedKey {
    /// Base64 encoded key bytes.
    key: String,
}

/// `check-config` output.
#[derive(Debug, Serialize)]
struct ConfigStatus {
    /// Always true when emitted.
    valid: bool,
    /// Whether key release sections are present.
    key_release_enabled: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors raised by bounded file reads.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// File I/O failure.
    #[error("{0}")]
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    #[error("size {size} exceeds limit {limit}")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = WorkloadTrustConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    match cli.command {
        Commands::Verify(command) => command_verify(&config, &command),
        Commands::TransferKey(command) => command_transfer_key(&config, &command),
        Commands::FlavorKey(command) => command_flavor_key(&config, &command),
        Commands::CheckConfig => command_check_config(&config),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `verify` command; exits non-zero when the instance is untrusted.
fn command_verify(config: &WorkloadTrustConfig, command: &VerifyCommand) -> CliResult<ExitCode> {
    let manifest: InstanceManifest = read_json(&command.manifest, "manifest")?;
    let flavor: SignedImageFlavor = read_json(&command.flavor, "flavor")?;
    let audit = config.audit.build_sink().map_err(|err| CliError::new(err.to_string()))?;
    let verification = &config.verification;
    let report = TrustVerifier::new(audit)
        .verify(
            &manifest,
            &flavor,
            verification.signing_certs_dir(),
            verification.trusted_cas_dir(),
            verification.skip_flavor_signature_verification,
        )
        .map_err(|err| CliError::new(format!("verification rejected input: {err}")))?;
    write_json(&report)?;
    Ok(if report.trusted { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Executes the `transfer-key` command.
fn command_transfer_key(
    config: &WorkloadTrustConfig,
    command: &TransferKeyCommand,
) -> CliResult<ExitCode> {
    let gate = build_gate(config)?;
    let key = gate
        .transfer_key(&command.hardware_uuid, &command.key_url)
        .map_err(|err| CliError::new(format!("key release failed: {err}")))?;
    write_json(&ReleasedKey {
        key: BASE64.encode(key),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `flavor-key` command.
fn command_flavor_key(
    config: &WorkloadTrustConfig,
    command: &FlavorKeyCommand,
) -> CliResult<ExitCode> {
    let flavor: SignedImageFlavor = read_json(&command.flavor, "flavor")?;
    let gate = build_gate(config)?;
    let key = gate
        .retrieve_flavor_key(&flavor.image_flavor, &command.hardware_uuid)
        .map_err(|err| CliError::new(format!("key release failed: {err}")))?;
    write_json(&ReleasedKey {
        key: BASE64.encode(key),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `check-config` command.
fn command_check_config(config: &WorkloadTrustConfig) -> CliResult<ExitCode> {
    write_json(&ConfigStatus {
        valid: true,
        key_release_enabled: config.attestation.is_some() && config.key_release.is_some(),
    })?;
    Ok(ExitCode::SUCCESS)
}

/// Builds a key release gate from the `[attestation]` and `[key_release]` sections.
fn build_gate(config: &WorkloadTrustConfig) -> CliResult<KeyReleaseGate> {
    let release_config =
        config.key_release_config().map_err(|err| CliError::new(err.to_string()))?;
    let broker_policy = config
        .key_release
        .as_ref()
        .map(workload_trust_config::KeyReleaseSettings::http_policy)
        .unwrap_or_default();
    let hvs_config =
        config.attestation_client_config().map_err(|err| CliError::new(err.to_string()))?;
    let attestation = HvsClient::new(hvs_config)
        .map_err(|err| CliError::new(format!("attestation client setup failed: {err}")))?;
    let audit = config.audit.build_sink().map_err(|err| CliError::new(err.to_string()))?;
    Ok(KeyReleaseGate::new(
        release_config,
        Arc::new(attestation),
        Arc::new(XmlDsigSamlVerifier),
        Arc::new(KbsClient::new(broker_policy)),
        Arc::new(KeyCache::new()),
    )
    .with_audit(audit))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads and deserializes a bounded JSON input file.
fn read_json<T: DeserializeOwned>(path: &Path, kind: &str) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {kind} {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| {
        CliError::new(format!("failed to parse {kind} {}: {err}", path.display()))
    })
}

/// Reads a file, refusing inputs larger than `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a value to stdout as one JSON line.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_json::to_vec(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    bytes.push(b'\n');
    std::io::stdout()
        .write_all(&bytes)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
