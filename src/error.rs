/*============================================================
  Synavera Project: Syn-Tools
  Module: syntools_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Syn-Tools-Core error types so manifest, entry
    and ambient failures share diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts carry tool names, URLs, sizes and digests
    only; no credentials are ever part of a manifest.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate recoverable failures and
    consolidate exit codes for the binary entry point.

  Revision History:
    2025-11-12 COD  Established installer error taxonomy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Syn-Tools-Core operations.
pub type Result<T> = std::result::Result<T, SyntoolsError>;

/// Enumerates high-level error domains surfaced by Syn-Tools-Core.
#[derive(Debug, Error)]
pub enum SyntoolsError {
    #[error("Manifest not found at {}", path.display())]
    ManifestNotFound { path: PathBuf },
    #[error("Unsupported manifest schema `{found}` (expected `{expected}`)")]
    UnsupportedSchema { found: String, expected: String },
    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),
    #[error("Tool `{tool}` has no variant for platform `{platform}`")]
    UnsupportedPlatform { tool: String, platform: String },
    #[error("Tool `{tool}` declares unsupported attribute `{attribute}`")]
    UnsupportedAttribute { tool: String, attribute: String },
    #[error("Download of {url} failed after {attempts} attempt(s): {last_error}")]
    TransportFailure {
        url: String,
        attempts: usize,
        last_error: String,
    },
    #[error("Integrity check failed for `{tool}` ({url}): {detail}")]
    IntegrityCheckFailed {
        tool: String,
        url: String,
        detail: String,
    },
    #[error("Extraction failed: {0}")]
    ExtractionFailure(String),
    #[error("Required command `{command}` not found in PATH")]
    CommandMissing { command: String },
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    CommandFailure {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Another installer holds the lock at {}", path.display())]
    Locked { path: PathBuf },
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyntoolsError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SyntoolsError::ManifestNotFound { .. } => ExitCode::from(3),
            SyntoolsError::UnsupportedSchema { .. } => ExitCode::from(4),
            SyntoolsError::ManifestInvalid(_) => ExitCode::from(5),
            SyntoolsError::UnsupportedPlatform { .. } => ExitCode::from(6),
            SyntoolsError::UnsupportedAttribute { .. } => ExitCode::from(7),
            SyntoolsError::CommandMissing { .. } => ExitCode::from(10),
            SyntoolsError::CommandFailure { .. } => ExitCode::from(11),
            SyntoolsError::ExtractionFailure(_) => ExitCode::from(12),
            SyntoolsError::Config(_) => ExitCode::from(20),
            SyntoolsError::Locked { .. } => ExitCode::from(21),
            SyntoolsError::Network(_) => ExitCode::from(30),
            SyntoolsError::TransportFailure { .. } => ExitCode::from(32),
            SyntoolsError::IntegrityCheckFailed { .. } => ExitCode::from(33),
            SyntoolsError::Serialization(_) => ExitCode::from(31),
            SyntoolsError::Filesystem(_) => ExitCode::from(40),
            SyntoolsError::Io(_) => ExitCode::from(41),
        }
    }

    /// Short taxonomy label used in per-entry log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SyntoolsError::ManifestNotFound { .. } => "ManifestNotFound",
            SyntoolsError::UnsupportedSchema { .. } => "UnsupportedSchema",
            SyntoolsError::ManifestInvalid(_) => "ManifestInvalid",
            SyntoolsError::UnsupportedPlatform { .. } => "UnsupportedPlatform",
            SyntoolsError::UnsupportedAttribute { .. } => "UnsupportedAttribute",
            SyntoolsError::TransportFailure { .. } => "TransportFailure",
            SyntoolsError::IntegrityCheckFailed { .. } => "IntegrityCheckFailed",
            SyntoolsError::ExtractionFailure(_)
            | SyntoolsError::CommandMissing { .. }
            | SyntoolsError::CommandFailure { .. } => "ExtractionFailure",
            SyntoolsError::Locked { .. } => "Locked",
            SyntoolsError::Config(_) => "Config",
            SyntoolsError::Network(_) => "Network",
            SyntoolsError::Serialization(_) => "Serialization",
            SyntoolsError::Filesystem(_) | SyntoolsError::Io(_) => "Filesystem",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_collaborator_errors_share_taxonomy_label() {
        let missing = SyntoolsError::CommandMissing {
            command: "tar".into(),
        };
        let failed = SyntoolsError::CommandFailure {
            command: "tar -xf a".into(),
            status: 2,
            stderr: "boom".into(),
        };
        assert_eq!(missing.kind(), "ExtractionFailure");
        assert_eq!(failed.kind(), "ExtractionFailure");
    }

    #[test]
    fn transport_failure_message_names_url_and_attempts() {
        let err = SyntoolsError::TransportFailure {
            url: "https://example.invalid/gcc.tar.gz".into(),
            attempts: 3,
            last_error: "connection reset".into(),
        };
        let message = err.to_string();
        assert!(message.contains("https://example.invalid/gcc.tar.gz"));
        assert!(message.contains("3 attempt(s)"));
    }
}
