//! Error types for fingerprint generation.
//!
//! Only a handful of conditions are ever surfaced to callers. Missing
//! attributes and unavailable devices are not errors: they downgrade the
//! measurement set instead (see [`crate::fingerprint::Generation`]).

use thiserror::Error;

/// Errors that can occur while configuring or generating a fingerprint.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// PCR index outside of the 0..=23 range supported by the TPM.
    #[error("invalid TPM PCR index {0}: expected 0..=23")]
    InvalidPcrIndex(i32),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Unknown measurement category name.
    #[error("unknown measurement category '{0}'")]
    InvalidCategory(String),

    /// Report could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FingerprintResult<T> = Result<T, FingerprintError>;
