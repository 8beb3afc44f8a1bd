//! Fingerprint - stable machine identity hashes for licensing and device binding
//!
//! A fingerprint is the SHA-256 of a configurable set of hardware, firmware
//! and OS identifiers, optionally extended with the TPM's PCR[0] and the
//! serial number of the system drive. The same machine with the same
//! configuration always yields the same 64 character hex string.
//!
//! # Modules
//!
//! - [`fingerprint`] - the digest engine
//! - [`measurement`] - measurement categories and their attribute sources
//! - [`hardware`] - attribute lookups against the running system
//! - [`tpm`] - TPM PCR reads over a raw device channel
//! - [`hex_format`] - hex validation, encoding and decoding
//! - [`config`] / [`logging`] - configuration and tracing setup
//!
//! # Example
//!
//! ```rust,ignore
//! let id = fingerprint::machine_fingerprint()?;
//! assert_eq!(id.len(), 64);
//! ```

pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod hardware;
pub mod hex_format;
pub mod logging;
pub mod measurement;
pub mod tpm;

pub use errors::{FingerprintError, FingerprintResult};
pub use fingerprint::{machine_fingerprint, Fingerprint, Generation};
pub use measurement::{Category, MeasurementFlags};
