//! Machine fingerprint generation.
//!
//! A [`Fingerprint`] walks the enabled measurement sources in a fixed order,
//! collects every non-empty value as one line, appends the TPM PCR digest
//! and the system drive serial (when enabled and available), and hashes the
//! text with SHA-256. The result is a 64 character uppercase hex string.
//!
//! The digest is cached until a measurement flag changes.
//!
//! # Example
//!
//! ```rust,ignore
//! use fingerprint::config::get_config;
//! use fingerprint::fingerprint::Fingerprint;
//! use fingerprint::measurement::Category;
//!
//! let mut fp = Fingerprint::system(get_config()?)?;
//! fp.set_measure(Category::ActiveNics, false);
//! println!("{}", fp.generate()?);
//! ```
//!
//! # Threading
//!
//! Every mutation goes through `&mut self`, and the engine is `Send`. To share
//! one between threads, wrap it in an `Arc<Mutex<_>>` so that a flag change
//! and its cache invalidation happen as one unit, as does each TPM round-trip.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{get_config, FingerprintConfig, TpmConfig};
use crate::errors::FingerprintResult;
use crate::hardware::{AttributeSource, DiskSerialSource, SystemAttributes};
use crate::hex_format::bytes_to_hex;
use crate::measurement::{ordered_sources, Category, MeasurementFlags, MeasurementSource};
use crate::tpm::{validate_pcr_index, PcrReader, PcrSource, SystemChannel};

/// Terminator appended after every measured value.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Length of a rendered fingerprint.
pub const DIGEST_HEX_LEN: usize = 64;

/// Outcome of one digest computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    /// SHA-256 of the measured values, uppercase hex
    pub digest: String,
    /// Optional measurements that were enabled but produced no value
    pub unavailable: Vec<Category>,
}

#[derive(Debug, Default)]
struct CachedDigest {
    generation: Option<Generation>,
}

impl CachedDigest {
    fn is_stale(&self) -> bool {
        self.generation.is_none()
    }

    fn invalidate(&mut self) {
        self.generation = None;
    }
}

/// Configurable fingerprint engine.
pub struct Fingerprint {
    flags: MeasurementFlags,
    order: Vec<Category>,
    pcr_index: i32,
    attributes: Box<dyn AttributeSource + Send>,
    disks: Box<dyn DiskSerialSource + Send>,
    pcr: Box<dyn PcrSource + Send>,
    cache: CachedDigest,
}

impl Fingerprint {
    /// Create an engine over the given collaborators with every measurement enabled.
    pub fn new(
        attributes: impl AttributeSource + Send + 'static,
        disks: impl DiskSerialSource + Send + 'static,
        pcr: impl PcrSource + Send + 'static,
    ) -> Self {
        Self {
            flags: MeasurementFlags::all(),
            order: Category::CANONICAL_ORDER.to_vec(),
            pcr_index: 0,
            attributes: Box::new(attributes),
            disks: Box::new(disks),
            pcr: Box::new(pcr),
            cache: CachedDigest::default(),
        }
    }

    /// Create an engine that measures the running system as described by `config`.
    pub fn system(config: &FingerprintConfig) -> FingerprintResult<Self> {
        let attributes = SystemAttributes::new(config.hardware.query_timeout());
        let reader = PcrReader::new(system_channel(&config.tpm));

        Self::new(attributes, attributes, reader)
            .with_flags(config.measure)
            .with_pcr_index(config.tpm.pcr_index)
    }

    /// Replace all nine flags at once.
    pub fn with_flags(mut self, flags: MeasurementFlags) -> Self {
        self.flags = flags;
        self.cache.invalidate();
        self
    }

    /// Override the order in which attribute-backed categories are concatenated.
    ///
    /// Categories missing from `order` are never measured; repeated entries
    /// count once.
    pub fn with_order(mut self, order: &[Category]) -> Self {
        self.order = order.to_vec();
        self.cache.invalidate();
        self
    }

    /// Select which PCR the TPM measurement reads.
    pub fn with_pcr_index(mut self, index: i32) -> FingerprintResult<Self> {
        validate_pcr_index(index)?;
        self.pcr_index = index;
        self.cache.invalidate();
        Ok(self)
    }

    /// Enable or disable one measurement. Always invalidates the cached digest.
    pub fn set_measure(&mut self, category: Category, enabled: bool) {
        self.flags.set(category, enabled);
        self.cache.invalidate();
    }

    pub fn measures(&self, category: Category) -> bool {
        self.flags.is_enabled(category)
    }

    pub fn flags(&self) -> MeasurementFlags {
        self.flags
    }

    /// Release the TPM channel. The TPM measurement will be reported unavailable afterwards.
    pub fn close_tpm(&mut self) {
        self.pcr.close();
    }

    /// Whether the next generation has to recompute the digest.
    pub fn is_stale(&self) -> bool {
        self.cache.is_stale()
    }

    /// The attribute sources that will be queried, in concatenation order.
    pub fn sources(&self) -> Vec<MeasurementSource> {
        ordered_sources(&self.flags, &self.order)
    }

    /// Compute (or return the cached) fingerprint without touching the flags.
    ///
    /// TPM and drive-serial measurements that are enabled but yield no value
    /// are listed in [`Generation::unavailable`]; the caller decides whether
    /// to disable them.
    pub fn generate_report(&mut self) -> FingerprintResult<Generation> {
        if let Some(cached) = &self.cache.generation {
            debug!("returning cached fingerprint");
            return Ok(cached.clone());
        }

        let (text, unavailable) = self.measure()?;
        let generation = Generation {
            digest: digest_text(&text),
            unavailable,
        };
        info!(
            "fingerprint computed from {} measurement line(s)",
            text.matches(LINE_TERMINATOR).count()
        );

        self.cache.generation = Some(generation.clone());
        Ok(generation)
    }

    /// Compute (or return the cached) fingerprint.
    ///
    /// Any optional measurement that turns out to be unavailable is disabled
    /// for good. The cached digest stays valid since it already excludes it.
    pub fn generate(&mut self) -> FingerprintResult<String> {
        let generation = self.generate_report()?;
        for &category in &generation.unavailable {
            if self.flags.is_enabled(category) {
                warn!("{category} measurement unavailable, disabling it");
                self.flags.set(category, false);
            }
        }
        Ok(generation.digest)
    }

    /// Collect the measured text and the optional measurements that were missing.
    fn measure(&mut self) -> FingerprintResult<(String, Vec<Category>)> {
        let mut text = String::new();
        let mut unavailable = Vec::new();

        for source in ordered_sources(&self.flags, &self.order) {
            for value in self.attributes.query(&source) {
                push_line(&mut text, &value);
            }
        }

        if self.flags.tpm {
            match self.pcr.read_pcr(self.pcr_index)? {
                Some(digest) if !digest.is_empty() => push_line(&mut text, &digest),
                _ => unavailable.push(Category::Tpm),
            }
        }

        if self.flags.hdd_serial {
            match self.disks.system_drive_serial() {
                Some(serial) if !serial.is_empty() => push_line(&mut text, &serial),
                _ => unavailable.push(Category::HddSerial),
            }
        }

        Ok((text, unavailable))
    }
}

fn push_line(text: &mut String, value: &str) {
    if value.is_empty() {
        return;
    }
    text.push_str(value);
    text.push_str(LINE_TERMINATOR);
}

/// Encode as single-byte ASCII; anything outside ASCII becomes `?`.
fn ascii_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// SHA-256 of the ASCII-encoded text, rendered as uppercase hex.
pub fn digest_text(text: &str) -> String {
    let hash = Sha256::digest(ascii_bytes(text));
    bytes_to_hex(&hash)
}

#[cfg(target_os = "linux")]
fn system_channel(config: &TpmConfig) -> SystemChannel {
    crate::tpm::DevTpmChannel::new(&config.device_path)
}

#[cfg(not(target_os = "linux"))]
fn system_channel(_config: &TpmConfig) -> SystemChannel {
    SystemChannel::default()
}

/// Fingerprint of the running machine using the global configuration.
pub fn machine_fingerprint() -> FingerprintResult<String> {
    let config = get_config()?;
    Fingerprint::system(config)?.generate()
}
