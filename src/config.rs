//! Configuration for fingerprint generation.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file (or the file given to [`FingerprintConfig::load_file`])
//! 3. Default values (lowest priority)
//!
//! # Example `config.toml`
//!
//! ```toml
//! [measure]
//! tpm = false
//! active_nics = false
//!
//! [tpm]
//! pcr_index = 0
//!
//! [hardware]
//! query_timeout_ms = 3000
//!
//! [logging]
//! enabled = true
//! level = "debug"
//! ```
//!
//! # Environment Variables
//!
//! - `FINGERPRINT_MEASURE_BASEBOARD`, `FINGERPRINT_MEASURE_BIOS`,
//!   `FINGERPRINT_MEASURE_CPU`, `FINGERPRINT_MEASURE_OS_SERIAL`,
//!   `FINGERPRINT_MEASURE_SYSTEM_UUID`, `FINGERPRINT_MEASURE_HDD_SERIAL`,
//!   `FINGERPRINT_MEASURE_VIDEO`, `FINGERPRINT_MEASURE_ACTIVE_NICS`,
//!   `FINGERPRINT_MEASURE_TPM` - Enable/disable a measurement (`true`/`false`)
//! - `FINGERPRINT_TPM_PCR_INDEX` - PCR read for the TPM measurement
//! - `FINGERPRINT_TPM_DEVICE_PATH` - TPM character device (Linux)
//! - `FINGERPRINT_QUERY_TIMEOUT_MS` - Bound for each hardware query
//! - `FINGERPRINT_LOG_ENABLED` - Enable logging
//! - `FINGERPRINT_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, File, FileFormat};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::{FingerprintError, FingerprintResult};
use crate::measurement::{Category, MeasurementFlags};
use crate::tpm::MAX_PCR_INDEX;

/// Global configuration singleton.
static CONFIG: OnceLock<FingerprintConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Which measurements contribute to the fingerprint
    pub measure: MeasurementFlags,
    /// TPM configuration
    pub tpm: TpmConfig,
    /// Hardware query configuration
    pub hardware: HardwareConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TPM configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TpmConfig {
    /// PCR to read (0..=23)
    pub pcr_index: i32,
    /// TPM character device, Linux only
    pub device_path: String,
}

impl Default for TpmConfig {
    fn default() -> Self {
        Self {
            pcr_index: 0,
            device_path: "/dev/tpmrm0".to_string(),
        }
    }
}

/// Hardware query configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Upper bound for each external query, in milliseconds
    pub query_timeout_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            query_timeout_ms: 5000,
        }
    }
}

impl HardwareConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> FingerprintError {
    FingerprintError::ConfigError(e.to_string())
}

impl FingerprintConfig {
    /// Load configuration from `config.toml` (optional) and environment.
    pub fn load() -> FingerprintResult<Self> {
        let builder = Self::defaults()?.add_source(File::with_name("config").required(false));
        Self::finish(builder)
    }

    /// Load configuration from a specific file (required) and environment.
    pub fn load_file(path: &Path) -> FingerprintResult<Self> {
        let builder = Self::defaults()?.add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    /// Parse configuration from TOML text. Environment variables are not consulted.
    pub fn from_toml_str(toml: &str) -> FingerprintResult<Self> {
        let settings = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| FingerprintError::ConfigError(format!("failed to build config: {e}")))?;
        let config: Self = settings
            .try_deserialize()
            .map_err(|e| FingerprintError::ConfigError(format!("failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> FingerprintResult<ConfigBuilder<DefaultState>> {
        let mut builder = Config::builder();
        for category in Category::REPORT_ORDER {
            builder = builder
                .set_default(format!("measure.{}", category.as_str()), true)
                .map_err(config_err)?;
        }

        builder
            .set_default("tpm.pcr_index", 0)
            .map_err(config_err)?
            .set_default("tpm.device_path", "/dev/tpmrm0")
            .map_err(config_err)?
            .set_default("hardware.query_timeout_ms", 5000)
            .map_err(config_err)?
            .set_default("logging.enabled", false)
            .map_err(config_err)?
            .set_default("logging.level", "info")
            .map_err(config_err)
    }

    /// Apply environment overrides, build, deserialize and validate.
    fn finish(builder: ConfigBuilder<DefaultState>) -> FingerprintResult<Self> {
        let mut builder = builder;
        for category in Category::REPORT_ORDER {
            let var = format!("FINGERPRINT_MEASURE_{}", category.as_str().to_ascii_uppercase());
            builder = builder
                .set_override_option(
                    format!("measure.{}", category.as_str()),
                    env::var(&var).ok().and_then(|v| parse_bool(&v)),
                )
                .map_err(config_err)?;
        }

        let builder = builder
            .set_override_option(
                "tpm.pcr_index",
                env::var("FINGERPRINT_TPM_PCR_INDEX")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("tpm.device_path", env::var("FINGERPRINT_TPM_DEVICE_PATH").ok())
            .map_err(config_err)?
            .set_override_option(
                "hardware.query_timeout_ms",
                env::var("FINGERPRINT_QUERY_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env::var("FINGERPRINT_LOG_ENABLED").ok().and_then(|v| parse_bool(&v)),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("FINGERPRINT_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| FingerprintError::ConfigError(format!("failed to build config: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| FingerprintError::ConfigError(format!("failed to deserialize config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> FingerprintResult<()> {
        if !(0..=MAX_PCR_INDEX).contains(&self.tpm.pcr_index) {
            return Err(FingerprintError::ConfigError(format!(
                "tpm.pcr_index must be between 0 and {MAX_PCR_INDEX}, got {}",
                self.tpm.pcr_index
            )));
        }

        if self.tpm.device_path.trim().is_empty() {
            return Err(FingerprintError::ConfigError(
                "tpm.device_path cannot be empty".to_string(),
            ));
        }

        if self.hardware.query_timeout_ms == 0 {
            return Err(FingerprintError::ConfigError(
                "hardware.query_timeout_ms must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(FingerprintError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> FingerprintResult<&'static FingerprintConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = FingerprintConfig::load()?;
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> FingerprintResult<&'static FingerprintConfig> {
    get_config()
}
