//! Measurement categories and the attribute sources behind them.
//!
//! A fingerprint is built from up to nine categories. Seven of them expand to
//! a fixed list of [`MeasurementSource`]s that are resolved through an
//! [`AttributeSource`](crate::hardware::AttributeSource). The remaining two,
//! [`Category::Tpm`] and [`Category::HddSerial`], are special cased by the
//! digest engine and contribute no sources here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::FingerprintError;

/// A toggleable group of measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Motherboard model, manufacturer, name and serial number
    Baseboard,
    /// BIOS manufacturer, identification code and serial number
    Bios,
    /// CPU unique id, processor id, name and manufacturer
    Cpu,
    /// Serial number of the OS installation
    OsSerial,
    /// SMBIOS system UUID
    SystemUuid,
    /// Serial number of the drive holding the system volume
    HddSerial,
    /// PNP device identifier of the video controller
    Video,
    /// MAC addresses of network adapters with an IP address
    ActiveNics,
    /// TPM platform configuration register
    Tpm,
}

impl Category {
    /// Every category, in the order the report lists them.
    pub const REPORT_ORDER: [Category; 9] = [
        Category::Baseboard,
        Category::Bios,
        Category::Cpu,
        Category::Tpm,
        Category::ActiveNics,
        Category::Video,
        Category::OsSerial,
        Category::SystemUuid,
        Category::HddSerial,
    ];

    /// Default order in which attribute-backed categories are concatenated.
    pub const CANONICAL_ORDER: [Category; 7] = [
        Category::Baseboard,
        Category::Bios,
        Category::Cpu,
        Category::OsSerial,
        Category::SystemUuid,
        Category::Video,
        Category::ActiveNics,
    ];

    /// The fixed attribute list for this category, in concatenation order.
    pub fn sources(self) -> &'static [MeasurementSource] {
        match self {
            Category::Baseboard => BASEBOARD_SOURCES,
            Category::Bios => BIOS_SOURCES,
            Category::Cpu => CPU_SOURCES,
            Category::OsSerial => OS_SERIAL_SOURCES,
            Category::SystemUuid => SYSTEM_UUID_SOURCES,
            Category::Video => VIDEO_SOURCES,
            Category::ActiveNics => ACTIVE_NIC_SOURCES,
            Category::HddSerial | Category::Tpm => &[],
        }
    }

    /// Name used in configuration files and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Baseboard => "baseboard",
            Category::Bios => "bios",
            Category::Cpu => "cpu",
            Category::OsSerial => "os_serial",
            Category::SystemUuid => "system_uuid",
            Category::HddSerial => "hdd_serial",
            Category::Video => "video",
            Category::ActiveNics => "active_nics",
            Category::Tpm => "tpm",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::REPORT_ORDER
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| FingerprintError::InvalidCategory(s.to_string()))
    }
}

/// One queryable attribute: a CIM class, a property and an optional filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasurementSource {
    pub category: Category,
    pub class: &'static str,
    pub property: &'static str,
    pub filter: Option<&'static str>,
}

impl MeasurementSource {
    const fn new(category: Category, class: &'static str, property: &'static str) -> Self {
        Self {
            category,
            class,
            property,
            filter: None,
        }
    }

    /// WQL query text for this source, e.g. `SELECT UUID FROM Win32_ComputerSystemProduct`.
    pub fn query(&self) -> String {
        match self.filter {
            Some(filter) if !filter.trim().is_empty() => {
                format!("SELECT {} FROM {} {}", self.property, self.class, filter)
            }
            _ => format!("SELECT {} FROM {}", self.property, self.class),
        }
    }
}

const BASEBOARD_SOURCES: &[MeasurementSource] = &[
    MeasurementSource::new(Category::Baseboard, "Win32_BaseBoard", "Model"),
    MeasurementSource::new(Category::Baseboard, "Win32_BaseBoard", "Manufacturer"),
    MeasurementSource::new(Category::Baseboard, "Win32_BaseBoard", "Name"),
    MeasurementSource::new(Category::Baseboard, "Win32_BaseBoard", "SerialNumber"),
];

const BIOS_SOURCES: &[MeasurementSource] = &[
    MeasurementSource::new(Category::Bios, "Win32_BIOS", "Manufacturer"),
    MeasurementSource::new(Category::Bios, "Win32_BIOS", "IdentificationCode"),
    MeasurementSource::new(Category::Bios, "Win32_BIOS", "SerialNumber"),
];

const CPU_SOURCES: &[MeasurementSource] = &[
    MeasurementSource::new(Category::Cpu, "Win32_Processor", "UniqueId"),
    MeasurementSource::new(Category::Cpu, "Win32_Processor", "ProcessorId"),
    MeasurementSource::new(Category::Cpu, "Win32_Processor", "Name"),
    MeasurementSource::new(Category::Cpu, "Win32_Processor", "Manufacturer"),
];

const OS_SERIAL_SOURCES: &[MeasurementSource] = &[MeasurementSource::new(
    Category::OsSerial,
    "Win32_OperatingSystem",
    "SerialNumber",
)];

const SYSTEM_UUID_SOURCES: &[MeasurementSource] = &[MeasurementSource::new(
    Category::SystemUuid,
    "Win32_ComputerSystemProduct",
    "UUID",
)];

const VIDEO_SOURCES: &[MeasurementSource] = &[MeasurementSource::new(
    Category::Video,
    "Win32_VideoController",
    "PNPDeviceID",
)];

const ACTIVE_NIC_SOURCES: &[MeasurementSource] = &[MeasurementSource {
    category: Category::ActiveNics,
    class: "Win32_NetworkAdapterConfiguration",
    property: "MACAddress",
    filter: Some("WHERE IPEnabled = \"true\""),
}];

/// The nine independently toggleable measurement flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementFlags {
    pub baseboard: bool,
    pub bios: bool,
    pub cpu: bool,
    pub os_serial: bool,
    pub system_uuid: bool,
    pub hdd_serial: bool,
    pub video: bool,
    pub active_nics: bool,
    pub tpm: bool,
}

impl Default for MeasurementFlags {
    fn default() -> Self {
        Self::all()
    }
}

impl MeasurementFlags {
    /// Every measurement enabled.
    pub fn all() -> Self {
        Self {
            baseboard: true,
            bios: true,
            cpu: true,
            os_serial: true,
            system_uuid: true,
            hdd_serial: true,
            video: true,
            active_nics: true,
            tpm: true,
        }
    }

    /// Every measurement disabled.
    pub fn none() -> Self {
        Self {
            baseboard: false,
            bios: false,
            cpu: false,
            os_serial: false,
            system_uuid: false,
            hdd_serial: false,
            video: false,
            active_nics: false,
            tpm: false,
        }
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Baseboard => self.baseboard,
            Category::Bios => self.bios,
            Category::Cpu => self.cpu,
            Category::OsSerial => self.os_serial,
            Category::SystemUuid => self.system_uuid,
            Category::HddSerial => self.hdd_serial,
            Category::Video => self.video,
            Category::ActiveNics => self.active_nics,
            Category::Tpm => self.tpm,
        }
    }

    pub fn set(&mut self, category: Category, enabled: bool) {
        let slot = match category {
            Category::Baseboard => &mut self.baseboard,
            Category::Bios => &mut self.bios,
            Category::Cpu => &mut self.cpu,
            Category::OsSerial => &mut self.os_serial,
            Category::SystemUuid => &mut self.system_uuid,
            Category::HddSerial => &mut self.hdd_serial,
            Category::Video => &mut self.video,
            Category::ActiveNics => &mut self.active_nics,
            Category::Tpm => &mut self.tpm,
        };
        *slot = enabled;
    }
}

/// Expand the enabled categories of `order` into an ordered source list.
///
/// Categories are visited once each, in `order`; duplicates after the first
/// occurrence are ignored.
pub fn ordered_sources(flags: &MeasurementFlags, order: &[Category]) -> Vec<MeasurementSource> {
    let mut seen = Vec::with_capacity(order.len());
    let mut sources = Vec::new();
    for &category in order {
        if seen.contains(&category) {
            continue;
        }
        seen.push(category);
        if flags.is_enabled(category) {
            sources.extend_from_slice(category.sources());
        }
    }
    sources
}
