use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::hardware::{output_lines, run_command};
use crate::measurement::MeasurementSource;

const DMI_DIR: &str = "/sys/class/dmi/id";
const NET_DIR: &str = "/sys/class/net";
const DRM_DIR: &str = "/sys/class/drm";

/// Map a CIM class/property pair onto its sysfs or procfs equivalent.
pub fn query_attribute(source: &MeasurementSource, _timeout: Duration) -> Vec<String> {
    match (source.class, source.property) {
        ("Win32_BaseBoard", "Model") => dmi("board_version"),
        ("Win32_BaseBoard", "Manufacturer") => dmi("board_vendor"),
        ("Win32_BaseBoard", "Name") => dmi("board_name"),
        ("Win32_BaseBoard", "SerialNumber") => dmi("board_serial"),
        ("Win32_BIOS", "Manufacturer") => dmi("bios_vendor"),
        ("Win32_BIOS", "IdentificationCode") => dmi("bios_version"),
        ("Win32_BIOS", "SerialNumber") => dmi("product_serial"),
        ("Win32_Processor", "Name") => cpuinfo("model name"),
        ("Win32_Processor", "Manufacturer") => cpuinfo("vendor_id"),
        ("Win32_OperatingSystem", "SerialNumber") => machine_id(),
        ("Win32_ComputerSystemProduct", "UUID") => dmi("product_uuid"),
        ("Win32_VideoController", "PNPDeviceID") => video_devices(),
        ("Win32_NetworkAdapterConfiguration", "MACAddress") => active_macs(),
        // No stable Linux equivalent (e.g. Win32_Processor.UniqueId / ProcessorId).
        _ => Vec::new(),
    }
}

/// system volume -> partition -> physical drive, via `lsblk`.
pub fn system_drive_serial(timeout: Duration) -> Option<String> {
    let mounts = fs::read_to_string("/proc/self/mounts").ok()?;
    let volume = root_device(&mounts)?;

    let parent = run_command("lsblk", &["-no", "PKNAME", &volume], timeout)
        .and_then(|out| output_lines(&out).into_iter().map(|l| l.trim().to_string()).find(|l| !l.is_empty()));
    let drive = match parent {
        Some(name) => format!("/dev/{name}"),
        None => volume,
    };

    let serial = run_command("lsblk", &["-dno", "SERIAL", &drive], timeout)?;
    output_lines(&serial)
        .into_iter()
        .map(|l| l.trim().to_string())
        .rfind(|l| !l.is_empty())
}

/// Whether the effective user is root, from `/proc/self/status`.
pub fn is_elevated(_timeout: Duration) -> Option<bool> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    effective_uid(&status).map(|uid| uid == 0)
}

/// Second field of the `Uid:` line (real, effective, saved, filesystem).
fn effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

fn read_trimmed(path: impl AsRef<Path>) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn dmi(field: &str) -> Vec<String> {
    read_trimmed(Path::new(DMI_DIR).join(field)).into_iter().collect()
}

fn machine_id() -> Vec<String> {
    read_trimmed("/etc/machine-id")
        .or_else(|| read_trimmed("/var/lib/dbus/machine-id"))
        .into_iter()
        .collect()
}

fn cpuinfo(field: &str) -> Vec<String> {
    fs::read_to_string("/proc/cpuinfo")
        .map(|text| cpuinfo_values(&text, field))
        .unwrap_or_default()
}

/// One value per physical package; logical CPUs repeating the same value collapse.
fn cpuinfo_values(text: &str, field: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() != field {
            continue;
        }
        let value = value.trim().to_string();
        if !value.is_empty() && !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

fn sorted_entries(dir: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn video_devices() -> Vec<String> {
    sorted_entries(DRM_DIR)
        .into_iter()
        .filter(|name| is_drm_card(name))
        .filter_map(|card| {
            let device = Path::new(DRM_DIR).join(&card).join("device");
            let vendor = read_trimmed(device.join("vendor"))?;
            let product = read_trimmed(device.join("device"))?;
            pci_device_id(&vendor, &product)
        })
        .collect()
}

fn is_drm_card(name: &str) -> bool {
    name.strip_prefix("card")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

/// `0x10de` + `0x1c82` -> `PCI\VEN_10DE&DEV_1C82`
fn pci_device_id(vendor: &str, product: &str) -> Option<String> {
    let vendor = u16::from_str_radix(vendor.trim_start_matches("0x"), 16).ok()?;
    let product = u16::from_str_radix(product.trim_start_matches("0x"), 16).ok()?;
    Some(format!("PCI\\VEN_{vendor:04X}&DEV_{product:04X}"))
}

fn active_macs() -> Vec<String> {
    sorted_entries(NET_DIR)
        .into_iter()
        .filter(|iface| iface != "lo")
        .filter(|iface| {
            read_trimmed(Path::new(NET_DIR).join(iface).join("operstate")).as_deref() == Some("up")
        })
        .filter_map(|iface| read_trimmed(Path::new(NET_DIR).join(iface).join("address")))
        .filter(|mac| mac != "00:00:00:00:00:00")
        .map(|mac| mac.to_ascii_uppercase())
        .collect()
}

/// Device mounted at `/`, from `/proc/self/mounts` text.
fn root_device(mounts: &str) -> Option<String> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            (mount_point == "/" && device.starts_with("/dev/")).then(|| device.to_string())
        })
        .last()
}
