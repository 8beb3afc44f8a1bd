use std::time::Duration;

use crate::hardware::run_command;
use crate::measurement::MeasurementSource;

/// Map a CIM class/property pair onto `ioreg` / `sysctl` output.
pub fn query_attribute(source: &MeasurementSource, timeout: Duration) -> Vec<String> {
    let value = match (source.class, source.property) {
        ("Win32_BaseBoard", "SerialNumber") | ("Win32_BIOS", "SerialNumber") => {
            platform_property("IOPlatformSerialNumber", timeout)
        }
        ("Win32_BaseBoard", "Model") => platform_property("model", timeout),
        ("Win32_BaseBoard", "Manufacturer") => platform_property("manufacturer", timeout),
        ("Win32_ComputerSystemProduct", "UUID") => platform_property("IOPlatformUUID", timeout),
        ("Win32_Processor", "Name") => sysctl("machdep.cpu.brand_string", timeout),
        ("Win32_Processor", "Manufacturer") => sysctl("machdep.cpu.vendor", timeout),
        _ => None,
    };
    value.into_iter().collect()
}

/// Not resolved on macOS.
pub fn system_drive_serial(_timeout: Duration) -> Option<String> {
    None
}

/// Whether the effective user is root.
pub fn is_elevated(timeout: Duration) -> Option<bool> {
    let out = run_command("id", &["-u"], timeout)?;
    out.trim().parse::<u32>().ok().map(|uid| uid == 0)
}

fn sysctl(name: &str, timeout: Duration) -> Option<String> {
    let out = run_command("sysctl", &["-n", name], timeout)?;
    let value = out.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn platform_property(key: &str, timeout: Duration) -> Option<String> {
    let out = run_command("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"], timeout)?;
    ioreg_value(&out, key)
}

/// Extract `"key" = "value"` or `"key" = <"value">` from `ioreg` output.
fn ioreg_value(output: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let line = output.lines().find(|line| line.trim_start().starts_with(&needle))?;
    let value = line
        .split_once('=')?
        .1
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_matches('"')
        .to_string();
    (!value.is_empty()).then_some(value)
}
