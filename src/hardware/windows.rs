use std::time::Duration;

use base64::Engine;

use crate::hardware::{output_lines, run_command};
use crate::measurement::MeasurementSource;

/// Run a WQL query through `Get-CimInstance` and return every instance's property value.
pub fn query_attribute(source: &MeasurementSource, timeout: Duration) -> Vec<String> {
    let script = format!(
        "Get-CimInstance -Query '{}' -ErrorAction SilentlyContinue | ForEach-Object {{ $_.{} }}",
        source.query(),
        source.property
    );
    powershell(&script, timeout)
        .map(|out| output_lines(&out))
        .unwrap_or_default()
}

/// Win32_LogicalDisk (system drive) -> Win32_DiskPartition -> Win32_DiskDrive.
///
/// When several drives back the volume the last one reported wins.
pub fn system_drive_serial(timeout: Duration) -> Option<String> {
    let script = "$volume = Get-CimInstance -ClassName Win32_LogicalDisk \
                  -Filter \"DeviceID='$($env:SystemDrive)'\" -ErrorAction SilentlyContinue; \
                  $volume | Get-CimAssociatedInstance -ResultClassName Win32_DiskPartition \
                  | Get-CimAssociatedInstance -ResultClassName Win32_DiskDrive \
                  | ForEach-Object { $_.SerialNumber }";
    let out = powershell(script, timeout)?;
    output_lines(&out).pop()
}

/// Whether the current token belongs to the Administrators role.
pub fn is_elevated(timeout: Duration) -> Option<bool> {
    let script = "([Security.Principal.WindowsPrincipal]\
                  [Security.Principal.WindowsIdentity]::GetCurrent()).IsInRole(\
                  [Security.Principal.WindowsBuiltInRole]::Administrator)";
    match powershell(script, timeout)?.trim() {
        "True" => Some(true),
        "False" => Some(false),
        _ => None,
    }
}

/// Run `script` with `-EncodedCommand` so nothing in it is re-interpreted by a shell.
fn powershell(script: &str, timeout: Duration) -> Option<String> {
    let utf16: Vec<u8> = script.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(utf16);
    run_command(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-EncodedCommand", &encoded],
        timeout,
    )
}
