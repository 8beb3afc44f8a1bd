//! Hardware attribute lookups.
//!
//! The digest engine never talks to the operating system directly. It asks an
//! [`AttributeSource`] for the values behind each
//! [`MeasurementSource`](crate::measurement::MeasurementSource) and a
//! [`DiskSerialSource`] for the serial number of the system drive.
//! [`SystemAttributes`] implements both for the current platform:
//!
//! - Windows: CIM/WMI queries run through PowerShell
//! - Linux: sysfs, procfs and `lsblk`
//! - macOS: `ioreg` and `sysctl`
//!
//! Every external command is bounded by a timeout; a command that times out
//! is killed and treated as "no value".

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::measurement::MeasurementSource;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform;
#[cfg(target_os = "macos")]
use macos as platform;
#[cfg(target_os = "windows")]
use windows as platform;

/// Default bound for a single external query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Resolves one measurement source to its values.
///
/// A source may match several instances (one per CPU socket, one per active
/// network adapter); each is returned as a separate value. An empty vector
/// means the attribute is absent, which is never an error.
pub trait AttributeSource {
    fn query(&self, source: &MeasurementSource) -> Vec<String>;
}

/// Resolves the serial number of the physical drive backing the system volume.
pub trait DiskSerialSource {
    fn system_drive_serial(&self) -> Option<String>;
}

/// Attribute and disk lookups against the running system.
#[derive(Debug, Clone, Copy)]
pub struct SystemAttributes {
    timeout: Duration,
}

impl SystemAttributes {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Whether the process runs with the privileges needed to read every
    /// attribute (root, or an elevated Administrator on Windows).
    ///
    /// `None` when it cannot be determined. Some firmware values (for
    /// example the baseboard serial on Linux) are only readable when
    /// elevated, so an unprivileged run yields a different digest.
    pub fn is_elevated(&self) -> Option<bool> {
        is_elevated_platform(self.timeout)
    }
}

impl Default for SystemAttributes {
    fn default() -> Self {
        Self::new(DEFAULT_QUERY_TIMEOUT)
    }
}

impl AttributeSource for SystemAttributes {
    fn query(&self, source: &MeasurementSource) -> Vec<String> {
        let values = query_platform(source, self.timeout);
        debug!("{} -> {} value(s)", source.query(), values.len());
        trace!("{} -> {:?}", source.query(), values);
        values
    }
}

impl DiskSerialSource for SystemAttributes {
    fn system_drive_serial(&self) -> Option<String> {
        let serial = system_drive_serial_platform(self.timeout);
        debug!("system drive serial found: {}", serial.is_some());
        serial
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn query_platform(source: &MeasurementSource, timeout: Duration) -> Vec<String> {
    platform::query_attribute(source, timeout)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn query_platform(_source: &MeasurementSource, _timeout: Duration) -> Vec<String> {
    Vec::new()
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn system_drive_serial_platform(timeout: Duration) -> Option<String> {
    platform::system_drive_serial(timeout)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn system_drive_serial_platform(_timeout: Duration) -> Option<String> {
    None
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn is_elevated_platform(timeout: Duration) -> Option<bool> {
    platform::is_elevated(timeout)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn is_elevated_platform(_timeout: Duration) -> Option<bool> {
    None
}

/// Run `program` and return its stdout, or `None` on spawn failure,
/// non-zero exit, or timeout.
pub(crate) fn run_command(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!("failed to spawn {program}: {e}");
            return None;
        }
    };

    // Drain stdout on a separate thread so a chatty child cannot block on a full pipe.
    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) if Instant::now() >= deadline => {
                warn!("{program} did not finish within {timeout:?}, killing it");
                kill_and_reap(&mut child);
                break None;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                warn!("failed to wait for {program}, killing it: {e}");
                kill_and_reap(&mut child);
                break None;
            }
        }
    };

    // A grandchild may still hold the pipe open after a kill; leave the reader detached.
    let status = status?;
    if !status.success() {
        debug!("{program} exited with {status}");
        return None;
    }

    let output = reader.join().ok()?.ok()?;
    Some(String::from_utf8_lossy(&output).into_owned())
}

/// Terminate a child we gave up on and collect its exit status.
fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("failed to kill child {}: {e}", child.id());
    }
    let _ = child.wait();
}

/// Split command output into non-empty lines, stripping line terminators only.
pub(crate) fn output_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
