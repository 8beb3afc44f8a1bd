use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use super::DeviceChannel;

/// Default device node (kernel resource manager).
pub const DEFAULT_TPM_DEVICE: &str = "/dev/tpmrm0";
/// Direct device node, tried when the preferred one cannot be opened.
pub const FALLBACK_TPM_DEVICE: &str = "/dev/tpm0";

/// TPM character device channel (`/dev/tpmrm0`, falling back to `/dev/tpm0`).
#[derive(Debug, Clone)]
pub struct DevTpmChannel {
    path: PathBuf,
}

impl DevTpmChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open_path(path: &PathBuf) -> io::Result<File> {
        OpenOptions::new().read(true).write(true).open(path)
    }
}

impl Default for DevTpmChannel {
    fn default() -> Self {
        Self::new(DEFAULT_TPM_DEVICE)
    }
}

impl DeviceChannel for DevTpmChannel {
    type Handle = File;

    fn open(&mut self) -> io::Result<File> {
        Self::open_path(&self.path).or_else(|e| {
            let fallback = PathBuf::from(FALLBACK_TPM_DEVICE);
            if self.path == fallback {
                return Err(e);
            }
            Self::open_path(&fallback)
        })
    }

    fn submit(&mut self, device: &mut File, command: &[u8], response_size: usize) -> io::Result<Vec<u8>> {
        device.write_all(command)?;

        let mut response = vec![0u8; response_size];
        let read = device.read(&mut response)?;
        response.truncate(read);
        Ok(response)
    }

    fn close(&mut self, device: File) {
        drop(device);
    }
}
