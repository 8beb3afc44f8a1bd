//! TPM platform configuration register (PCR) reads.
//!
//! The reader speaks the TPM 1.2 `TPM_ORD_PCRRead` command over a raw
//! [`DeviceChannel`]:
//!
//! ```text
//! command  (14 bytes): tag u16 | paramSize u32 | ordinal u32 | pcrIndex u32
//! response (30 bytes): tag u16 | paramSize u32 | returnCode u32 | digest [u8; 20]
//! ```
//!
//! All fields are big-endian. A [`PcrReader`] opens its channel lazily on the
//! first read. If opening or submitting fails, the reader closes for good and
//! every later read yields `None`.

use tracing::{debug, warn};

use crate::errors::{FingerprintError, FingerprintResult};
use crate::hex_format::bytes_to_hex;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::DevTpmChannel;
#[cfg(windows)]
pub use windows::TbsChannel;

/// `TPM_TAG_RQU_COMMAND`
pub const TPM_TAG_RQU_COMMAND: u16 = 0x00c1;
/// `TPM_ORD_PCRRead`
pub const TPM_ORD_PCR_READ: u32 = 0x0000_0015;
/// Highest PCR index accepted by [`PcrReader::read_pcr`].
pub const MAX_PCR_INDEX: i32 = 23;
/// Size of a PCR digest (SHA-1).
pub const PCR_DIGEST_SIZE: usize = 20;
/// Size of a `TPM_ORD_PCRRead` command.
pub const PCR_READ_COMMAND_SIZE: usize = 14;
/// Size of the response buffer requested from the device.
pub const PCR_READ_RESPONSE_SIZE: usize = 30;

const RETURN_CODE_OFFSET: usize = 6;
const DIGEST_OFFSET: usize = 10;

/// Check that `index` names one of the 24 PCRs.
pub fn validate_pcr_index(index: i32) -> FingerprintResult<u32> {
    if !(0..=MAX_PCR_INDEX).contains(&index) {
        return Err(FingerprintError::InvalidPcrIndex(index));
    }
    Ok(index as u32)
}

/// A `TPM_ORD_PCRRead` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmCommand {
    pub tag: u16,
    pub param_size: u32,
    pub ordinal: u32,
    pub pcr_index: u32,
}

impl TpmCommand {
    pub fn pcr_read(pcr_index: u32) -> Self {
        Self {
            tag: TPM_TAG_RQU_COMMAND,
            param_size: PCR_READ_COMMAND_SIZE as u32,
            ordinal: TPM_ORD_PCR_READ,
            pcr_index,
        }
    }

    /// Serialize to the big-endian wire layout.
    pub fn to_bytes(&self) -> [u8; PCR_READ_COMMAND_SIZE] {
        let mut buf = [0u8; PCR_READ_COMMAND_SIZE];
        buf[0..2].copy_from_slice(&self.tag.to_be_bytes());
        buf[2..6].copy_from_slice(&self.param_size.to_be_bytes());
        buf[6..10].copy_from_slice(&self.ordinal.to_be_bytes());
        buf[10..14].copy_from_slice(&self.pcr_index.to_be_bytes());
        buf
    }
}

/// A decoded `TPM_ORD_PCRRead` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmResponse {
    pub tag: u16,
    pub param_size: u32,
    pub return_code: u32,
    pub digest: [u8; PCR_DIGEST_SIZE],
}

impl TpmResponse {
    /// Decode the fixed-offset fields. Returns `None` if the buffer is too short.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < PCR_READ_RESPONSE_SIZE {
            return None;
        }

        let tag = u16::from_be_bytes([buf[0], buf[1]]);
        let param_size = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let return_code = u32::from_be_bytes([
            buf[RETURN_CODE_OFFSET],
            buf[RETURN_CODE_OFFSET + 1],
            buf[RETURN_CODE_OFFSET + 2],
            buf[RETURN_CODE_OFFSET + 3],
        ]);

        let mut digest = [0u8; PCR_DIGEST_SIZE];
        digest.copy_from_slice(&buf[DIGEST_OFFSET..DIGEST_OFFSET + PCR_DIGEST_SIZE]);

        Some(Self {
            tag,
            param_size,
            return_code,
            digest,
        })
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }

    /// The digest as 40 uppercase hex characters.
    pub fn digest_hex(&self) -> String {
        bytes_to_hex(&self.digest)
    }
}

/// Raw access to a platform security device.
///
/// Implementations block; a hung device blocks the caller.
pub trait DeviceChannel {
    type Handle;

    fn open(&mut self) -> std::io::Result<Self::Handle>;

    /// Submit `command` and return at most `response_size` bytes of response.
    fn submit(
        &mut self,
        handle: &mut Self::Handle,
        command: &[u8],
        response_size: usize,
    ) -> std::io::Result<Vec<u8>>;

    fn close(&mut self, handle: Self::Handle);
}

/// Anything that can produce a PCR digest.
///
/// This is the seam the digest engine depends on; [`PcrReader`] is the
/// production implementation.
pub trait PcrSource {
    /// Read PCR `index` as 40 uppercase hex characters.
    ///
    /// Fails only for an index outside 0..=23. Device problems yield `Ok(None)`.
    fn read_pcr(&mut self, index: i32) -> FingerprintResult<Option<String>>;

    /// Release any device resources. Later reads yield `Ok(None)`.
    fn close(&mut self) {}
}

/// Lifecycle of the channel handle.
#[derive(Debug)]
enum ChannelState<H> {
    Uninitialized,
    Open(H),
    Closed,
}

/// Lazily opened PCR reader that owns its device handle.
///
/// `Uninitialized -> Open -> Closed`; `Closed` is terminal. The handle is
/// released exactly once, either on failure, on [`PcrReader::close`], or on drop.
pub struct PcrReader<C: DeviceChannel> {
    channel: C,
    state: ChannelState<C::Handle>,
}

impl<C: DeviceChannel> PcrReader<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            state: ChannelState::Uninitialized,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ChannelState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ChannelState::Closed)
    }

    /// Release the device handle. Closing twice, or before opening, is a no-op.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.state, ChannelState::Closed) {
            ChannelState::Open(handle) => {
                debug!("closing TPM channel");
                self.channel.close(handle);
            }
            ChannelState::Uninitialized | ChannelState::Closed => {}
        }
    }

    fn ensure_open(&mut self) {
        if let ChannelState::Uninitialized = self.state {
            self.state = match self.channel.open() {
                Ok(handle) => {
                    debug!("TPM channel opened");
                    ChannelState::Open(handle)
                }
                Err(e) => {
                    warn!("TPM channel unavailable: {e}");
                    ChannelState::Closed
                }
            };
        }
    }

    fn submit(&mut self, command: &[u8], response_size: usize) -> Option<Vec<u8>> {
        self.ensure_open();

        let result = match &mut self.state {
            ChannelState::Open(handle) => self.channel.submit(handle, command, response_size),
            ChannelState::Uninitialized | ChannelState::Closed => return None,
        };

        match result {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("TPM command submission failed, closing channel: {e}");
                self.close();
                None
            }
        }
    }
}

impl<C: DeviceChannel> PcrSource for PcrReader<C> {
    fn read_pcr(&mut self, index: i32) -> FingerprintResult<Option<String>> {
        let pcr_index = validate_pcr_index(index)?;
        let command = TpmCommand::pcr_read(pcr_index).to_bytes();

        let Some(raw) = self.submit(&command, PCR_READ_RESPONSE_SIZE) else {
            return Ok(None);
        };

        match TpmResponse::parse(&raw) {
            Some(response) if response.is_success() => Ok(Some(response.digest_hex())),
            Some(response) => {
                debug!(
                    "PCR{} read returned TPM error 0x{:08X}",
                    pcr_index, response.return_code
                );
                Ok(None)
            }
            None => {
                debug!("PCR{} read returned a short response ({} bytes)", pcr_index, raw.len());
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        PcrReader::close(self);
    }
}

impl<C: DeviceChannel> Drop for PcrReader<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Channel for platforms without a supported TPM transport. Opening always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedChannel;

impl DeviceChannel for UnsupportedChannel {
    type Handle = ();

    fn open(&mut self) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no TPM transport on this platform",
        ))
    }

    fn submit(&mut self, _: &mut (), _: &[u8], _: usize) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no TPM transport on this platform",
        ))
    }

    fn close(&mut self, _: ()) {}
}

/// The native channel for the current platform.
#[cfg(target_os = "linux")]
pub type SystemChannel = DevTpmChannel;
#[cfg(windows)]
pub type SystemChannel = TbsChannel;
#[cfg(not(any(target_os = "linux", windows)))]
pub type SystemChannel = UnsupportedChannel;
