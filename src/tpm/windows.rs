use std::io;
use std::ptr;

use super::DeviceChannel;

// TPM Base Services (tbs.dll)
#[allow(non_camel_case_types, non_snake_case)]
mod tbs_ffi {
    use std::ffi::c_void;

    pub const TBS_SUCCESS: u32 = 0;
    pub const TBS_COMMAND_LOCALITY_ZERO: u32 = 0;
    pub const TBS_COMMAND_PRIORITY_NORMAL: u32 = 200;
    pub const TBS_CONTEXT_VERSION_ONE: u32 = 1;

    pub type TBS_HCONTEXT = *mut c_void;

    #[repr(C)]
    pub struct TBS_CONTEXT_PARAMS {
        pub version: u32,
    }

    #[link(name = "tbs")]
    extern "system" {
        pub fn Tbsi_Context_Create(
            pContextParams: *const TBS_CONTEXT_PARAMS,
            phContext: *mut TBS_HCONTEXT,
        ) -> u32;

        pub fn Tbsip_Context_Close(hContext: TBS_HCONTEXT) -> u32;

        pub fn Tbsip_Submit_Command(
            hContext: TBS_HCONTEXT,
            Locality: u32,
            Priority: u32,
            pabCommand: *const u8,
            cbCommand: u32,
            pabResult: *mut u8,
            pcbResult: *mut u32,
        ) -> u32;
    }
}

use tbs_ffi::*;

/// Open TBS context.
#[derive(Debug)]
pub struct TbsContext(TBS_HCONTEXT);

// SAFETY: a TBS context handle is an opaque token owned by the process, not
// bound to the creating thread. `TbsContext` is only used through `&mut`, so
// no two threads submit on it at once.
unsafe impl Send for TbsContext {}

/// Channel over Windows TPM Base Services.
#[derive(Debug, Default, Clone, Copy)]
pub struct TbsChannel;

fn tbs_error(call: &str, code: u32) -> io::Error {
    io::Error::other(format!("{call} failed: 0x{code:08X}"))
}

impl DeviceChannel for TbsChannel {
    type Handle = TbsContext;

    fn open(&mut self) -> io::Result<TbsContext> {
        let params = TBS_CONTEXT_PARAMS {
            version: TBS_CONTEXT_VERSION_ONE,
        };
        let mut context: TBS_HCONTEXT = ptr::null_mut();

        // SAFETY: `params` and `context` are valid for the duration of the call.
        let result = unsafe { Tbsi_Context_Create(&params, &mut context) };
        if result != TBS_SUCCESS {
            return Err(tbs_error("Tbsi_Context_Create", result));
        }
        Ok(TbsContext(context))
    }

    fn submit(
        &mut self,
        context: &mut TbsContext,
        command: &[u8],
        response_size: usize,
    ) -> io::Result<Vec<u8>> {
        let mut response = vec![0u8; response_size];
        let mut response_len = response_size as u32;

        // SAFETY: both buffers outlive the call and their lengths are passed alongside.
        let result = unsafe {
            Tbsip_Submit_Command(
                context.0,
                TBS_COMMAND_LOCALITY_ZERO,
                TBS_COMMAND_PRIORITY_NORMAL,
                command.as_ptr(),
                command.len() as u32,
                response.as_mut_ptr(),
                &mut response_len,
            )
        };
        if result != TBS_SUCCESS {
            return Err(tbs_error("Tbsip_Submit_Command", result));
        }

        response.truncate(response_len as usize);
        Ok(response)
    }

    fn close(&mut self, context: TbsContext) {
        // SAFETY: the context came from Tbsi_Context_Create and is closed only here.
        let result = unsafe { Tbsip_Context_Close(context.0) };
        if result != TBS_SUCCESS {
            tracing::warn!("Tbsip_Context_Close failed: 0x{result:08X}");
        }
    }
}
