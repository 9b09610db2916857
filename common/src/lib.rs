//! Definitions shared by the firmware and the supervisor payloads talking to it: the SBI
//! error vocabulary, the MPXY extension numbering and a thin `ecall` client.
#![cfg_attr(not(test), no_std)]

pub mod sbi {
    use core::fmt::Display;

    pub const PAGE_SIZE: usize = 4096;

    // SBI error codes. The numbering is ABI: supervisor software compares against these values.
    pub const SBI_SUCCESS: isize = 0;
    pub const SBI_ERR_FAILED: isize = -1;
    pub const SBI_ERR_NOT_SUPPORTED: isize = -2;
    pub const SBI_ERR_INVALID_PARAM: isize = -3;
    pub const SBI_ERR_DENIED: isize = -4;
    pub const SBI_ERR_INVALID_ADDRESS: isize = -5;
    pub const SBI_ERR_ALREADY_AVAILABLE: isize = -6;
    pub const SBI_ERR_ALREADY_STARTED: isize = -7;
    pub const SBI_ERR_ALREADY_STOPPED: isize = -8;
    pub const SBI_ERR_NO_SHMEM: isize = -9;
    pub const SBI_ERR_INVALID_STATE: isize = -10;
    pub const SBI_ERR_BAD_RANGE: isize = -11;
    pub const SBI_ERR_TIMEOUT: isize = -12;
    pub const SBI_ERR_IO: isize = -13;
    pub const SBI_ERR_DENIED_LOCKED: isize = -14;
    pub const SBI_ERR_NOT_IMPLEMENTED: isize = -15;

    /// Errors passed over the SBI boundary.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SbiError {
        Failed,
        NotSupported,
        InvalidParam,
        Denied,
        InvalidAddress,
        /// The object already exists (e.g. a duplicated channel id).
        AlreadyAvailable,
        AlreadyStarted,
        AlreadyStopped,
        NoShmem,
        InvalidState,
        BadRange,
        Timeout,
        Io,
        DeniedLocked,
        NotImplemented,
    }

    impl SbiError {
        /// Convert `Self` to the error code returned in `a0`.
        pub const fn code(self) -> isize {
            use SbiError::*;
            match self {
                Failed => SBI_ERR_FAILED,
                NotSupported => SBI_ERR_NOT_SUPPORTED,
                InvalidParam => SBI_ERR_INVALID_PARAM,
                Denied => SBI_ERR_DENIED,
                InvalidAddress => SBI_ERR_INVALID_ADDRESS,
                AlreadyAvailable => SBI_ERR_ALREADY_AVAILABLE,
                AlreadyStarted => SBI_ERR_ALREADY_STARTED,
                AlreadyStopped => SBI_ERR_ALREADY_STOPPED,
                NoShmem => SBI_ERR_NO_SHMEM,
                InvalidState => SBI_ERR_INVALID_STATE,
                BadRange => SBI_ERR_BAD_RANGE,
                Timeout => SBI_ERR_TIMEOUT,
                Io => SBI_ERR_IO,
                DeniedLocked => SBI_ERR_DENIED_LOCKED,
                NotImplemented => SBI_ERR_NOT_IMPLEMENTED,
            }
        }

        /// Parse an error code. `SBI_SUCCESS` and unknown codes give `None`.
        pub const fn from_code(code: isize) -> Option<Self> {
            use SbiError::*;
            Some(match code {
                SBI_ERR_FAILED => Failed,
                SBI_ERR_NOT_SUPPORTED => NotSupported,
                SBI_ERR_INVALID_PARAM => InvalidParam,
                SBI_ERR_DENIED => Denied,
                SBI_ERR_INVALID_ADDRESS => InvalidAddress,
                SBI_ERR_ALREADY_AVAILABLE => AlreadyAvailable,
                SBI_ERR_ALREADY_STARTED => AlreadyStarted,
                SBI_ERR_ALREADY_STOPPED => AlreadyStopped,
                SBI_ERR_NO_SHMEM => NoShmem,
                SBI_ERR_INVALID_STATE => InvalidState,
                SBI_ERR_BAD_RANGE => BadRange,
                SBI_ERR_TIMEOUT => Timeout,
                SBI_ERR_IO => Io,
                SBI_ERR_DENIED_LOCKED => DeniedLocked,
                SBI_ERR_NOT_IMPLEMENTED => NotImplemented,
                _ => return None,
            })
        }
    }

    impl Display for SbiError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            let msg = match self {
                Self::Failed => "failed",
                Self::NotSupported => "not supported",
                Self::InvalidParam => "invalid parameter",
                Self::Denied => "denied",
                Self::InvalidAddress => "invalid address",
                Self::AlreadyAvailable => "already available",
                Self::AlreadyStarted => "already started",
                Self::AlreadyStopped => "already stopped",
                Self::NoShmem => "no shared memory",
                Self::InvalidState => "invalid state",
                Self::BadRange => "bad range",
                Self::Timeout => "timed out",
                Self::Io => "i/o error",
                Self::DeniedLocked => "denied (locked)",
                Self::NotImplemented => "not implemented",
            };
            write!(f, "{} ({})", msg, self.code())
        }
    }

    impl core::error::Error for SbiError {}

    /// SbiRet is the pair returned in `a0`/`a1` by every SBI call.
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SbiRet {
        pub error: isize,
        pub value: usize,
    }

    impl SbiRet {
        pub const fn success(value: usize) -> Self {
            Self {
                error: SBI_SUCCESS,
                value,
            }
        }

        pub fn into_result(self) -> Result<usize, SbiError> {
            match self.error {
                SBI_SUCCESS => Ok(self.value),
                code => Err(SbiError::from_code(code).unwrap_or(SbiError::Failed)),
            }
        }
    }

    impl From<Result<usize, SbiError>> for SbiRet {
        fn from(result: Result<usize, SbiError>) -> Self {
            match result {
                Ok(value) => Self::success(value),
                Err(err) => Self {
                    error: err.code(),
                    value: 0,
                },
            }
        }
    }

    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    pub fn sbi_call(extid: usize, fid: usize, args: &[usize; 5]) -> SbiRet {
        let (error, value);
        unsafe {
            core::arch::asm!(
                "ecall",
                in("a7") extid,
                in("a6") fid,
                inlateout("a0") args[0] => error,
                inlateout("a1") args[1] => value,
                in("a2") args[2],
                in("a3") args[3],
                in("a4") args[4],
            );
        }
        SbiRet { error, value }
    }
}

pub mod mpxy {
    // MPXY extension ID ("MPXY") and function IDs.
    pub const SBI_MPXY_EXT_ID: usize = 0x4D505859;

    pub const SBI_MPXY_SET_SHMEM: usize = 0;
    pub const SBI_MPXY_GET_CHANNEL_IDS: usize = 1;
    pub const SBI_MPXY_READ_ATTRS: usize = 2;
    pub const SBI_MPXY_WRITE_ATTRS: usize = 3;
    pub const SBI_MPXY_SEND_MSG_WITH_RESP: usize = 4;
    pub const SBI_MPXY_SEND_MSG_WITHOUT_RESP: usize = 5;
    pub const SBI_MPXY_GET_NOTIFICATION_EVENTS: usize = 6;

    pub const SBI_MPXY_SHMEM_FLAG_OVERWRITE: usize = 0b00;
    pub const SBI_MPXY_SHMEM_FLAG_OVERWRITE_RETURN: usize = 0b01;
    pub const SBI_MPXY_SHMEM_FLAG_MAX_IDX: usize = 0b10;

    // Standard channel attributes, managed by the proxy framework. The numbering is the
    // index of the attribute in the 32-bit attribute array.
    pub const SBI_MPXY_ATTR_MSG_PROT_ID: u32 = 0x0000_0000;
    pub const SBI_MPXY_ATTR_MSG_PROT_VER: u32 = 0x0000_0001;
    pub const SBI_MPXY_ATTR_MSG_MAX_LEN: u32 = 0x0000_0002;
    pub const SBI_MPXY_ATTR_MSG_SEND_TIMEOUT: u32 = 0x0000_0003;
    pub const SBI_MPXY_ATTR_CHANNEL_CAPABILITY: u32 = 0x0000_0004;
    pub const SBI_MPXY_ATTR_MSI_CONTROL: u32 = 0x0000_0005;
    pub const SBI_MPXY_ATTR_MSI_ADDR_LO: u32 = 0x0000_0006;
    pub const SBI_MPXY_ATTR_MSI_ADDR_HI: u32 = 0x0000_0007;
    pub const SBI_MPXY_ATTR_MSI_DATA: u32 = 0x0000_0008;
    pub const SBI_MPXY_ATTR_SSE_EVENT_ID: u32 = 0x0000_0009;
    pub const SBI_MPXY_ATTR_EVENTS_STATE_CONTROL: u32 = 0x0000_000A;
    pub const SBI_MPXY_ATTR_STD_ATTR_MAX_IDX: u32 = 0x0000_000B;

    // Message protocol specific attributes, managed by the protocol backend.
    pub const SBI_MPXY_ATTR_MSGPROTO_ATTR_START: u32 = 0x8000_0000;
    pub const SBI_MPXY_ATTR_MSGPROTO_ATTR_END: u32 = 0xFFFF_FFFF;

    // Channel capability bits.
    pub const SBI_MPXY_CAP_MSI: u32 = 1 << 0;
    pub const SBI_MPXY_CAP_SSE: u32 = 1 << 1;
    pub const SBI_MPXY_CAP_EVENTS_STATE: u32 = 1 << 2;

    /// MSI address attributes hold this value until supervisor software programs them.
    pub const SBI_MPXY_MSI_ADDR_INVALID: u32 = 0xFFFF_FFFF;

    pub const SBI_MPXY_MSGPROTO_RPMI_ID: u32 = 0x0;

    pub const fn msgproto_version(major: u32, minor: u32) -> u32 {
        (major << 16) | minor
    }

    /// Supervisor side wrappers. Every call returns `a1` on success.
    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    pub mod client {
        use super::*;
        use crate::sbi::{sbi_call, SbiError};

        fn mpxy_call(fid: usize, args: [usize; 5]) -> Result<usize, SbiError> {
            sbi_call(SBI_MPXY_EXT_ID, fid, &args).into_result()
        }

        pub fn set_shmem(size: usize, addr_lo: usize, addr_hi: usize, flags: usize) -> Result<(), SbiError> {
            mpxy_call(SBI_MPXY_SET_SHMEM, [size, addr_lo, addr_hi, flags, 0]).map(|_| ())
        }

        /// Release the shared memory of the calling hart.
        pub fn disable_shmem() -> Result<(), SbiError> {
            set_shmem(0, usize::MAX, usize::MAX, 0)
        }

        pub fn get_channel_ids(start_index: u32) -> Result<(), SbiError> {
            mpxy_call(SBI_MPXY_GET_CHANNEL_IDS, [start_index as usize, 0, 0, 0, 0]).map(|_| ())
        }

        pub fn read_attrs(channel_id: u32, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
            let args = [channel_id as usize, base_attr_id as usize, attr_count as usize, 0, 0];
            mpxy_call(SBI_MPXY_READ_ATTRS, args).map(|_| ())
        }

        pub fn write_attrs(channel_id: u32, base_attr_id: u32, attr_count: u32) -> Result<(), SbiError> {
            let args = [channel_id as usize, base_attr_id as usize, attr_count as usize, 0, 0];
            mpxy_call(SBI_MPXY_WRITE_ATTRS, args).map(|_| ())
        }

        /// Returns the length of the response left in the shared memory.
        pub fn send_message_with_response(channel_id: u32, msg_id: u32, msg_len: usize) -> Result<usize, SbiError> {
            let args = [channel_id as usize, msg_id as usize, msg_len, 0, 0];
            mpxy_call(SBI_MPXY_SEND_MSG_WITH_RESP, args)
        }

        pub fn send_message_without_response(channel_id: u32, msg_id: u32, msg_len: usize) -> Result<(), SbiError> {
            let args = [channel_id as usize, msg_id as usize, msg_len, 0, 0];
            mpxy_call(SBI_MPXY_SEND_MSG_WITHOUT_RESP, args).map(|_| ())
        }

        /// Returns the number of event bytes left in the shared memory.
        pub fn get_notification_events(channel_id: u32) -> Result<usize, SbiError> {
            mpxy_call(SBI_MPXY_GET_NOTIFICATION_EVENTS, [channel_id as usize, 0, 0, 0, 0])
        }
    }
}
