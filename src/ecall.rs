use common::mpxy::*;
use common::sbi::{SbiError, SbiRet};

use crate::{platform::Platform, proxy::Mpxy, state::Caller};

const MPXY_EXT_NAME: [u8; 8] = *b"mpxy\0\0\0\0";

/// Argument registers `a0..a5` of a trapped ecall.
pub type EcallArgs = [usize; 6];

fn arg_u32(arg: usize) -> Result<u32, SbiError> {
    u32::try_from(arg).map_err(|_| SbiError::InvalidParam)
}

/// The extension is only advertised once a channel exists.
pub fn probe<P: Platform>(mpxy: &Mpxy<'_, P>) -> bool {
    mpxy.channel_available()
}

pub fn name() -> &'static [u8] {
    &MPXY_EXT_NAME
}

/// SBI ecall handler for the MPXY extension.
///
/// Parameters:
/// - caller: the domain and hart the ecall trapped from
/// - fid:    the function identifier within this extension
/// - args:   the argument registers
///
/// Returns the `SbiRet` to write back into `a0`/`a1`; unknown functions give not-supported.
pub fn handle_ecall<P: Platform>(mpxy: &Mpxy<'_, P>, caller: Caller, fid: usize, args: &EcallArgs) -> SbiRet {
    dispatch(mpxy, caller, fid, args).into()
}

fn dispatch<P: Platform>(mpxy: &Mpxy<'_, P>, caller: Caller, fid: usize, args: &EcallArgs) -> Result<usize, SbiError> {
    match fid {
        SBI_MPXY_SET_SHMEM => mpxy.set_shmem(caller, args[0], args[1], args[2], args[3]).map(|_| 0),
        SBI_MPXY_GET_CHANNEL_IDS => mpxy.get_channel_ids(caller, arg_u32(args[0])?).map(|_| 0),
        SBI_MPXY_READ_ATTRS => mpxy
            .read_attrs(caller, arg_u32(args[0])?, arg_u32(args[1])?, arg_u32(args[2])?)
            .map(|_| 0),
        SBI_MPXY_WRITE_ATTRS => mpxy
            .write_attrs(caller, arg_u32(args[0])?, arg_u32(args[1])?, arg_u32(args[2])?)
            .map(|_| 0),
        SBI_MPXY_SEND_MSG_WITH_RESP => {
            let mut resp_len = 0;
            mpxy.send_message(caller, arg_u32(args[0])?, args[1] as u32, args[2], Some(&mut resp_len))?;
            Ok(resp_len)
        }
        SBI_MPXY_SEND_MSG_WITHOUT_RESP => mpxy
            .send_message(caller, arg_u32(args[0])?, args[1] as u32, args[2], None)
            .map(|_| 0),
        SBI_MPXY_GET_NOTIFICATION_EVENTS => {
            let mut events_len = 0;
            mpxy.get_notification_events(caller, arg_u32(args[0])?, &mut events_len)?;
            Ok(events_len)
        }
        _ => {
            log::trace!("unsupported mpxy fid {}", fid);
            Err(SbiError::NotSupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_arguments_are_rejected() {
        assert_eq!(arg_u32(0xffff_ffff), Ok(0xffff_ffff));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(arg_u32(0x1_0000_0000), Err(SbiError::InvalidParam));
    }

    #[test]
    fn extension_name_is_nul_padded() {
        assert_eq!(&name()[..4], b"mpxy");
        assert!(name()[4..].iter().all(|&b| b == 0));
    }
}
