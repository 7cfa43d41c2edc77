//! The client-request wire format: a 32-bit code plus five unsigned-word
//! arguments, as the instrumented program would issue via a host-specific
//! trap. `decode` turns one raw request into a [`ClientRequest`], or
//! reports it as unrecognised.

use memhist_core::{CallContext, ClientRequest, ProtFlags};

/// Codes assigned densely from a tool base.
const BASE: u32 = 0x1001_0000;
pub const TRACK_MEM_WRITE: u32 = BASE;
pub const UNTRACK_MEM_WRITE: u32 = BASE + 1;
pub const TRACK_ENABLE: u32 = BASE + 2;
pub const TRACK_DISABLE: u32 = BASE + 3;
pub const SET_PROTECTION: u32 = BASE + 4;
pub const CLEAR_PROTECTION: u32 = BASE + 5;

/// A request code this build does not recognise: a soft warning rather
/// than a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownRequestCode(pub u32);

impl std::fmt::Display for UnknownRequestCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client request: unhandled code 0x{:x}", self.0)
    }
}

impl std::error::Error for UnknownRequestCode {}

/// Decode a raw `(code, args)` request. `name` resolves `name_ptr` for the
/// two codes that carry one — the host framework is assumed to have
/// already read the guest string, per the engine's non-goal of simulating
/// guest memory.
pub fn decode(code: u32, args: [u64; 5], name: Option<CallContext>) -> Result<ClientRequest, UnknownRequestCode> {
    match code {
        TRACK_MEM_WRITE => Ok(ClientRequest::TrackMemWrite {
            addr: args[0],
            size: args[1],
            word_size: u8::try_from(args[2]).unwrap_or(u8::MAX),
            history_depth: u32::try_from(args[3]).unwrap_or(u32::MAX),
            name: name.unwrap_or_else(|| "<unnamed>".into()),
        }),
        UNTRACK_MEM_WRITE => Ok(ClientRequest::UntrackMemWrite { addr: args[0], size: args[1] }),
        TRACK_ENABLE => Ok(ClientRequest::TrackEnable { addr: args[0], size: args[1] }),
        TRACK_DISABLE => Ok(ClientRequest::TrackDisable { addr: args[0], size: args[1] }),
        SET_PROTECTION => Ok(ClientRequest::SetProtection {
            addr: args[0],
            size: args[1],
            name: name.unwrap_or_else(|| "<unnamed>".into()),
            flags: ProtFlags::from_bits(u8::try_from(args[3]).unwrap_or(0)),
        }),
        CLEAR_PROTECTION => Ok(ClientRequest::ClearProtection {
            addr: args[0],
            size: args[1],
            flags: ProtFlags::from_bits(u8::try_from(args[2]).unwrap_or(0)),
        }),
        other => Err(UnknownRequestCode(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_track_mem_write() {
        let req = decode(TRACK_MEM_WRITE, [0x1000, 0x80, 8, 4, 0], Some("v".into())).unwrap();
        assert_eq!(
            req,
            ClientRequest::TrackMemWrite { addr: 0x1000, size: 0x80, word_size: 8, history_depth: 4, name: "v".into() }
        );
    }

    #[test]
    fn unknown_code_reports_itself() {
        let err = decode(0xDEAD_BEEF, [0; 5], None).unwrap_err();
        assert_eq!(err.0, 0xDEAD_BEEF);
    }
}
