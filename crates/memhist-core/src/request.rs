//! Region lifecycle and the client-request demultiplexer.

use crate::engine::Engine;
use crate::flags::ProtFlags;
use crate::region::{CallContext, Region, TrackState};

/// One decoded client request: six densely-assigned tool codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    TrackMemWrite { addr: u64, size: u64, word_size: u8, history_depth: u32, name: CallContext },
    UntrackMemWrite { addr: u64, size: u64 },
    TrackEnable { addr: u64, size: u64 },
    TrackDisable { addr: u64, size: u64 },
    SetProtection { addr: u64, size: u64, name: CallContext, flags: ProtFlags },
    ClearProtection { addr: u64, size: u64, flags: ProtFlags },
}

/// Outcome handed back to the host framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Handled,
    NotHandled,
}

impl Engine {
    /// Dispatch a decoded client request. Every variant returns `Handled`;
    /// an unrecognised raw code never reaches this far — see
    /// `memhist-cli`'s request decoder, which returns `NotHandled` itself
    /// for codes this enum has no variant for.
    pub fn handle_request(&mut self, request: ClientRequest) -> RequestOutcome {
        match request {
            ClientRequest::TrackMemWrite { addr, size, word_size, history_depth, name } => {
                self.register_tracking(addr, size, word_size, history_depth, name);
            }
            ClientRequest::UntrackMemWrite { addr, size } => {
                self.unregister_tracking(addr, size);
            }
            ClientRequest::TrackEnable { addr, size } => {
                self.set_enabled(addr, size, true);
            }
            ClientRequest::TrackDisable { addr, size } => {
                self.set_enabled(addr, size, false);
            }
            ClientRequest::SetProtection { addr, size, name, flags } => {
                self.set_protection(addr, size, name, flags);
            }
            ClientRequest::ClearProtection { addr, size, flags } => {
                self.clear_protection(addr, size, flags);
            }
        }
        RequestOutcome::Handled
    }

    /// Register a new `TRACK_WRITES` region. A no-op if `WRITE` is not in
    /// the globally-enabled access kinds.
    pub fn register_tracking(
        &mut self,
        addr: u64,
        size: u64,
        word_size: u8,
        history_depth: u32,
        name: CallContext,
    ) {
        if !self.enabled_kinds().writes_enabled() {
            return;
        }
        let word_count = u32::try_from(size.div_ceil(u64::from(word_size))).expect("word_count fits u32");
        let birth_time = self.tick_clock();
        let mut r = Region::new(addr, addr + size, name, birth_time, ProtFlags::TRACK_WRITES);
        r.tracking = Some(TrackState::new(word_size, word_count, history_depth));
        self.store_mut().insert_nonoverlapping(r);
    }

    /// Remove `TRACK_WRITES` from the region exactly spanning `[addr, addr+size)`.
    /// Asserts the size matches — a programmer fault otherwise.
    pub fn unregister_tracking(&mut self, addr: u64, size: u64) {
        let r = self.store_mut().get_mut(addr).unwrap_or_else(|| {
            panic!("unregister_tracking: no region at 0x{addr:x}")
        });
        assert_eq!(
            r.end - r.start,
            size,
            "unregister_tracking: size mismatch at 0x{addr:x}"
        );
        r.tracking = None;
        r.protection = r.protection.difference(ProtFlags::TRACK_WRITES);
        if r.protection.is_empty() {
            self.store_mut().remove(addr);
        }
    }

    /// Set the `enabled` gate on the region exactly spanning `[addr, addr+size)`.
    /// A missing region is a silent no-op (unregister may have preceded).
    pub fn set_enabled(&mut self, addr: u64, size: u64, value: bool) {
        if let Some(r) = self.store_mut().get_mut(addr) {
            if r.end - r.start == size {
                r.enabled = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::EnabledKinds;
    use std::sync::Arc;

    #[test]
    fn register_tracking_is_noop_when_writes_disabled() {
        let mut e = Engine::new(EnabledKinds::parse("RX").unwrap(), false);
        e.register_tracking(0x1000, 0x10, 4, 3, Arc::from("v"));
        assert!(e.store().is_empty());
    }

    #[test]
    fn register_then_unregister_tracking() {
        let mut e = Engine::new(EnabledKinds::all(), false);
        e.register_tracking(0x1000, 0x10, 4, 3, Arc::from("v"));
        assert_eq!(e.store().len(), 1);
        e.unregister_tracking(0x1000, 0x10);
        assert!(e.store().is_empty());
    }

    #[test]
    fn unregister_keeps_region_if_protection_bits_remain() {
        let mut e = Engine::new(EnabledKinds::all(), false);
        e.register_tracking(0x1000, 0x10, 4, 3, Arc::from("v"));
        e.set_protection(0x1000, 0x10, Arc::from("v"), ProtFlags::FORBID_WRITE);
        e.unregister_tracking(0x1000, 0x10);
        let r = e.store().get(0x1000).expect("region survives");
        assert!(r.tracking.is_none());
        assert!(r.protection.contains(ProtFlags::FORBID_WRITE));
        assert!(!r.protection.contains(ProtFlags::TRACK_WRITES));
    }

    #[test]
    #[should_panic(expected = "size mismatch")]
    fn unregister_tracking_rejects_wrong_size() {
        let mut e = Engine::new(EnabledKinds::all(), false);
        e.register_tracking(0x1000, 0x10, 4, 3, Arc::from("v"));
        e.unregister_tracking(0x1000, 0x20);
    }

    #[test]
    fn set_enabled_toggles_and_ignores_missing_region() {
        let mut e = Engine::new(EnabledKinds::all(), false);
        e.register_tracking(0x1000, 0x10, 4, 3, Arc::from("v"));
        e.set_enabled(0x1000, 0x10, false);
        assert!(!e.store().get(0x1000).unwrap().enabled);
        e.set_enabled(0x9999, 0x10, true); // no panic
    }

    #[test]
    fn handle_request_dispatches_set_protection() {
        let mut e = Engine::new(EnabledKinds::all(), false);
        let outcome = e.handle_request(ClientRequest::SetProtection {
            addr: 0x2000,
            size: 0x10,
            name: Arc::from("p"),
            flags: ProtFlags::FORBID_EXEC,
        });
        assert_eq!(outcome, RequestOutcome::Handled);
        assert!(e.store().get(0x2000).unwrap().protection.contains(ProtFlags::FORBID_EXEC));
    }
}
