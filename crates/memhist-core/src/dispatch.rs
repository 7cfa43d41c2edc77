//! The access dispatcher and history recorder.

use crate::engine::Engine;
use crate::flags::ProtFlags;
use crate::region::{CallContext, HistoryEntry};

/// One observed memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    Exec,
}

/// Result of dispatching one access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    Ok,
    /// A protection violation. `region` names the region it was reported
    /// against — the instrumentation shim uses this to abort the basic
    /// block.
    Fault { region: std::sync::Arc<str> },
}

impl AccessOutcome {
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}

/// Shift `data` right by `bits`, treating a shift of 64 or more as
/// "nothing survives" rather than panicking (Rust panics shifting a u64 by
/// its own bit width).
fn shr64_saturating(data: u64, bits: u32) -> u64 {
    if bits >= 64 { 0 } else { data >> bits }
}

impl Engine {
    /// Dispatch one read/write/exec access.
    ///
    /// `data` is the store value for `Write` accesses, widened to 64 bits;
    /// ignored otherwise. `ctx` is the call-context handle the host
    /// framework captured for this event.
    pub fn on_access(
        &mut self,
        ctx: CallContext,
        kind: AccessKind,
        addr: u64,
        size: u32,
        data: Option<u64>,
    ) -> AccessOutcome {
        let Some(first) = self.store().lookup_maxle(addr) else {
            return AccessOutcome::Ok;
        };
        if addr >= self.store().get(first).expect("live key").end {
            return AccessOutcome::Ok;
        }

        let mut cursor = Some(first);
        let mut hit = false;
        let mut fault = None;

        while let Some(key) = cursor {
            let (r_start, r_end) = {
                let r = self.store().get(key).expect("live key");
                (r.start, r.end)
            };
            if addr + u64::from(size) <= r_start {
                break;
            }
            debug_assert!(addr + u64::from(size) > r_start && addr < r_end);

            let enabled = self.store().get(key).expect("live key").enabled;
            if enabled {
                let mask = self.store().get(key).expect("live key").protection;
                match kind {
                    AccessKind::Write => {
                        if mask.contains(ProtFlags::FORBID_WRITE) {
                            fault = Some(self.region_name(key));
                        } else {
                            if mask.contains(ProtFlags::TRACK_WRITES) {
                                let data = data.expect("write access must carry data");
                                self.record_write(key, addr, size, data, ctx.clone());
                            }
                            hit = true;
                        }
                    }
                    AccessKind::Read => {
                        if mask.contains(ProtFlags::FORBID_READ) {
                            fault = Some(self.region_name(key));
                        } else {
                            hit = true;
                        }
                    }
                    AccessKind::Exec => {
                        if mask.contains(ProtFlags::FORBID_EXEC) {
                            fault = Some(self.region_name(key));
                        } else {
                            hit = true;
                        }
                    }
                }
            }

            if fault.is_some() {
                break;
            }
            if addr + u64::from(size) <= r_end {
                break;
            }
            cursor = self.store().succ_key(key);
        }

        // The clock advances on any event that produced a recorded sample
        // *or* a violation report; a fault therefore also ticks the clock
        // even though the dispatcher returns immediately.
        if hit || fault.is_some() {
            self.tick_clock();
        }

        match fault {
            Some(region) => AccessOutcome::Fault { region },
            None => AccessOutcome::Ok,
        }
    }

    /// Compare-and-swap. `current` is the value the caller already read
    /// from `addr` — this engine does not itself simulate guest memory, so
    /// unlike a tool running inside the guest's own address space (which
    /// can dereference `addr` directly) the already-read value is handed
    /// in.
    ///
    /// Returns the dispatch outcome and whether the swap actually took
    /// place (`current == expected`).
    pub fn on_cas(
        &mut self,
        ctx: CallContext,
        addr: u64,
        size: u32,
        current: u64,
        expected: u64,
        data: u64,
    ) -> (AccessOutcome, bool) {
        assert!(
            matches!(size, 1 | 2 | 4 | 8),
            "CAS on {size}-byte width not implemented"
        );
        if current == expected {
            (self.on_access(ctx, AccessKind::Write, addr, size, Some(data)), true)
        } else {
            (AccessOutcome::Ok, false)
        }
    }

    fn region_name(&self, key: u64) -> std::sync::Arc<str> {
        self.store().get(key).expect("live key").name.clone()
    }

    /// History recorder: record one sample per word touched by a write
    /// into `region`'s ring.
    fn record_write(&mut self, region_key: u64, addr: u64, size: u32, mut data: u64, ctx: CallContext) {
        let timestamp = self.clock_now();
        let r = self.store_mut().get_mut(region_key).expect("live key");
        let track = r.tracking.as_mut().expect("TRACK_WRITES implies tracking state");

        if addr < r.start {
            data = shr64_saturating(data, u32::try_from((r.start - addr) * 8).expect("shift fits u32"));
        }
        let clamped_start = addr.max(r.start);
        let clamped_end = (addr + u64::from(size)).min(r.end);

        let start_word = u32::try_from((clamped_start - r.start) / u64::from(track.word_size)).expect("word index fits u32");
        let end_word = u32::try_from((clamped_end - r.start - 1) / u64::from(track.word_size)).expect("word index fits u32") + 1;

        let mut remaining = data;
        for w in start_word..end_word {
            track.push(
                w,
                HistoryEntry {
                    call_stack: Some(ctx.clone()),
                    timestamp,
                    data: remaining,
                },
            );
            remaining = shr64_saturating(remaining, u32::from(track.word_size) * 8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{EnabledKinds, ProtFlags};
    use crate::region::Region;
    use std::sync::Arc;

    fn ctx() -> CallContext {
        Arc::from("test")
    }

    fn rw_engine() -> Engine {
        Engine::new(EnabledKinds::parse("RWX").unwrap(), false)
    }

    #[test]
    fn write_outside_any_region_is_ok() {
        let mut e = rw_engine();
        let outcome = e.on_access(ctx(), AccessKind::Write, 100, 4, Some(1));
        assert_eq!(outcome, AccessOutcome::Ok);
        assert_eq!(e.clock_now(), 0);
    }

    #[test]
    fn forbidden_write_faults_and_records_nothing() {
        let mut e = rw_engine();
        let mut r = Region::new(0x1000, 0x1010, Arc::from("x"), 0, ProtFlags::FORBID_WRITE);
        r.enabled = true;
        e.store_mut().insert_nonoverlapping(r);

        let outcome = e.on_access(ctx(), AccessKind::Write, 0x1004, 1, Some(0xAB));
        assert!(outcome.is_fault());
        if let AccessOutcome::Fault { region } = outcome {
            assert_eq!(&*region, "x");
        }

        let read = e.on_access(ctx(), AccessKind::Read, 0x1004, 1, None);
        assert_eq!(read, AccessOutcome::Ok);
    }

    #[test]
    fn straddling_write_hits_both_regions() {
        let mut e = rw_engine();
        e.store_mut()
            .insert_nonoverlapping(Region::new(0, 8, Arc::from("a"), 0, ProtFlags::FORBID_READ));
        e.store_mut()
            .insert_nonoverlapping(Region::new(8, 16, Arc::from("b"), 0, ProtFlags::FORBID_READ));

        // a write straddling both regions, neither of which forbids writes
        let outcome = e.on_access(ctx(), AccessKind::Write, 4, 8, Some(0));
        assert_eq!(outcome, AccessOutcome::Ok);
        assert_eq!(e.clock_now(), 1);
    }

    #[test]
    fn cas_writes_only_on_match() {
        let mut e = rw_engine();
        let mut r = Region::new(0x2000, 0x2004, Arc::from("w"), 0, ProtFlags::TRACK_WRITES);
        r.tracking = Some(crate::region::TrackState::new(4, 1, 4));
        e.store_mut().insert_nonoverlapping(r);

        let (outcome, swapped) = e.on_cas(ctx(), 0x2000, 4, 0x11, 0x11, 0x22);
        assert_eq!(outcome, AccessOutcome::Ok);
        assert!(swapped);

        let (outcome, swapped) = e.on_cas(ctx(), 0x2000, 4, 0x11, 0x99, 0x33);
        assert_eq!(outcome, AccessOutcome::Ok);
        assert!(!swapped);

        let region = e.store().get(0x2000).unwrap();
        let samples: Vec<_> = region.tracking.as_ref().unwrap().history(0).map(|h| h.data).collect();
        assert_eq!(samples, vec![0x22]);
    }

    #[test]
    #[should_panic(expected = "not implemented")]
    fn cas_rejects_unsupported_size() {
        let mut e = rw_engine();
        let _ = e.on_cas(ctx(), 0, 3, 0, 0, 0);
    }
}
