//! The protection manager: `set_protection` / `clear_protection`.

use crate::engine::Engine;
use crate::flags::ProtFlags;
use crate::region::{CallContext, Region};
use crate::store::RegionStore;

enum Cursor {
    Void { next: Option<u64> },
    Region(u64),
}

fn reinsert_at(store: &mut RegionStore, old_start: u64, new_start: u64) {
    let mut r = store.remove(old_start).expect("live key");
    r.start = new_start;
    store.insert_disjoint(r);
}

fn absorb_succ(store: &mut RegionStore, key: u64, succ: u64) {
    let succ_end = store.get(succ).expect("live key").end;
    store.remove(succ);
    store.get_mut(key).expect("live key").end = succ_end;
}

impl Engine {
    /// OR `flags` into every region covering `[start, start+size)`, filling
    /// gaps with fresh `flags`-only regions named `name`.
    pub fn set_protection(&mut self, start: u64, size: u64, name: CallContext, flags: ProtFlags) {
        let flags = self.enabled_kinds().filter(flags);
        if flags.is_empty() {
            return;
        }
        let end = start + size;
        // Region creation/mutation advances the clock; regions created
        // below all stamp the value observed at entry rather than one tick
        // per region, since the state machine holds a single mutable
        // borrow of the store for its whole walk. The call itself still
        // ticks once at the end, below, since it always creates or mutates
        // at least one region once `flags` is non-empty.
        let birth = self.clock_now();
        let store = self.store_mut();

        let mut cursor = start;
        let mut state = match store.lookup_maxle(start) {
            None => Cursor::Void { next: store.lookup_ming(start) },
            Some(key) => {
                let r = store.get(key).expect("live key");
                if r.end < start || (r.end == start && r.protection != flags) {
                    Cursor::Void { next: store.succ_key(key) }
                } else {
                    Cursor::Region(key)
                }
            }
        };

        loop {
            match state {
                Cursor::Void { next } => match next {
                    None => {
                        store.insert_disjoint(Region::new(cursor, end, name.clone(), birth, flags));
                        break;
                    }
                    Some(r_key) => {
                        let r_start = store.get(r_key).expect("live key").start;
                        if r_start > end {
                            store.insert_disjoint(Region::new(cursor, end, name.clone(), birth, flags));
                            break;
                        }
                        let r_mask = store.get(r_key).expect("live key").protection;
                        if r_mask == flags {
                            reinsert_at(store, r_key, cursor);
                            state = Cursor::Region(cursor);
                        } else {
                            store.insert_disjoint(Region::new(cursor, r_start, name.clone(), birth, flags));
                            cursor = r_start;
                            state = Cursor::Region(r_key);
                        }
                    }
                },
                Cursor::Region(r_key) => {
                    let r = store.get(r_key).expect("live key");
                    let (r_end, r_mask, tracked) = (r.end, r.protection, r.tracking.is_some());

                    if r_end > end {
                        if !r_mask.contains(flags) {
                            if tracked {
                                // A TRACK_WRITES region is never split;
                                // widen its mask in place instead, covering
                                // more than asked.
                                store.get_mut(r_key).expect("live key").protection =
                                    r_mask.union(flags);
                            } else {
                                let r = store.get(r_key).expect("live key");
                                let tail = Region::new(end, r_end, r.name.clone(), r.birth_time, r_mask);
                                store.get_mut(r_key).expect("live key").end = end;
                                store.insert_disjoint(tail);
                                store.get_mut(r_key).expect("live key").protection = r_mask.union(flags);
                            }
                        }
                        break;
                    }

                    if r_mask == flags {
                        // unreachable for tracked regions: their mask always
                        // carries TRACK_WRITES, which `flags` never does.
                        match store.succ_key(r_key) {
                            None => {
                                store.get_mut(r_key).expect("live key").end = end;
                                break;
                            }
                            Some(succ) => {
                                let succ_start = store.get(succ).expect("live key").start;
                                if succ_start > end {
                                    store.get_mut(r_key).expect("live key").end = end;
                                    break;
                                }
                                let succ_mask = store.get(succ).expect("live key").protection;
                                if succ_mask == flags {
                                    absorb_succ(store, r_key, succ);
                                } else {
                                    store.get_mut(r_key).expect("live key").end = succ_start;
                                    cursor = succ_start;
                                    state = Cursor::Region(succ);
                                }
                            }
                        }
                    } else {
                        store.get_mut(r_key).expect("live key").protection = r_mask.union(flags);
                        if r_end == end {
                            break;
                        }
                        cursor = r_end;
                        state = match store.succ_key(r_key) {
                            None => Cursor::Void { next: None },
                            Some(s) => {
                                let s_start = store.get(s).expect("live key").start;
                                if s_start > cursor {
                                    Cursor::Void { next: Some(s) }
                                } else {
                                    Cursor::Region(s)
                                }
                            }
                        };
                    }
                }
            }
        }

        normalize_adjacency(store);
        self.tick_clock();
    }

    /// Clear `flags` from every region covering `[start, start+size)`,
    /// splitting/merging as needed. `TRACK_WRITES` regions are left
    /// completely untouched: only additive mutation of a tracked region's
    /// mask is ever permitted, which rules out clearing bits from it at
    /// all.
    pub fn clear_protection(&mut self, start: u64, size: u64, flags: ProtFlags) {
        debug_assert!(!flags.contains(ProtFlags::TRACK_WRITES));
        let flags = self.enabled_kinds().filter(flags);
        if flags.is_empty() {
            return;
        }
        let end = start + size;
        let store = self.store_mut();

        // A region straddling `start` from the left is split there so the
        // walk below can treat its right half uniformly — including a
        // further split at `end` if it also straddles that boundary. The
        // split is purely geometric: the mask carries over unchanged here,
        // and is cleared (if at all) by the same per-region step that
        // clears every other region in range.
        if let Some(key) = store.lookup_maxle(start) {
            let r = store.get(key).expect("live key");
            let tracked = r.tracking.is_some();
            if !tracked && r.start < start && start < r.end && r.protection.intersects(flags) {
                let old_end = r.end;
                let old_mask = r.protection;
                let birth = r.birth_time;
                let name = r.name.clone();
                store.get_mut(key).expect("live key").end = start;
                store.insert_disjoint(Region::new(start, old_end, name, birth, old_mask));
            }
        }

        // First candidate: the smallest start >= `start`. The region
        // straddling `start` itself (if any) was already trimmed above.
        let mut key = match store.lookup_maxle(start) {
            Some(k) if store.get(k).expect("live key").start >= start => Some(k),
            Some(k) => store.succ_key(k),
            None => store.min_key(),
        };

        while let Some(r_key) = key {
            let r_start = store.get(r_key).expect("live key").start;
            if r_start >= end {
                break;
            }
            let next = store.succ_key(r_key);
            let (r_end, r_mask, tracked) = {
                let r = store.get(r_key).expect("live key");
                (r.end, r.protection, r.tracking.is_some())
            };

            if !tracked && r_mask.intersects(flags) {
                let new_mask = r_mask.difference(flags);
                if r_end > end {
                    let r = store.get(r_key).expect("live key");
                    let name = r.name.clone();
                    let birth = r.birth_time;
                    let tail = Region::new(end, r_end, name, birth, r_mask);
                    store.get_mut(r_key).expect("live key").end = end;
                    store.insert_disjoint(tail);
                }
                if new_mask.is_empty() {
                    store.remove(r_key);
                } else {
                    store.get_mut(r_key).expect("live key").protection = new_mask;
                }
            }

            key = next;
        }

        normalize_adjacency(store);
    }
}

/// Normalise adjacency: two touching regions with the same non-empty mask
/// never both survive. Re-checks the same key after a merge: absorbing a
/// successor can bring a third, equal-mask region into adjacency.
fn normalize_adjacency(store: &mut RegionStore) {
    let mut key = store.min_key();
    while let Some(r_key) = key {
        if merge_if_adjacent_equal(store, r_key) {
            continue;
        }
        key = store.succ_key(r_key);
    }
}

/// If the region at `key` is immediately adjacent to its successor and
/// both carry the same non-empty, non-tracked mask, merge them into one.
/// Returns whether a merge happened.
fn merge_if_adjacent_equal(store: &mut RegionStore, key: u64) -> bool {
    let Some(r) = store.get(key) else { return false };
    if r.tracking.is_some() {
        return false;
    }
    let (r_end, r_mask) = (r.end, r.protection);
    let Some(succ) = store.succ_key(key) else { return false };
    let s = store.get(succ).expect("live key");
    if s.tracking.is_some() {
        return false;
    }
    if s.start == r_end && s.protection == r_mask && !r_mask.is_empty() {
        absorb_succ(store, key, succ);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::EnabledKinds;
    use std::sync::Arc;

    fn engine() -> Engine {
        Engine::new(EnabledKinds::all(), false)
    }

    fn masks(e: &Engine) -> Vec<(u64, u64, u8)> {
        e.store().iter().map(|r| (r.start, r.end, r.protection.bits())).collect()
    }

    #[test]
    fn set_protection_on_empty_store_creates_one_region() {
        let mut e = engine();
        e.set_protection(0x1000, 0x10, Arc::from("x"), ProtFlags::FORBID_WRITE);
        assert_eq!(masks(&e), vec![(0x1000, 0x1010, ProtFlags::FORBID_WRITE.bits())]);
    }

    #[test]
    fn set_protection_merges_adjacent_equal_mask() {
        let mut e = engine();
        e.set_protection(0, 0x10, Arc::from("a"), ProtFlags::FORBID_WRITE);
        e.set_protection(0x10, 0x10, Arc::from("b"), ProtFlags::FORBID_WRITE);
        assert_eq!(masks(&e), vec![(0, 0x20, ProtFlags::FORBID_WRITE.bits())]);
    }

    #[test]
    fn set_protection_merges_adjacent_equal_mask_after_or_into_existing_region() {
        let mut e = engine();
        e.set_protection(16, 16, Arc::from("a"), ProtFlags::FORBID_READ | ProtFlags::FORBID_WRITE);
        e.set_protection(0, 16, Arc::from("b"), ProtFlags::FORBID_READ);
        e.set_protection(0, 16, Arc::from("b"), ProtFlags::FORBID_WRITE);
        assert_eq!(
            masks(&e),
            vec![(0, 32, (ProtFlags::FORBID_READ | ProtFlags::FORBID_WRITE).bits())]
        );
    }

    #[test]
    fn set_protection_advances_the_clock() {
        let mut e = engine();
        let before = e.clock_now();
        e.set_protection(0, 0x10, Arc::from("a"), ProtFlags::FORBID_WRITE);
        assert!(e.clock_now() > before);
    }

    #[test]
    fn clear_in_the_middle_splits_region_into_three() {
        let mut e = engine();
        e.set_protection(
            0x1000,
            0x1000,
            Arc::from("A"),
            ProtFlags::FORBID_READ | ProtFlags::FORBID_WRITE,
        );
        e.clear_protection(0x1400, 0x800, ProtFlags::FORBID_READ);

        assert_eq!(
            masks(&e),
            vec![
                (0x1000, 0x1400, (ProtFlags::FORBID_READ | ProtFlags::FORBID_WRITE).bits()),
                (0x1400, 0x1C00, ProtFlags::FORBID_WRITE.bits()),
                (0x1C00, 0x2000, (ProtFlags::FORBID_READ | ProtFlags::FORBID_WRITE).bits()),
            ]
        );
    }

    #[test]
    fn clear_protection_removes_region_when_mask_empties() {
        let mut e = engine();
        e.set_protection(0, 0x10, Arc::from("a"), ProtFlags::FORBID_WRITE);
        e.clear_protection(0, 0x10, ProtFlags::FORBID_WRITE);
        assert!(e.store().is_empty());
    }

    #[test]
    fn tracked_region_is_never_split_by_set_protection() {
        let mut e = engine();
        let mut r = Region::new(0x2000, 0x2010, Arc::from("w"), 0, ProtFlags::TRACK_WRITES);
        r.tracking = Some(crate::region::TrackState::new(8, 2, 3));
        e.store_mut().insert_nonoverlapping(r);

        e.set_protection(0x2004, 4, Arc::from("ignored"), ProtFlags::FORBID_WRITE);

        assert_eq!(e.store().len(), 1);
        let r = e.store().get(0x2000).unwrap();
        assert!(r.protection.contains(ProtFlags::FORBID_WRITE));
        assert!(r.protection.contains(ProtFlags::TRACK_WRITES));
        assert_eq!(r.end, 0x2010);
    }

    #[test]
    fn tracked_region_is_untouched_by_clear_protection() {
        let mut e = engine();
        let mut r = Region::new(
            0x2000,
            0x2010,
            Arc::from("w"),
            0,
            ProtFlags::TRACK_WRITES | ProtFlags::FORBID_WRITE,
        );
        r.tracking = Some(crate::region::TrackState::new(8, 2, 3));
        e.store_mut().insert_nonoverlapping(r);

        e.clear_protection(0x2000, 0x10, ProtFlags::FORBID_WRITE);

        let r = e.store().get(0x2000).unwrap();
        assert!(r.protection.contains(ProtFlags::FORBID_WRITE));
        assert!(r.protection.contains(ProtFlags::TRACK_WRITES));
    }
}
