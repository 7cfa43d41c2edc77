//! Region entries: the unit the interval store keys on.

use std::sync::Arc;

use crate::flags::ProtFlags;

/// Opaque reference to a captured call stack, supplied by the host
/// framework for each event. Borrowed in the original tool; here it is
/// simply an owned, cheaply-cloned label, since this crate has no guest
/// address space to borrow from: there is no guest code translation or
/// guest memory simulation in scope.
pub type CallContext = Arc<str>;

/// One sample in a word's write-history ring.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryEntry {
    pub call_stack: Option<CallContext>,
    pub timestamp: u32,
    pub data: u64,
}

/// Per-word write-history state for a `TRACK_WRITES` region.
#[derive(Debug, Clone)]
pub struct TrackState {
    pub word_size: u8,
    pub word_count: u32,
    pub history_depth: u32,
    /// Next slot to write for each word; `head[w] - 1` (mod depth) is the
    /// most recently written slot.
    head: Vec<u32>,
    /// Row-major `word_count x history_depth`: `matrix[w * history_depth + slot]`.
    matrix: Vec<HistoryEntry>,
}

impl TrackState {
    #[must_use]
    pub fn new(word_size: u8, word_count: u32, history_depth: u32) -> Self {
        Self {
            word_size,
            word_count,
            history_depth,
            head: vec![0; word_count as usize],
            matrix: vec![HistoryEntry::default(); (word_count * history_depth) as usize],
        }
    }

    /// Record one sample for word `w`, advancing its ring head.
    pub fn push(&mut self, w: u32, entry: HistoryEntry) {
        let depth = self.history_depth;
        let slot = self.head[w as usize];
        self.head[w as usize] = (slot + 1) % depth;
        let idx = (w * depth + slot) as usize;
        self.matrix[idx] = entry;
    }

    /// Samples for word `w`, newest first, stopping at the first never-written cell.
    pub fn history(&self, w: u32) -> impl Iterator<Item = &HistoryEntry> {
        let depth = self.history_depth;
        let head = self.head[w as usize];
        (0..depth)
            .map(move |i| {
                let slot = (head + depth - 1 - i) % depth;
                &self.matrix[(w * depth + slot) as usize]
            })
            .take_while(|e| e.call_stack.is_some())
    }
}

/// A half-open byte range `[start, end)` with a protection mask and an
/// optional write-history ring.
#[derive(Debug, Clone)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub name: Arc<str>,
    pub birth_time: u32,
    pub enabled: bool,
    pub protection: ProtFlags,
    pub tracking: Option<TrackState>,
}

impl Region {
    #[must_use]
    pub fn new(start: u64, end: u64, name: Arc<str>, birth_time: u32, protection: ProtFlags) -> Self {
        Self {
            start,
            end,
            name,
            birth_time,
            enabled: true,
            protection,
            tracking: None,
        }
    }

    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_newest_first_and_stops_at_unwritten() {
        let mut t = TrackState::new(8, 2, 3);
        t.push(
            0,
            HistoryEntry {
                call_stack: Some(Arc::from("a")),
                timestamp: 1,
                data: 10,
            },
        );
        t.push(
            0,
            HistoryEntry {
                call_stack: Some(Arc::from("b")),
                timestamp: 2,
                data: 20,
            },
        );
        let samples: Vec<_> = t.history(0).map(|e| e.data).collect();
        assert_eq!(samples, vec![20, 10]);
        assert_eq!(t.history(1).count(), 0);
    }

    #[test]
    fn ring_wraps_after_depth_writes() {
        let mut t = TrackState::new(8, 1, 3);
        for v in 1..=5u64 {
            t.push(
                0,
                HistoryEntry {
                    call_stack: Some(Arc::from("ctx")),
                    timestamp: u32::try_from(v).unwrap(),
                    data: v,
                },
            );
        }
        let samples: Vec<_> = t.history(0).map(|e| e.data).collect();
        assert_eq!(samples, vec![5, 4, 3]);
    }
}
