//! Region engine: an ordered interval store with protection-flag
//! enforcement and a bounded per-word write-history ring.
//!
//! This crate has no dependency on the host instrumentation framework; it
//! is driven entirely through [`Engine`]'s public methods, fed by whatever
//! front-end decodes guest events (see the `memhist-ir` and `memhist-cli`
//! crates in this workspace).

mod clock;
mod dispatch;
mod engine;
mod flags;
mod protection;
mod region;
mod request;
mod store;

pub use clock::LogicalClock;
pub use dispatch::{AccessKind, AccessOutcome};
pub use engine::Engine;
pub use flags::{EnabledKinds, InvalidEnabledKinds, ProtFlags};
pub use region::{CallContext, HistoryEntry, Region, TrackState};
pub use request::{ClientRequest, RequestOutcome};
pub use store::RegionStore;
