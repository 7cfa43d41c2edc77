//! Instrumentation shim: converts the IR statements of one guest
//! basic block into a sequence of calls against the region engine.
//!
//! This crate knows nothing about any particular guest architecture or IR
//! format — [`Stmt`] is a minimal, host-supplied description of the
//! memory-relevant shape of a basic block, and [`instrument_block`] is the
//! only entry point a host front-end needs to drive.

use memhist_core::{AccessKind, CallContext, Engine};

/// The memory effect of a dirty helper call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemEffect {
    None,
    Read,
    Write,
    Modify,
}

impl MemEffect {
    const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::Modify)
    }

    const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::Modify)
    }
}

/// A compare-and-swap's operand width, single-word or doubleword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasWidth {
    Single { current: u64, expected: u64, data: u64 },
    /// A doubleword CAS concatenates `(hi, lo)` into one value twice `size`
    /// wide, with `hi` occupying the high half.
    Doubleword { current_hi: u64, current_lo: u64, expected_hi: u64, expected_lo: u64, data_hi: u64, data_lo: u64 },
}

impl CasWidth {
    fn widen(self, size: u32) -> (u32, u64, u64, u64) {
        match self {
            Self::Single { current, expected, data } => (size, current, expected, data),
            Self::Doubleword { current_hi, current_lo, expected_hi, expected_lo, data_hi, data_lo } => {
                let shift = size * 8;
                (
                    size * 2,
                    (current_hi << shift) | current_lo,
                    (expected_hi << shift) | expected_lo,
                    (data_hi << shift) | data_lo,
                )
            }
        }
    }
}

/// One memory-relevant IR statement of a guest basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stmt {
    /// Instruction marker: the start of a new guest instruction.
    IMark { addr: u64, len: u32 },
    /// A temp assigned from a `Load` expression.
    WrTmpLoad { addr: u64, size: u32 },
    /// A `Store` statement.
    Store { addr: u64, size: u32, data: u64 },
    /// A dirty helper call with a declared memory effect.
    DirtyHelper { effect: MemEffect, addr: u64, size: u32, data: Option<u64> },
    /// A compare-and-swap.
    Cas { addr: u64, size: u32, width: CasWidth },
    /// Load-linked.
    Ll { addr: u64, size: u32 },
    /// Store-conditional, modelled as an unconditional write.
    Sc { addr: u64, size: u32, data: u64 },
    /// Anything with no memory effect of interest: `PutI`, `AbiHint`, a
    /// memory barrier, `NoOp`. Passed through unchanged.
    PassThrough,
}

/// Result of instrumenting one basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Every statement ran; the block falls through normally.
    Completed,
    /// A statement faulted; the shim branched to the SIGSEGV exit at this
    /// statement index and the remainder of the block never ran.
    Aborted { at: usize },
}

/// Drive `stmts` through `engine`, short-circuiting on the first violation:
/// the callback's one-bit fault flag aborts the block.
pub fn instrument_block(engine: &mut Engine, ctx: &CallContext, stmts: &[Stmt]) -> BlockOutcome {
    for (i, stmt) in stmts.iter().enumerate() {
        let faulted = match *stmt {
            Stmt::IMark { addr, len } => {
                engine.enabled_kinds().execs_enabled()
                    && engine.on_access(ctx.clone(), AccessKind::Exec, addr, len, None).is_fault()
            }
            Stmt::WrTmpLoad { addr, size } => {
                engine.enabled_kinds().reads_enabled()
                    && engine.on_access(ctx.clone(), AccessKind::Read, addr, size, None).is_fault()
            }
            Stmt::Store { addr, size, data } => {
                engine.enabled_kinds().writes_enabled()
                    && engine.on_access(ctx.clone(), AccessKind::Write, addr, size, Some(data)).is_fault()
            }
            Stmt::DirtyHelper { effect, addr, size, data } => {
                let mut faulted = false;
                if effect.reads() && engine.enabled_kinds().reads_enabled() {
                    faulted |= engine.on_access(ctx.clone(), AccessKind::Read, addr, size, None).is_fault();
                }
                if !faulted && effect.writes() && engine.enabled_kinds().writes_enabled() {
                    let data = data.expect("write-effect dirty helper must carry data");
                    faulted |= engine.on_access(ctx.clone(), AccessKind::Write, addr, size, Some(data)).is_fault();
                }
                faulted
            }
            Stmt::Cas { addr, size, width } => {
                let mut faulted = false;
                if engine.enabled_kinds().reads_enabled() {
                    faulted |= engine.on_access(ctx.clone(), AccessKind::Read, addr, size, None).is_fault();
                }
                if !faulted && engine.enabled_kinds().writes_enabled() {
                    let (cas_size, current, expected, data) = width.widen(size);
                    faulted |= engine.on_cas(ctx.clone(), addr, cas_size, current, expected, data).0.is_fault();
                }
                faulted
            }
            Stmt::Ll { addr, size } => {
                engine.enabled_kinds().reads_enabled()
                    && engine.on_access(ctx.clone(), AccessKind::Read, addr, size, None).is_fault()
            }
            Stmt::Sc { addr, size, data } => {
                engine.enabled_kinds().writes_enabled()
                    && engine.on_access(ctx.clone(), AccessKind::Write, addr, size, Some(data)).is_fault()
            }
            Stmt::PassThrough => false,
        };
        if faulted {
            return BlockOutcome::Aborted { at: i };
        }
    }
    BlockOutcome::Completed
}
