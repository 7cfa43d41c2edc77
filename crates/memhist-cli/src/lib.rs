//! Command-line front end for the region engine: trace replay, raw
//! client-request decoding, and the shutdown report printer.

mod options;
mod protocol;
mod report;
mod trace;

pub use options::{Options, OptionsError};
pub use protocol::{decode as decode_request, UnknownRequestCode};
pub use report::render as render_report;
pub use trace::{parse as parse_trace, Event, TraceError};

use memhist_core::Engine;
use memhist_ir::{instrument_block, BlockOutcome, Stmt};

/// Replay a parsed trace against a fresh engine, logging each fault (and,
/// if `engine.trace_mem()`, every recorded write) to `log`. Returns the
/// engine so the caller can render the shutdown report.
pub fn replay(events: &[Event], opts: &Options) -> Engine {
    let mut engine = Engine::new(opts.enable_tracking, opts.trace_mem);
    for event in events {
        match event {
            Event::Request(req) => {
                engine.handle_request(req.clone());
            }
            Event::Read { addr, size, ctx } => {
                run_stmt(&mut engine, ctx.clone(), Stmt::WrTmpLoad { addr: *addr, size: size_u32(*size) });
            }
            Event::Write { addr, size, data, ctx } => {
                run_stmt(
                    &mut engine,
                    ctx.clone(),
                    Stmt::Store { addr: *addr, size: size_u32(*size), data: *data },
                );
            }
            Event::Exec { addr, len, ctx } => {
                run_stmt(&mut engine, ctx.clone(), Stmt::IMark { addr: *addr, len: size_u32(*len) });
            }
            Event::Cas { addr, size, current, expected, data, ctx } => {
                run_stmt(
                    &mut engine,
                    ctx.clone(),
                    Stmt::Cas {
                        addr: *addr,
                        size: size_u32(*size),
                        width: memhist_ir::CasWidth::Single { current: *current, expected: *expected, data: *data },
                    },
                );
            }
        }
    }
    engine
}

fn size_u32(size: u64) -> u32 {
    u32::try_from(size).unwrap_or(u32::MAX)
}

fn run_stmt(engine: &mut Engine, ctx: memhist_core::CallContext, stmt: Stmt) {
    if let BlockOutcome::Aborted { .. } = instrument_block(engine, &ctx, std::slice::from_ref(&stmt)) {
        if engine.trace_mem() {
            eprintln!("memhist: access fault at {stmt:?}");
        }
    }
}
