//! A line-oriented trace format for replaying a session through the engine
//! without a live host instrumentation framework attached. Each line is one
//! event, whitespace-separated, `#`-comments and blank lines ignored.
//!
//! ```text
//! track   <addr> <size> <word_size> <history_depth> <name>
//! untrack <addr> <size>
//! enable  <addr> <size>
//! disable <addr> <size>
//! protect <addr> <size> <name> <RWX subset>
//! clear   <addr> <size> <RWX subset>
//! read    <addr> <size> [ctx]
//! write   <addr> <size> <data_hex> [ctx]
//! exec    <addr> <len> [ctx]
//! cas     <addr> <size> <current_hex> <expected_hex> <data_hex> [ctx]
//! ```

use memhist_core::{CallContext, ClientRequest, EnabledKinds, ProtFlags};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(ClientRequest),
    Read { addr: u64, size: u64, ctx: CallContext },
    Write { addr: u64, size: u64, data: u64, ctx: CallContext },
    Exec { addr: u64, len: u64, ctx: CallContext },
    Cas { addr: u64, size: u64, current: u64, expected: u64, data: u64, ctx: CallContext },
}

/// A malformed trace line: parsing is the one recoverable error path.
#[derive(Debug)]
pub struct TraceError {
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for TraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trace line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for TraceError {}

fn bad(line: usize, reason: impl Into<String>) -> TraceError {
    TraceError { line, reason: reason.into() }
}

fn field<'a>(fields: &[&'a str], i: usize, line: usize, what: &str) -> Result<&'a str, TraceError> {
    fields.get(i).copied().ok_or_else(|| bad(line, format!("missing {what}")))
}

fn parse_u64(s: &str, line: usize, what: &str) -> Result<u64, TraceError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|_| bad(line, format!("'{s}' is not a valid {what}")))
}

fn parse_flags(s: &str, line: usize) -> Result<ProtFlags, TraceError> {
    let kinds = EnabledKinds::parse(s).map_err(|e| bad(line, e.to_string()))?;
    let mut flags = ProtFlags::EMPTY;
    if kinds.reads_enabled() {
        flags = flags.union(ProtFlags::FORBID_READ);
    }
    if kinds.writes_enabled() {
        flags = flags.union(ProtFlags::FORBID_WRITE);
    }
    if kinds.execs_enabled() {
        flags = flags.union(ProtFlags::FORBID_EXEC);
    }
    Ok(flags)
}

/// Parse an entire trace, failing at the first malformed line.
pub fn parse(text: &str) -> Result<Vec<Event>, TraceError> {
    let mut events = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let op = field(&fields, 0, line_no, "operation")?;
        let event = match op {
            "track" => Event::Request(ClientRequest::TrackMemWrite {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                word_size: u8::try_from(parse_u64(field(&fields, 3, line_no, "word_size")?, line_no, "word_size")?)
                    .map_err(|_| bad(line_no, "word_size out of range"))?,
                history_depth: u32::try_from(parse_u64(
                    field(&fields, 4, line_no, "history_depth")?,
                    line_no,
                    "history_depth",
                )?)
                .map_err(|_| bad(line_no, "history_depth out of range"))?,
                name: field(&fields, 5, line_no, "name")?.into(),
            }),
            "untrack" => Event::Request(ClientRequest::UntrackMemWrite {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
            }),
            "enable" => Event::Request(ClientRequest::TrackEnable {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
            }),
            "disable" => Event::Request(ClientRequest::TrackDisable {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
            }),
            "protect" => Event::Request(ClientRequest::SetProtection {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                name: field(&fields, 3, line_no, "name")?.into(),
                flags: parse_flags(field(&fields, 4, line_no, "flags")?, line_no)?,
            }),
            "clear" => Event::Request(ClientRequest::ClearProtection {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                flags: parse_flags(field(&fields, 3, line_no, "flags")?, line_no)?,
            }),
            "read" => Event::Read {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                ctx: fields.get(3).copied().unwrap_or("trace").into(),
            },
            "write" => Event::Write {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                data: parse_u64(field(&fields, 3, line_no, "data")?, line_no, "data")?,
                ctx: fields.get(4).copied().unwrap_or("trace").into(),
            },
            "exec" => Event::Exec {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                len: parse_u64(field(&fields, 2, line_no, "len")?, line_no, "len")?,
                ctx: fields.get(3).copied().unwrap_or("trace").into(),
            },
            "cas" => Event::Cas {
                addr: parse_u64(field(&fields, 1, line_no, "addr")?, line_no, "addr")?,
                size: parse_u64(field(&fields, 2, line_no, "size")?, line_no, "size")?,
                current: parse_u64(field(&fields, 3, line_no, "current")?, line_no, "current")?,
                expected: parse_u64(field(&fields, 4, line_no, "expected")?, line_no, "expected")?,
                data: parse_u64(field(&fields, 5, line_no, "data")?, line_no, "data")?,
                ctx: fields.get(6).copied().unwrap_or("trace").into(),
            },
            other => return Err(bad(line_no, format!("unknown operation '{other}'"))),
        };
        events.push(event);
    }
    Ok(events)
}
