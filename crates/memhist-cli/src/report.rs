//! Shutdown report printer: walks the store in ascending key order,
//! printing a tracking dump for every `TRACK_WRITES` region and a one-line
//! summary for every region carrying protection flags.

use std::fmt::Write as _;

use memhist_core::{Engine, ProtFlags};

fn format_data(value: u64, word_size: u8) -> String {
    match word_size {
        1 => format!("0x{:02x}", value as u8),
        2 => format!("0x{:04x}", value as u16),
        4 => format!("0x{:08x}", value as u32),
        _ => format!("0x{value:016x}"),
    }
}

fn format_protection(mask: ProtFlags) -> String {
    let mut parts = Vec::new();
    if mask.contains(ProtFlags::FORBID_READ) {
        parts.push("R");
    }
    if mask.contains(ProtFlags::FORBID_WRITE) {
        parts.push("W");
    }
    if mask.contains(ProtFlags::FORBID_EXEC) {
        parts.push("X");
    }
    if mask.contains(ProtFlags::TRACK_WRITES) {
        parts.push("TRACK");
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join("|")
    }
}

/// Render the full shutdown report as a string.
#[must_use]
pub fn render(engine: &Engine) -> String {
    let mut out = String::new();
    for region in engine.store().iter() {
        if let Some(track) = &region.tracking {
            let _ = writeln!(
                out,
                "region \"{}\" [0x{:x}, 0x{:x}) word_size={} history={} birth={}",
                region.name, region.start, region.end, track.word_size, track.history_depth, region.birth_time
            );
            for w in 0..track.word_count {
                let samples: Vec<_> = track.history(w).collect();
                if samples.is_empty() {
                    let _ = writeln!(out, "  word {w}: not written");
                } else {
                    let rendered: Vec<String> = samples
                        .iter()
                        .map(|e| {
                            format!(
                                "[{} @ t={}] {}",
                                e.call_stack.as_deref().unwrap_or("?"),
                                e.timestamp,
                                format_data(e.data, track.word_size)
                            )
                        })
                        .collect();
                    let _ = writeln!(out, "  word {w}: {}", rendered.join(", "));
                }
            }
        }

        if !region.protection.is_empty() {
            let _ = writeln!(
                out,
                "protect \"{}\" [0x{:x}, 0x{:x}) {}",
                region.name,
                region.start,
                region.end,
                format_protection(region.protection)
            );
        }
    }
    out
}
