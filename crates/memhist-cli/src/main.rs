//! memhist: a Valgrind-style memory-access instrumentation tool.
//!
//! Usage: memhist [--trace-mem=yes|no] [--enable-tracking=<RWX subset>] <trace-file>

use std::fs;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let opts = match memhist_cli::Options::parse(args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("memhist: {e}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let Some(path) = &opts.trace_path else {
        eprintln!("memhist: no trace file given");
        print_usage();
        return ExitCode::FAILURE;
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("memhist: failed to read '{path}': {e}");
            return ExitCode::FAILURE;
        }
    };

    let events = match memhist_cli::parse_trace(&text) {
        Ok(events) => events,
        Err(e) => {
            eprintln!("memhist: {e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = memhist_cli::replay(&events, &opts);
    print!("{}", memhist_cli::render_report(&engine));
    ExitCode::SUCCESS
}

fn print_usage() {
    eprintln!("Usage: memhist [--trace-mem=yes|no] [--enable-tracking=<RWX subset>] <trace-file>");
}
