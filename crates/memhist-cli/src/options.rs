//! Command-line surface: `--trace-mem=yes|no`, `--enable-tracking=<RWX subset>`.

use memhist_core::{EnabledKinds, InvalidEnabledKinds};

#[derive(Debug, Clone)]
pub struct Options {
    pub trace_mem: bool,
    pub enable_tracking: EnabledKinds,
    pub trace_path: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            trace_mem: false,
            enable_tracking: EnabledKinds::parse("RW").expect("literal is valid"),
            trace_path: None,
        }
    }
}

#[derive(Debug)]
pub enum OptionsError {
    InvalidTraceMem(String),
    InvalidEnabledKinds(InvalidEnabledKinds),
    UnrecognisedFlag(String),
}

impl std::fmt::Display for OptionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTraceMem(v) => write!(f, "--trace-mem expects yes|no, got '{v}'"),
            Self::InvalidEnabledKinds(e) => write!(f, "--enable-tracking: {e}"),
            Self::UnrecognisedFlag(flag) => write!(f, "unrecognised flag '{flag}'"),
        }
    }
}

impl std::error::Error for OptionsError {}

impl Options {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, OptionsError> {
        let mut opts = Self::default();
        for arg in args {
            if let Some(value) = arg.strip_prefix("--trace-mem=") {
                opts.trace_mem = match value {
                    "yes" => true,
                    "no" => false,
                    other => return Err(OptionsError::InvalidTraceMem(other.to_string())),
                };
            } else if let Some(value) = arg.strip_prefix("--enable-tracking=") {
                opts.enable_tracking = EnabledKinds::parse(value).map_err(OptionsError::InvalidEnabledKinds)?;
            } else if let Some(flag) = arg.strip_prefix("--") {
                return Err(OptionsError::UnrecognisedFlag(flag.to_string()));
            } else {
                opts.trace_path = Some(arg);
            }
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_enable_read_and_write_only() {
        let opts = Options::default();
        assert!(opts.enable_tracking.reads_enabled());
        assert!(opts.enable_tracking.writes_enabled());
        assert!(!opts.enable_tracking.execs_enabled());
        assert!(!opts.trace_mem);
    }

    #[test]
    fn parses_trace_mem_and_enable_tracking() {
        let opts = Options::parse(args(&["--trace-mem=yes", "--enable-tracking=rwx", "trace.txt"])).unwrap();
        assert!(opts.trace_mem);
        assert!(opts.enable_tracking.execs_enabled());
        assert_eq!(opts.trace_path.as_deref(), Some("trace.txt"));
    }

    #[test]
    fn rejects_bad_trace_mem_value() {
        assert!(Options::parse(args(&["--trace-mem=maybe"])).is_err());
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(Options::parse(args(&["--bogus"])).is_err());
    }
}
