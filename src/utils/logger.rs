//! Logging utilities
//!
//! Installs the global tracing subscriber for the binary.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
        }
    }

    /// Level for the `--verbose` and `--quiet` flags
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            LogLevel::Debug
        } else if quiet {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }

    fn directive(self) -> String {
        format!("prompt_bench={}", self.to_tracing_level())
    }
}

/// Initialize the logger with specified level. `RUST_LOG` takes precedence.
pub fn init_logger(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_flags() {
        assert_eq!(LogLevel::from_flags(true, true), LogLevel::Debug);
        assert_eq!(LogLevel::from_flags(false, true), LogLevel::Warn);
        assert_eq!(LogLevel::from_flags(false, false), LogLevel::Info);
    }

    #[test]
    fn test_directive() {
        assert_eq!(LogLevel::Debug.directive(), "prompt_bench=DEBUG");
    }
}
