//! Diagnostic logging for bring-up and host-model paths.
//!
//! Lines are routed to a single sink registered once during bring-up (a UART
//! or semihosting writer on hardware, a capture buffer in tests). Without a
//! sink every macro is silent.
//!
//! # Features
//!
//! - `no_logs`: compile every log line out of the binary
//! - `log_trace`: enable `arch_trace!` lines
//!
//! The trap stubs and the fault handler never log.

use core::fmt;

use crate::errors::{ArchResult, RegistrationError};

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Trace,
}

impl Level {
    /// Fixed-width line prefix for this level.
    pub const fn prefix(self) -> &'static str {
        match self {
            Level::Error => "[ERRO] ",
            Level::Warn => "[WARN] ",
            Level::Info => "[INFO] ",
            Level::Trace => "[TRAC] ",
        }
    }
}

/// Destination for log lines.
pub trait LogSink: Sync {
    /// Write one complete line. `args` carries no trailing newline.
    fn log(&self, level: Level, args: fmt::Arguments<'_>);
}

static SINK: spin::Once<&'static dyn LogSink> = spin::Once::new();

/// Register the log sink. Only the first registration takes effect.
pub fn set_sink(sink: &'static dyn LogSink) -> ArchResult<()> {
    let mut installed = false;
    SINK.call_once(|| {
        installed = true;
        sink
    });
    if installed {
        Ok(())
    } else {
        Err(RegistrationError::LogSinkAlreadySet.into())
    }
}

/// Forward one line to the registered sink, if any.
#[doc(hidden)]
pub fn emit(level: Level, args: fmt::Arguments<'_>) {
    if let Some(sink) = SINK.get() {
        sink.log(level, args);
    }
}

/// Log an error line.
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! arch_error {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::Level::Error, format_args!($($arg)*))
    };
}

/// Log a warning line.
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! arch_warn {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::Level::Warn, format_args!($($arg)*))
    };
}

/// Log an informational line.
#[cfg(not(feature = "no_logs"))]
#[macro_export]
macro_rules! arch_info {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::Level::Info, format_args!($($arg)*))
    };
}

/// Log a trace line (feature `log_trace`).
#[cfg(all(feature = "log_trace", not(feature = "no_logs")))]
#[macro_export]
macro_rules! arch_trace {
    ($($arg:tt)*) => {
        $crate::log::emit($crate::log::Level::Trace, format_args!($($arg)*))
    };
}

// Disabled variants still type-check their arguments so that builds with and
// without logging accept the same call sites.

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! arch_error {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit($crate::log::Level::Error, format_args!($($arg)*))
        }
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! arch_warn {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit($crate::log::Level::Warn, format_args!($($arg)*))
        }
    };
}

#[cfg(feature = "no_logs")]
#[macro_export]
macro_rules! arch_info {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit($crate::log::Level::Info, format_args!($($arg)*))
        }
    };
}

#[cfg(any(not(feature = "log_trace"), feature = "no_logs"))]
#[macro_export]
macro_rules! arch_trace {
    ($($arg:tt)*) => {
        if false {
            $crate::log::emit($crate::log::Level::Trace, format_args!($($arg)*))
        }
    };
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ArchError;

    #[test]
    fn test_level_prefixes_are_fixed_width() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Trace] {
            assert_eq!(level.prefix().len(), 7);
        }
    }

    #[cfg(not(feature = "no_logs"))]
    #[test]
    fn test_lines_reach_registered_sink() {
        let capture = capture::install();
        crate::arch_info!("psp={:#x}", 0x2000_1000u32);
        assert!(capture.contains("[INFO] psp=0x20001000"));
    }

    #[test]
    fn test_second_sink_is_rejected() {
        let _ = capture::install();
        static OTHER: capture::CaptureSink = capture::CaptureSink::new();
        assert_eq!(
            set_sink(&OTHER),
            Err(ArchError::Registration(RegistrationError::LogSinkAlreadySet))
        );
    }
}
