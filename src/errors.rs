//! Error types for the checked, bring-up and host-model paths.
//!
//! The trap stubs themselves never produce an error value: a hardware fault
//! ends in the fail-stop handler and caller contract violations are not
//! checked at runtime. The types here cover everything that runs outside that
//! window: checked context construction, hook registration and the host model
//! of the core, which reports the fault classes that real hardware would
//! escalate to HardFault.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for architecture-layer operations.
pub type ArchResult<T> = Result<T, ArchError>;

/// Top-level error type of the architecture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchError {
    /// Context record construction errors
    Context(ContextError),
    /// Faults that escalate to HardFault on this profile
    Fault(FaultError),
    /// One-time registration errors
    Registration(RegistrationError),
}

/// Errors detected by the checked context initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// Stack pointer lies below the stack limit
    InvalidStackBounds { sp: u32, limit: u32 },
    /// Stack pointer or limit is not 8-byte aligned
    MisalignedStack(u32),
    /// Stack pointer is zero
    NullStack,
}

/// Fault classes. On Armv8-M Baseline all of them escalate to HardFault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// A stack push would cross the active stack limit register
    StackOverflow { sp: u32, limit: u32 },
    /// Access outside of mapped memory, or an unaligned word access
    BusFault(u32),
    /// Exception return through an illegal EXC_RETURN encoding
    InvalidExcReturn(u32),
    /// The core is halted in the fault handler
    Halted,
}

/// Errors from one-time hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    SchedulerAlreadySet,
    DispatcherAlreadySet,
    LogSinkAlreadySet,
}

impl fmt::Display for ArchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchError::Context(e) => write!(f, "Context error: {}", e),
            ArchError::Fault(e) => write!(f, "Fault: {}", e),
            ArchError::Registration(e) => write!(f, "Registration error: {}", e),
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::InvalidStackBounds { sp, limit } => {
                write!(f, "stack pointer {:#010x} below stack limit {:#010x}", sp, limit)
            }
            ContextError::MisalignedStack(addr) => {
                write!(f, "stack address {:#010x} is not 8-byte aligned", addr)
            }
            ContextError::NullStack => write!(f, "stack pointer is null"),
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultError::StackOverflow { sp, limit } => {
                write!(f, "stack overflow: {:#010x} below limit {:#010x}", sp, limit)
            }
            FaultError::BusFault(addr) => write!(f, "bus fault at {:#010x}", addr),
            FaultError::InvalidExcReturn(value) => {
                write!(f, "invalid EXC_RETURN value {:#010x}", value)
            }
            FaultError::Halted => write!(f, "core halted in HardFault"),
        }
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::SchedulerAlreadySet => write!(f, "scheduler already registered"),
            RegistrationError::DispatcherAlreadySet => write!(f, "dispatcher already registered"),
            RegistrationError::LogSinkAlreadySet => write!(f, "log sink already registered"),
        }
    }
}

impl From<ContextError> for ArchError {
    fn from(error: ContextError) -> Self {
        ArchError::Context(error)
    }
}

impl From<FaultError> for ArchError {
    fn from(error: FaultError) -> Self {
        ArchError::Fault(error)
    }
}

impl From<RegistrationError> for ArchError {
    fn from(error: RegistrationError) -> Self {
        ArchError::Registration(error)
    }
}

impl ArchError {
    /// Whether this error leaves the core in the fail-stop state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArchError::Fault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display_includes_addresses() {
        let err: ArchError = ContextError::InvalidStackBounds { sp: 0x100, limit: 0x200 }.into();
        assert_eq!(
            err.to_string(),
            "Context error: stack pointer 0x00000100 below stack limit 0x00000200"
        );

        let err: ArchError = FaultError::BusFault(0x2000_0004).into();
        assert_eq!(err.to_string(), "Fault: bus fault at 0x20000004");
    }

    #[test]
    fn test_only_faults_are_fatal() {
        assert!(ArchError::from(FaultError::Halted).is_fatal());
        assert!(!ArchError::from(ContextError::NullStack).is_fatal());
        assert!(!ArchError::from(RegistrationError::SchedulerAlreadySet).is_fatal());
    }
}
