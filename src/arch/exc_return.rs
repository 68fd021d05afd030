//! EXC_RETURN encoding for Armv8-M with the Security Extension.
//!
//! On exception entry the hardware loads LR with an EXC_RETURN value that
//! records the interrupted state; branching to such a value in handler mode
//! performs the exception return. Bit layout:
//!
//! - bits 31:24 = 0xFF prefix
//! - bit 6 = S, secure stack frame
//! - bit 5 = DCRS, default callee register stacking
//! - bit 4 = FType, basic (no FP) frame
//! - bit 3 = Mode, return to thread mode
//! - bit 2 = SPSEL, return uses the process stack
//! - bit 0 = ES, exception was taken to secure state

use core::fmt;

/// Prefix identifying an EXC_RETURN value.
pub const EXC_RETURN_PREFIX: u32 = 0xFF00_0000;
/// Reserved bits 23:7, read as one.
pub const EXC_RETURN_RES1: u32 = 0x1FFFF << 7;
pub const EXC_RETURN_SECURE_STACK: u32 = 1 << 6;
pub const EXC_RETURN_DEFAULT_STACKING: u32 = 1 << 5;
pub const EXC_RETURN_BASIC_FRAME: u32 = 1 << 4;
pub const EXC_RETURN_MODE_THREAD: u32 = 1 << 3;
pub const EXC_RETURN_PROCESS_STACK: u32 = 1 << 2;
pub const EXC_RETURN_SECURE_EXCEPTION: u32 = 1 << 0;

const SECURE_BASIC: u32 = EXC_RETURN_PREFIX
    | EXC_RETURN_RES1
    | EXC_RETURN_SECURE_STACK
    | EXC_RETURN_DEFAULT_STACKING
    | EXC_RETURN_BASIC_FRAME
    | EXC_RETURN_SECURE_EXCEPTION;

/// A value loaded into LR on exception entry.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExcReturn(u32);

impl ExcReturn {
    /// Return to thread mode on the secure process stack.
    pub const THREAD_SECURE_PSP: Self =
        Self(SECURE_BASIC | EXC_RETURN_MODE_THREAD | EXC_RETURN_PROCESS_STACK);
    /// Return to thread mode on the secure main stack.
    pub const THREAD_SECURE_MSP: Self = Self(SECURE_BASIC | EXC_RETURN_MODE_THREAD);
    /// Return to handler mode (always the main stack).
    pub const HANDLER_SECURE: Self = Self(SECURE_BASIC);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the value carries the EXC_RETURN prefix, i.e. a `bx` to it
    /// performs an exception return rather than a plain branch.
    #[inline]
    pub const fn is_exc_return(self) -> bool {
        self.0 & EXC_RETURN_PREFIX == EXC_RETURN_PREFIX
    }

    /// Bit 2: the interrupted context was using the process stack.
    #[inline]
    pub const fn uses_process_stack(self) -> bool {
        self.0 & EXC_RETURN_PROCESS_STACK != 0
    }

    #[inline]
    pub const fn returns_to_thread(self) -> bool {
        self.0 & EXC_RETURN_MODE_THREAD != 0
    }

    #[inline]
    pub const fn secure_stack(self) -> bool {
        self.0 & EXC_RETURN_SECURE_STACK != 0
    }

    #[inline]
    pub const fn secure_exception(self) -> bool {
        self.0 & EXC_RETURN_SECURE_EXCEPTION != 0
    }
}

impl From<ExcReturn> for u32 {
    fn from(value: ExcReturn) -> Self {
        value.0
    }
}

impl fmt::Debug for ExcReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExcReturn({:#010x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architectural_values() {
        assert_eq!(ExcReturn::THREAD_SECURE_PSP.bits(), 0xFFFF_FFFD);
        assert_eq!(ExcReturn::THREAD_SECURE_MSP.bits(), 0xFFFF_FFF9);
        assert_eq!(ExcReturn::HANDLER_SECURE.bits(), 0xFFFF_FFF1);
    }

    #[test]
    fn test_thread_psp_decoding() {
        let exc = ExcReturn::THREAD_SECURE_PSP;
        assert!(exc.is_exc_return());
        assert!(exc.uses_process_stack());
        assert!(exc.returns_to_thread());
        assert!(exc.secure_stack());
        assert!(exc.secure_exception());
    }

    #[test]
    fn test_main_stack_values_clear_bit_two() {
        assert!(!ExcReturn::THREAD_SECURE_MSP.uses_process_stack());
        assert!(!ExcReturn::HANDLER_SECURE.uses_process_stack());
        assert!(!ExcReturn::HANDLER_SECURE.returns_to_thread());
    }

    #[test]
    fn test_plain_address_is_not_exc_return() {
        assert!(!ExcReturn::from_bits(0x1000_0401).is_exc_return());
        assert!(!ExcReturn::from_bits(0xFE00_0000).is_exc_return());
    }
}
