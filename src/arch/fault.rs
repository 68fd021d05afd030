//! Fault containment.
//!
//! Baseline has no SecureFault: every fault condition, including the ones a
//! Mainline core would report as SecureFault, escalates to HardFault, and
//! there is no way to tell a direct HardFault from an escalated one. A
//! HardFault may therefore mean corrupted secure state. Returning from it
//! could let a pending non-secure exception run, so the handler never returns.

/// Fault state of the core. There is no transition out of `Halted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultState {
    #[default]
    Running,
    Halted,
}

impl FaultState {
    /// State after a fault has been taken.
    #[inline]
    pub const fn escalate(self) -> Self {
        FaultState::Halted
    }

    #[inline]
    pub const fn is_halted(self) -> bool {
        matches!(self, FaultState::Halted)
    }
}

/// Stop executing forever.
///
/// Does not inspect the stacked frame, touch any register, or log.
#[inline(always)]
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
