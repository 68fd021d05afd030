#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unreachable_pub)]

//! Trap and context-switch layer of a secure partition manager on Armv8-M
//! Baseline (TrustZone-M).
//!
//! This crate owns the secure-state exception handlers of the SPM:
//!
//! - **PendSV** saves the suspended thread's callee-saved registers and stack
//!   bounds into a [`SwitchFrame`] and lets the scheduler pick the thread
//!   that resumes
//! - **SVCall** hands the caller's stacked arguments to the secure-service
//!   dispatcher, taken from whichever stack the caller was using
//! - **HardFault** stops the core for good
//!
//! and the bring-up step that makes secure exceptions preempt non-secure ones.
//!
//! # Target Platform
//!
//! - **Architecture**: Armv8-M Baseline with the Security Extension
//!   (`thumbv8m.base-none-eabi`, e.g. Cortex-M23)
//! - **Environment**: bare metal, secure state
//!
//! On any other target the hardware backend is replaced by a host model of
//! the core (see [`arch::sim`]), which the test suite runs against.
//!
//! # Features
//!
//! - `panic-halt`: fail-stop panic handler on bare metal (default)
//! - `no_logs`: compile out all log lines
//! - `log_trace`: enable trace-level log lines
//!
//! # Quick Start
//!
//! ```ignore
//! use spm_arch_v8m::{bring_up, register_scheduler, DefaultArch, SwitchFrame};
//!
//! static SCHEDULER: fn(&mut SwitchFrame) = |frame| {
//!     // save the current thread, load the next one
//! };
//!
//! fn spm_init() {
//!     register_scheduler(&SCHEDULER).unwrap();
//!     bring_up::<DefaultArch>();
//! }
//! ```
//!
//! Scheduling policy, service dispatch, thread creation and memory isolation
//! are provided by the caller through the hooks in [`arch::trap`].

pub mod arch;
pub mod errors;
pub mod log;

#[cfg(test)]
mod tests;

#[cfg(test)]
extern crate std;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
extern crate alloc;

#[cfg(all(target_arch = "arm", target_os = "none", feature = "panic-halt"))]
use core::panic::PanicInfo;

#[cfg(all(target_arch = "arm", target_os = "none", feature = "panic-halt"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    cortex_m::interrupt::disable();
    arch::fault::halt()
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{bring_up, Arch, DefaultArch};

// Context records and frames
pub use arch::{ArchContext, CalleeSaved, ExcReturn, ExceptionFrame, SwitchFrame};

// Trap hooks
pub use arch::trap::{
    register_dispatcher, register_scheduler, trap_counts, ServiceDispatcher, SwitchScheduler,
    TrapCounts,
};

// Errors
pub use errors::{ArchError, ArchResult, ContextError, FaultError, RegistrationError};

// ============================================================================
// Convenience Functions
// ============================================================================

/// Context of a new thread whose stack spans `[sp_limit, sp)`.
#[inline]
pub fn init_context(sp: u32, sp_limit: u32) -> ArchContext {
    DefaultArch::init_context(sp, sp_limit)
}

/// Ask for a context switch once no higher-priority exception is active.
#[inline]
pub fn request_context_switch() {
    DefaultArch::request_context_switch();
}
