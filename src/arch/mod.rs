//! Architecture layer: trap stubs, context records and exception setup.
//!
//! Everything above the register-transfer boundary is ordinary Rust over
//! [`ArchContext`] and [`SwitchFrame`]; the naked trap stubs live in the
//! Armv8-M Baseline backend. On any target other than bare-metal Arm the
//! backend is replaced by a host stand-in and the [`sim`] core model.

/// Architecture abstraction trait.
///
/// The same bring-up sequence runs on every profile; operations a profile
/// has no hardware for are no-ops there.
pub trait Arch {
    /// Per-thread saved context.
    type SavedContext: Send + Sync + Default;

    /// Context of a new thread whose stack spans `[sp_limit, sp)`.
    ///
    /// The thread resumes in thread mode on the process stack. Requires
    /// `sp >= sp_limit`.
    fn init_context(sp: u32, sp_limit: u32) -> Self::SavedContext;

    /// Make secure exceptions preempt non-secure ones (AIRCR.PRIS).
    fn prioritize_secure_exceptions();

    /// SVCall highest, PendSV lowest.
    fn configure_exception_priorities();

    /// Configure coprocessor access.
    fn configure_coprocessors();

    /// Clear the floating-point context active state.
    fn clear_fp_status();

    /// Pend the context-switch exception.
    fn request_context_switch();
}

/// Run the one-time exception configuration.
///
/// Call once during bring-up, before non-secure code can run and before
/// PendSV or SVC can be taken.
pub fn bring_up<A: Arch>() {
    A::prioritize_secure_exceptions();
    A::configure_exception_priorities();
    A::configure_coprocessors();
    A::clear_fp_status();
    crate::arch_info!("exception configuration complete");
}

pub mod barriers;
pub mod context;
pub mod coproc;
pub mod exc_return;
pub mod fault;
pub mod scb;
pub mod trap;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod v8m_base;
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
#[path = "v8m_base_stub.rs"]
pub mod v8m_base;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod sim;

pub use context::{ArchContext, CalleeSaved, ExceptionFrame, SwitchFrame};
pub use exc_return::ExcReturn;
pub use v8m_base::V8mBaseArch as DefaultArch;

#[cfg(all(target_os = "none", not(target_arch = "arm")))]
compile_error!("Only Armv8-M Baseline is supported on bare metal. Build for thumbv8m.base-none-eabi, or for the host to use the core model.");
