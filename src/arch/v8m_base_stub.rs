//! Host stand-in for the Armv8-M Baseline backend.
//!
//! Same interface as the hardware backend. SCB accesses go to a process-wide
//! [`SimScb`]; there are no trap stubs.

use super::barriers::MemoryBarriers;
use super::context::ArchContext;
use super::sim::SimScb;
use super::{coproc, scb, Arch};

static SYSTEM_SCB: SimScb = SimScb::new();

/// The SCB model the host backend configures.
pub fn system_control() -> &'static SimScb {
    &SYSTEM_SCB
}

/// Armv8-M Baseline architecture implementation (host stand-in).
pub struct V8mBaseArch;

impl Arch for V8mBaseArch {
    type SavedContext = ArchContext;

    fn init_context(sp: u32, sp_limit: u32) -> ArchContext {
        ArchContext::init(sp, sp_limit)
    }

    fn prioritize_secure_exceptions() {
        scb::prioritize_secure_exceptions(system_control());
        MemoryBarriers::full_barrier();
    }

    fn configure_exception_priorities() {
        scb::configure_exception_priorities(system_control());
        MemoryBarriers::full_barrier();
    }

    fn configure_coprocessors() {
        coproc::configure_coprocessors();
    }

    fn clear_fp_status() {
        coproc::clear_fp_status();
    }

    fn request_context_switch() {
        scb::pend_context_switch(system_control());
        MemoryBarriers::full_barrier();
    }
}
