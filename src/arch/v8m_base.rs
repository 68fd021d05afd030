//! Armv8-M Baseline (thumbv8m.base) trap stubs and SCB access.
//!
//! The stubs only move registers between the CPU and the stacks. They use the
//! Thumb-1 subset available on Baseline: `push`/`pop` reach r0-r7 and lr
//! only, so r8-r11 travel through r4-r7.

use core::arch::naked_asm;
use core::ptr::{read_volatile, write_volatile};

use cortex_m::peripheral::SCB;
use cortex_m_rt::exception;

use super::barriers::MemoryBarriers;
use super::context::ArchContext;
use super::scb::{self, ScbAccess, ScbRegister};
use super::{coproc, fault, Arch};

/// Context-switch trap.
///
/// Pushes the suspended thread's state on the main stack so that it forms a
/// [`SwitchFrame`](super::context::SwitchFrame) at MSP, hands MSP to the
/// scheduler, then resumes whatever the frame describes afterwards:
///
/// ```text
///   r4-r7 | r8-r11 (via r4-r7) | PSP, PSPLIM, r2, EXC_RETURN   <- MSP
/// ```
///
/// r2 only pads the frame to an 8-byte multiple; its stacked value is
/// discarded on the way out.
#[allow(non_snake_case)]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "mrs r0, psp",
        "mrs r1, psplim",
        "push {{r4-r7}}",
        "mov r4, r8",
        "mov r5, r9",
        "mov r6, r10",
        "mov r7, r11",
        "push {{r4-r7}}",
        "push {{r0-r2, lr}}",
        "mov r0, sp",
        "bl {entry}",
        "pop {{r0-r3}}",
        "mov lr, r3",
        "msr psp, r0",
        "msr psplim, r1",
        "pop {{r4-r7}}",
        "mov r8, r4",
        "mov r9, r5",
        "mov r10, r6",
        "mov r11, r7",
        "pop {{r4-r7}}",
        "bx lr",
        entry = sym super::trap::pendsv_entry,
    );
}

/// Supervisor-call trap.
///
/// Picks the stack the caller's frame was pushed on from EXC_RETURN bit 2,
/// calls the dispatcher with that frame and EXC_RETURN, and branches to
/// whatever it returns.
#[allow(non_snake_case)]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "mov r1, lr",
        "movs r0, #4",
        "tst r0, r1",
        "bne 1f",
        "mrs r0, msp",
        "b 2f",
        "1:",
        "mrs r0, psp",
        "2:",
        "bl {entry}",
        "bx r0",
        entry = sym super::trap::svc_entry,
    );
}

// Every fault ends here on Baseline, including the ones Mainline reports as
// SecureFault. Secure state may be corrupt, so never return.
#[exception(trampoline = false)]
unsafe fn HardFault() -> ! {
    fault::halt()
}

/// Memory-mapped System Control Block.
pub struct HardwareScb {
    _private: (),
}

impl HardwareScb {
    /// # Safety
    ///
    /// Must only be used from secure privileged code, and not concurrently
    /// with other writers of the same registers.
    pub const unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl ScbAccess for HardwareScb {
    #[inline]
    fn read(&self, reg: ScbRegister) -> u32 {
        // SAFETY: SCB::PTR is the always-mapped SCS block.
        let scb = unsafe { &*SCB::PTR };
        match reg {
            ScbRegister::Icsr => scb.icsr.read(),
            ScbRegister::Aircr => scb.aircr.read(),
            // cortex-m exposes SHPR as bytes on this target; Baseline only
            // allows word access, so go through the raw address.
            // SAFETY: fixed, always-mapped SCS address; word access.
            ScbRegister::Shpr2 | ScbRegister::Shpr3 => unsafe {
                read_volatile(reg.address() as *const u32)
            },
        }
    }

    #[inline]
    fn write(&self, reg: ScbRegister, value: u32) {
        // SAFETY: as above; callers own the SCB per `steal`.
        let scb = unsafe { &*SCB::PTR };
        match reg {
            // SAFETY: as above.
            ScbRegister::Icsr => unsafe { scb.icsr.write(value) },
            // SAFETY: as above.
            ScbRegister::Aircr => unsafe { scb.aircr.write(value) },
            // Word access only, see `read`.
            // SAFETY: fixed, always-mapped SCS address; word access.
            ScbRegister::Shpr2 | ScbRegister::Shpr3 => unsafe {
                write_volatile(reg.address() as *mut u32, value)
            },
        }
    }
}

/// Armv8-M Baseline architecture implementation.
pub struct V8mBaseArch;

impl V8mBaseArch {
    #[inline]
    fn scb() -> HardwareScb {
        // SAFETY: this layer only runs in secure privileged mode, and SCB
        // updates happen during bring-up or as a single ICSR write.
        unsafe { HardwareScb::steal() }
    }
}

impl Arch for V8mBaseArch {
    type SavedContext = ArchContext;

    fn init_context(sp: u32, sp_limit: u32) -> ArchContext {
        ArchContext::init(sp, sp_limit)
    }

    fn prioritize_secure_exceptions() {
        scb::prioritize_secure_exceptions(&Self::scb());
        MemoryBarriers::full_barrier();
    }

    fn configure_exception_priorities() {
        scb::configure_exception_priorities(&Self::scb());
        MemoryBarriers::full_barrier();
    }

    fn configure_coprocessors() {
        coproc::configure_coprocessors();
    }

    fn clear_fp_status() {
        coproc::clear_fp_status();
    }

    fn request_context_switch() {
        SCB::set_pendsv();
        MemoryBarriers::full_barrier();
        crate::arch_trace!("PendSV pended");
    }
}
