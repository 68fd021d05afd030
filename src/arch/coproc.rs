//! Coprocessor and floating-point hooks.
//!
//! Armv8-M Baseline has no coprocessors and no FPU, so there is no CPACR/NSACR
//! setup and no FPCCR.FPCA to clear. The functions exist so that bring-up
//! code can call the same sequence on every profile.

/// Configure coprocessor access. No-op on Baseline.
#[inline]
pub fn configure_coprocessors() {
    crate::arch_trace!("no coprocessors on Armv8-M Baseline");
}

/// Clear the floating-point context active flag. No-op on Baseline.
#[inline]
pub fn clear_fp_status() {
    crate::arch_trace!("no FP context on Armv8-M Baseline");
}
