//! Memory and instruction barriers around system register updates.
//!
//! Writes to the SCB take effect only after a DSB, and a following ISB makes
//! sure the next instruction sees the new configuration (for instance a
//! pended PendSV being taken right after the write).

pub struct MemoryBarriers;

impl MemoryBarriers {
    /// Complete outstanding memory accesses (DSB).
    #[inline(always)]
    pub fn data_barrier() {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::dsb();

        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }

    /// Data barrier followed by a pipeline flush (DSB; ISB).
    #[inline(always)]
    pub fn full_barrier() {
        Self::data_barrier();

        #[cfg(all(target_arch = "arm", target_os = "none"))]
        cortex_m::asm::isb();

        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barriers_are_callable_on_host() {
        MemoryBarriers::data_barrier();
        MemoryBarriers::full_barrier();
    }
}
