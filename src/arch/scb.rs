//! System Control Block registers used by the trap layer.
//!
//! Covers the secure exception priority configurator (AIRCR.PRIS), the
//! system handler priorities of SVCall and PendSV, and pending a context
//! switch through ICSR.
//!
//! # Reference
//!
//! Armv8-M Architecture Reference Manual, B3.2 System Control Space

// SCB register addresses
pub const SCB_ICSR: usize = 0xE000_ED04;  // Interrupt Control and State Register
pub const SCB_AIRCR: usize = 0xE000_ED0C; // Application Interrupt and Reset Control Register
pub const SCB_SHPR2: usize = 0xE000_ED1C; // System Handler Priority Register 2 (SVCall)
pub const SCB_SHPR3: usize = 0xE000_ED20; // System Handler Priority Register 3 (PendSV, SysTick)

// AIRCR fields
pub const AIRCR_VECTKEY_MASK: u32 = 0xFFFF_0000;
/// Reads of the key field return this pattern shifted to bits 31:16.
pub const AIRCR_VECTKEYSTAT_MASK: u32 = 0xFFFF_0000;
pub const AIRCR_VECTKEYSTAT: u32 = 0xFA05;
/// Writes are accepted only with this key in bits 31:16.
pub const AIRCR_VECTKEY: u32 = 0x05FA;
/// Secure exceptions are prioritized above non-secure ones.
pub const AIRCR_PRIS: u32 = 1 << 14;
pub const AIRCR_BFHFNMINS: u32 = 1 << 13;
pub const AIRCR_SYSRESETREQS: u32 = 1 << 3;

// ICSR fields
pub const ICSR_PENDSVSET: u32 = 1 << 28;
pub const ICSR_PENDSVCLR: u32 = 1 << 27;

// System handler priority fields
pub const SHPR2_SVCALL_SHIFT: u32 = 24;
pub const SHPR3_PENDSV_SHIFT: u32 = 16;
const PRIORITY_FIELD_MASK: u32 = 0xFF;

/// Priority bits implemented by Armv8-M Baseline cores.
pub const PRIORITY_BITS: u32 = 2;
/// Highest configurable priority.
pub const SVCALL_PRIORITY: u8 = 0x00;
/// Lowest priority; hardware keeps only the implemented top bits.
pub const PENDSV_PRIORITY: u8 = 0xFF;

/// An SCB register touched by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScbRegister {
    Icsr,
    Aircr,
    Shpr2,
    Shpr3,
}

impl ScbRegister {
    pub const fn address(self) -> usize {
        match self {
            ScbRegister::Icsr => SCB_ICSR,
            ScbRegister::Aircr => SCB_AIRCR,
            ScbRegister::Shpr2 => SCB_SHPR2,
            ScbRegister::Shpr3 => SCB_SHPR3,
        }
    }
}

/// Word access to the SCB.
///
/// Baseline cores only permit word-sized accesses to these registers, so the
/// interface has no byte accessors.
pub trait ScbAccess {
    fn read(&self, reg: ScbRegister) -> u32;
    fn write(&self, reg: ScbRegister, value: u32);
}

/// AIRCR value that sets PRIS given the current register contents.
///
/// The write key is derived from the key-status pattern the register returns
/// on reads (`!0xFA05 == 0x05FA` in the top half). Every bit outside the key
/// field is carried over unchanged.
#[inline]
pub const fn prioritized_aircr(current: u32) -> u32 {
    AIRCR_PRIS | (!current & AIRCR_VECTKEYSTAT_MASK) | (current & !AIRCR_VECTKEY_MASK)
}

/// SHPR2 value with the SVCall priority field replaced.
#[inline]
pub const fn with_svcall_priority(shpr2: u32, priority: u8) -> u32 {
    (shpr2 & !(PRIORITY_FIELD_MASK << SHPR2_SVCALL_SHIFT))
        | ((priority as u32) << SHPR2_SVCALL_SHIFT)
}

/// SHPR3 value with the PendSV priority field replaced.
#[inline]
pub const fn with_pendsv_priority(shpr3: u32, priority: u8) -> u32 {
    (shpr3 & !(PRIORITY_FIELD_MASK << SHPR3_PENDSV_SHIFT))
        | ((priority as u32) << SHPR3_PENDSV_SHIFT)
}

/// Make secure exceptions always preempt non-secure ones.
///
/// Idempotent. Must run during bring-up before non-secure code can execute.
pub fn prioritize_secure_exceptions<S: ScbAccess + ?Sized>(scb: &S) {
    let aircr = scb.read(ScbRegister::Aircr);
    scb.write(ScbRegister::Aircr, prioritized_aircr(aircr));
    crate::arch_info!(
        "secure exceptions prioritized, AIRCR {:#010x} -> {:#010x}",
        aircr,
        scb.read(ScbRegister::Aircr)
    );
}

/// Put SVCall at the highest and PendSV at the lowest priority.
///
/// Exceptions never preempt an active exception of the same priority, so
/// with PendSV at the bottom a context switch cannot be re-entered by another
/// PendSV and never interrupts a service call in progress.
pub fn configure_exception_priorities<S: ScbAccess + ?Sized>(scb: &S) {
    let shpr2 = with_svcall_priority(scb.read(ScbRegister::Shpr2), SVCALL_PRIORITY);
    scb.write(ScbRegister::Shpr2, shpr2);

    let shpr3 = with_pendsv_priority(scb.read(ScbRegister::Shpr3), PENDSV_PRIORITY);
    scb.write(ScbRegister::Shpr3, shpr3);

    crate::arch_info!(
        "exception priorities: SVCall={:#04x} PendSV={:#04x}",
        svcall_priority(scb),
        pendsv_priority(scb)
    );
}

/// Current SVCall priority as reported by hardware.
pub fn svcall_priority<S: ScbAccess + ?Sized>(scb: &S) -> u8 {
    (scb.read(ScbRegister::Shpr2) >> SHPR2_SVCALL_SHIFT) as u8
}

/// Current PendSV priority as reported by hardware.
pub fn pendsv_priority<S: ScbAccess + ?Sized>(scb: &S) -> u8 {
    ((scb.read(ScbRegister::Shpr3) >> SHPR3_PENDSV_SHIFT) & PRIORITY_FIELD_MASK) as u8
}

/// Pend the context-switch exception.
pub fn pend_context_switch<S: ScbAccess + ?Sized>(scb: &S) {
    // ICSR is write-one-to-act; zero bits leave other state alone.
    scb.write(ScbRegister::Icsr, ICSR_PENDSVSET);
    crate::arch_trace!("PendSV pended");
}

/// Whether a context switch is pending.
pub fn context_switch_pending<S: ScbAccess + ?Sized>(scb: &S) -> bool {
    scb.read(ScbRegister::Icsr) & ICSR_PENDSVSET != 0
}
