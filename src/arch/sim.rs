//! Host model of an Armv8-M Baseline core.
//!
//! [`SimScb`] models the SCB registers this layer touches, including the
//! AIRCR write key and the two implemented priority bits. [`SimCpu`] models
//! the register file, both stack pointers with their limits, exception entry
//! and return, and replays the PendSV and SVCall stubs instruction for
//! instruction around the real callbacks. Faults the hardware would escalate
//! to HardFault leave the model in [`FaultState::Halted`].

use alloc::vec;
use alloc::vec::Vec;

use portable_atomic::{AtomicU32, Ordering};

use super::context::{ArchContext, CalleeSaved, ExceptionFrame, SwitchFrame};
use super::exc_return::ExcReturn;
use super::fault::FaultState;
use super::scb::*;
use super::trap::{self, ServiceDispatcher, SwitchScheduler};
use crate::errors::{ArchError, ArchResult, ContextError, FaultError};

/// AIRCR bits that hold written values. Everything else in the low half is
/// read-as-zero in the model.
const AIRCR_WRITABLE: u32 = AIRCR_PRIS | AIRCR_BFHFNMINS | AIRCR_SYSRESETREQS;
/// Implemented bits of SHPR2 (SVCall).
const SHPR2_IMPLEMENTED: u32 = 0xC000_0000;
/// Implemented bits of SHPR3 (SysTick, PendSV).
const SHPR3_IMPLEMENTED: u32 = 0xC0C0_0000;

/// Stacked xPSR bit recording that the frame was realigned to 8 bytes.
pub const XPSR_STACK_ALIGN: u32 = 1 << 9;
/// Thumb state bit.
pub const XPSR_THUMB: u32 = 1 << 24;

/// SCB register model.
#[derive(Debug)]
pub struct SimScb {
    icsr: AtomicU32,
    aircr: AtomicU32,
    shpr2: AtomicU32,
    shpr3: AtomicU32,
}

impl SimScb {
    /// Registers at their reset values.
    pub const fn new() -> Self {
        Self::with_aircr(0)
    }

    /// Registers at reset, except for the AIRCR low half.
    pub const fn with_aircr(aircr: u32) -> Self {
        Self {
            icsr: AtomicU32::new(0),
            aircr: AtomicU32::new(aircr & AIRCR_WRITABLE),
            shpr2: AtomicU32::new(0),
            shpr3: AtomicU32::new(0),
        }
    }

    /// Clear a pending PendSV, returning whether one was pending. Stands in
    /// for the hardware taking the exception.
    pub fn take_pendsv(&self) -> bool {
        self.icsr.fetch_and(!ICSR_PENDSVSET, Ordering::AcqRel) & ICSR_PENDSVSET != 0
    }
}

impl Default for SimScb {
    fn default() -> Self {
        Self::new()
    }
}

impl ScbAccess for SimScb {
    fn read(&self, reg: ScbRegister) -> u32 {
        match reg {
            ScbRegister::Icsr => self.icsr.load(Ordering::Acquire),
            ScbRegister::Aircr => {
                (AIRCR_VECTKEYSTAT << 16) | self.aircr.load(Ordering::Acquire)
            }
            ScbRegister::Shpr2 => self.shpr2.load(Ordering::Acquire),
            ScbRegister::Shpr3 => self.shpr3.load(Ordering::Acquire),
        }
    }

    fn write(&self, reg: ScbRegister, value: u32) {
        match reg {
            ScbRegister::Icsr => {
                if value & ICSR_PENDSVSET != 0 {
                    self.icsr.fetch_or(ICSR_PENDSVSET, Ordering::AcqRel);
                } else if value & ICSR_PENDSVCLR != 0 {
                    self.icsr.fetch_and(!ICSR_PENDSVSET, Ordering::AcqRel);
                }
            }
            ScbRegister::Aircr => {
                if value >> 16 == AIRCR_VECTKEY {
                    self.aircr.store(value & AIRCR_WRITABLE, Ordering::Release);
                } else {
                    crate::arch_warn!("AIRCR write {:#010x} without key ignored", value);
                }
            }
            ScbRegister::Shpr2 => self.shpr2.store(value & SHPR2_IMPLEMENTED, Ordering::Release),
            ScbRegister::Shpr3 => self.shpr3.store(value & SHPR3_IMPLEMENTED, Ordering::Release),
        }
    }
}

/// Execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Thread,
    Handler,
}

/// Register-level model of one core plus a block of word-addressed RAM.
#[derive(Debug)]
pub struct SimCpu {
    /// r0-r12
    pub regs: [u32; 13],
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
    pub msp: u32,
    pub msplim: u32,
    pub psp: u32,
    pub psplim: u32,
    mode: Mode,
    spsel: bool,
    fault: FaultState,
    base: u32,
    memory: Vec<u32>,
}

impl SimCpu {
    /// A core at reset: thread mode on the main stack, which spans the whole
    /// of `words` words of RAM starting at `base`.
    ///
    /// RAM must end below the top of the 32-bit address space, since MSP has
    /// to hold the address one past its last word.
    pub fn new(base: u32, words: usize) -> ArchResult<Self> {
        let top = u32::try_from(words)
            .ok()
            .and_then(|words| words.checked_mul(4))
            .and_then(|bytes| base.checked_add(bytes))
            .ok_or(FaultError::BusFault(base))?;
        Ok(Self {
            regs: [0; 13],
            lr: 0xFFFF_FFFF,
            pc: 0,
            xpsr: XPSR_THUMB,
            msp: top,
            msplim: base,
            psp: 0,
            psplim: 0,
            mode: Mode::Thread,
            spsel: false,
            fault: FaultState::Running,
            base,
            memory: vec![0; words],
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether thread mode runs on the process stack (CONTROL.SPSEL).
    pub fn on_process_stack(&self) -> bool {
        self.mode == Mode::Thread && self.spsel
    }

    pub fn fault_state(&self) -> FaultState {
        self.fault
    }

    /// r4-r11 as currently held by the core.
    pub fn callee_saved(&self) -> CalleeSaved {
        let mut regs = [0u32; 8];
        regs.copy_from_slice(&self.regs[4..12]);
        CalleeSaved::from_array(regs)
    }

    pub fn set_callee_saved(&mut self, regs: &CalleeSaved) {
        self.regs[4..12].copy_from_slice(&regs.to_array());
    }

    /// Read a word without side effects. `None` outside modelled RAM.
    pub fn peek(&self, addr: u32) -> Option<u32> {
        self.index_of(addr, 1).map(|idx| self.memory[idx])
    }

    /// Take a HardFault from outside the modelled trap paths.
    pub fn hard_fault(&mut self, cause: FaultError) -> ArchError {
        self.escalate(cause)
    }

    /// Seed a new thread's stack with the frame exception return pops, so the
    /// first switch to `ctx` enters `entry` with `arg` in r0.
    pub fn prepare_thread(&mut self, ctx: &mut ArchContext, entry: u32, arg: u32) -> ArchResult<()> {
        let frame_sp = ctx.sp.wrapping_sub((ExceptionFrame::WORDS * 4) as u32);
        if frame_sp < ctx.sp_limit || ctx.sp < frame_sp {
            return Err(ContextError::InvalidStackBounds { sp: frame_sp, limit: ctx.sp_limit }.into());
        }
        let Some(idx) = self.index_of(frame_sp, ExceptionFrame::WORDS) else {
            return Err(ContextError::InvalidStackBounds { sp: frame_sp, limit: ctx.sp_limit }.into());
        };

        let frame = [arg, 0, 0, 0, 0, 0xFFFF_FFFF, entry & !1, XPSR_THUMB];
        self.memory[idx..idx + ExceptionFrame::WORDS].copy_from_slice(&frame);
        ctx.sp = frame_sp;
        Ok(())
    }

    /// Start the first thread: load its context and perform the exception
    /// return it describes, the way boot code leaves the initial handler.
    pub fn launch(&mut self, ctx: &ArchContext) -> ArchResult<()> {
        self.ensure_running()?;
        self.psp = ctx.sp;
        self.psplim = ctx.sp_limit;
        self.set_callee_saved(&ctx.callee_saved);
        self.mode = Mode::Handler;
        self.exception_return(ctx.exc_return)
    }

    /// Take PendSV and run the context-switch stub around `scheduler`.
    pub fn pend_sv(&mut self, scheduler: Option<&dyn SwitchScheduler>) -> ArchResult<()> {
        self.ensure_running()?;
        self.exception_entry()?;

        // mrs r0, psp / mrs r1, psplim
        let (psp, psplim) = (self.psp, self.psplim);
        // push {r4-r7}; r8-r11 through r4-r7; push {r0-r2, lr}
        let low = [self.regs[4], self.regs[5], self.regs[6], self.regs[7]];
        self.push_main(low)?;
        let high = [self.regs[8], self.regs[9], self.regs[10], self.regs[11]];
        self.regs[4..8].copy_from_slice(&high);
        self.push_main(high)?;
        self.push_main([psp, psplim, self.regs[2], self.lr])?;

        // mov r0, sp / bl
        let frame = self.switch_frame_mut(self.msp)?;
        trap::run_scheduler(scheduler, frame);

        // pop {r0-r3}; mov lr, r3; msr psp, r0; msr psplim, r1
        let [sp, limit, pad, exc_return] = self.pop_main()?;
        self.regs[0] = sp;
        self.regs[1] = limit;
        self.regs[2] = pad;
        self.regs[3] = exc_return;
        self.lr = exc_return;
        self.psp = sp;
        self.psplim = limit;
        // pop {r4-r7}; r8-r11 from r4-r7; pop {r4-r7}
        let high = self.pop_main()?;
        self.regs[8..12].copy_from_slice(&high);
        let low = self.pop_main()?;
        self.regs[4..8].copy_from_slice(&low);

        // bx lr
        self.exception_return(self.lr)
    }

    /// Execute `svc` and run the supervisor-call stub around `dispatcher`.
    /// Returns the branch target the dispatcher chose.
    pub fn svc(&mut self, dispatcher: Option<&dyn ServiceDispatcher>) -> ArchResult<u32> {
        self.ensure_running()?;
        self.exception_entry()?;

        let exc_return = ExcReturn::from_bits(self.lr);
        self.regs[1] = self.lr;
        let base = trap::argument_base(exc_return, self.msp, self.psp);
        let frame = self.exception_frame_mut(base)?;
        let target = trap::run_dispatcher(dispatcher, frame, exc_return);

        // bx r0
        self.regs[0] = target;
        self.exception_return(target)?;
        Ok(target)
    }

    fn ensure_running(&self) -> ArchResult<()> {
        if self.fault.is_halted() {
            Err(FaultError::Halted.into())
        } else {
            Ok(())
        }
    }

    fn escalate(&mut self, cause: FaultError) -> ArchError {
        self.fault = self.fault.escalate();
        crate::arch_error!("HardFault: {}, core halted", cause);
        cause.into()
    }

    fn index_of(&self, addr: u32, words: usize) -> Option<usize> {
        if addr & 3 != 0 || addr < self.base {
            return None;
        }
        let idx = ((addr - self.base) / 4) as usize;
        (idx + words <= self.memory.len()).then_some(idx)
    }

    fn slot(&mut self, addr: u32, words: usize) -> ArchResult<usize> {
        match self.index_of(addr, words) {
            Some(idx) => Ok(idx),
            None => Err(self.escalate(FaultError::BusFault(addr))),
        }
    }

    fn switch_frame_mut(&mut self, addr: u32) -> ArchResult<&mut SwitchFrame> {
        let idx = self.slot(addr, SwitchFrame::WORDS)?;
        let words = &mut self.memory[idx..idx + SwitchFrame::WORDS];
        // SAFETY: twelve in-bounds, 4-byte aligned words; SwitchFrame is a
        // repr(C) block of twelve u32.
        Ok(unsafe { &mut *(words.as_mut_ptr() as *mut SwitchFrame) })
    }

    fn exception_frame_mut(&mut self, addr: u32) -> ArchResult<&mut ExceptionFrame> {
        let idx = self.slot(addr, ExceptionFrame::WORDS)?;
        let words = &mut self.memory[idx..idx + ExceptionFrame::WORDS];
        // SAFETY: eight in-bounds, 4-byte aligned words; ExceptionFrame is a
        // repr(C) block of eight u32.
        Ok(unsafe { &mut *(words.as_mut_ptr() as *mut ExceptionFrame) })
    }

    fn push_main(&mut self, words: [u32; 4]) -> ArchResult<()> {
        let sp = self.msp.wrapping_sub(16);
        if sp < self.msplim || sp > self.msp {
            return Err(self.escalate(FaultError::StackOverflow { sp, limit: self.msplim }));
        }
        let idx = self.slot(sp, 4)?;
        self.memory[idx..idx + 4].copy_from_slice(&words);
        self.msp = sp;
        Ok(())
    }

    fn pop_main(&mut self) -> ArchResult<[u32; 4]> {
        let idx = self.slot(self.msp, 4)?;
        let mut words = [0u32; 4];
        words.copy_from_slice(&self.memory[idx..idx + 4]);
        self.msp += 16;
        Ok(words)
    }

    fn exception_entry(&mut self) -> ArchResult<()> {
        let on_psp = self.on_process_stack();
        let (sp, limit) = if on_psp {
            (self.psp, self.psplim)
        } else {
            (self.msp, self.msplim)
        };

        let mut stacked_xpsr = self.xpsr & !XPSR_STACK_ALIGN;
        let mut aligned = sp;
        if aligned & 4 != 0 {
            aligned -= 4;
            stacked_xpsr |= XPSR_STACK_ALIGN;
        }
        let frame_sp = aligned.wrapping_sub((ExceptionFrame::WORDS * 4) as u32);
        if frame_sp < limit || frame_sp > sp {
            return Err(self.escalate(FaultError::StackOverflow { sp: frame_sp, limit }));
        }

        let idx = self.slot(frame_sp, ExceptionFrame::WORDS)?;
        let r = &self.regs;
        let frame = [r[0], r[1], r[2], r[3], r[12], self.lr, self.pc, stacked_xpsr];
        self.memory[idx..idx + ExceptionFrame::WORDS].copy_from_slice(&frame);

        if on_psp {
            self.psp = frame_sp;
        } else {
            self.msp = frame_sp;
        }
        self.lr = match (self.mode, on_psp) {
            (Mode::Handler, _) => ExcReturn::HANDLER_SECURE,
            (Mode::Thread, true) => ExcReturn::THREAD_SECURE_PSP,
            (Mode::Thread, false) => ExcReturn::THREAD_SECURE_MSP,
        }
        .bits();
        self.mode = Mode::Handler;
        Ok(())
    }

    /// `bx target` in handler mode.
    fn exception_return(&mut self, target: u32) -> ArchResult<()> {
        let exc = ExcReturn::from_bits(target);
        if !exc.is_exc_return() {
            self.pc = target & !1;
            return Ok(());
        }
        if !exc.returns_to_thread() && exc.uses_process_stack() {
            return Err(self.escalate(FaultError::InvalidExcReturn(target)));
        }

        let use_psp = exc.returns_to_thread() && exc.uses_process_stack();
        let sp = if use_psp { self.psp } else { self.msp };
        let idx = self.slot(sp, ExceptionFrame::WORDS)?;
        let mut frame = [0u32; ExceptionFrame::WORDS];
        frame.copy_from_slice(&self.memory[idx..idx + ExceptionFrame::WORDS]);

        let [r0, r1, r2, r3, r12, lr, pc, xpsr] = frame;
        self.regs[0] = r0;
        self.regs[1] = r1;
        self.regs[2] = r2;
        self.regs[3] = r3;
        self.regs[12] = r12;
        self.lr = lr;
        self.pc = pc;
        self.xpsr = xpsr & !XPSR_STACK_ALIGN;

        let mut new_sp = sp.wrapping_add((ExceptionFrame::WORDS * 4) as u32);
        if xpsr & XPSR_STACK_ALIGN != 0 {
            new_sp = new_sp.wrapping_add(4);
        }
        if use_psp {
            self.psp = new_sp;
        } else {
            self.msp = new_sp;
        }

        if exc.returns_to_thread() {
            self.mode = Mode::Thread;
            self.spsel = use_psp;
        } else {
            self.mode = Mode::Handler;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u32 = 0x2000_0000;

    #[test]
    fn test_aircr_reads_key_status() {
        let scb = SimScb::new();
        assert_eq!(scb.read(ScbRegister::Aircr), 0xFA05_0000);
    }

    #[test]
    fn test_aircr_ignores_keyless_write() {
        let scb = SimScb::new();
        scb.write(ScbRegister::Aircr, AIRCR_PRIS);
        assert_eq!(scb.read(ScbRegister::Aircr) & AIRCR_PRIS, 0);

        scb.write(ScbRegister::Aircr, (AIRCR_VECTKEY << 16) | AIRCR_PRIS);
        assert_ne!(scb.read(ScbRegister::Aircr) & AIRCR_PRIS, 0);
    }

    #[test]
    fn test_icsr_pend_and_take() {
        let scb = SimScb::new();
        assert!(!scb.take_pendsv());
        scb.write(ScbRegister::Icsr, ICSR_PENDSVSET);
        assert!(context_switch_pending(&scb));
        assert!(scb.take_pendsv());
        assert!(!context_switch_pending(&scb));
    }

    #[test]
    fn test_priority_fields_keep_implemented_bits() {
        let scb = SimScb::new();
        scb.write(ScbRegister::Shpr3, 0xFFFF_FFFF);
        assert_eq!(scb.read(ScbRegister::Shpr3), 0xC0C0_0000);
    }

    #[test]
    fn test_exception_entry_realigns_stack() {
        let mut cpu = SimCpu::new(BASE, 256).unwrap();
        cpu.msp = BASE + 0x204;
        cpu.pc = 0x1000_0100;

        cpu.svc(None).unwrap();

        // Frame went to 0x200 - 32, and exception return undid the padding.
        assert_eq!(cpu.peek(BASE + 0x1E0 + 24), Some(0x1000_0100));
        assert_ne!(cpu.peek(BASE + 0x1E0 + 28).unwrap() & XPSR_STACK_ALIGN, 0);
        assert_eq!(cpu.msp, BASE + 0x204);
        assert_eq!(cpu.xpsr & XPSR_STACK_ALIGN, 0);
    }

    #[test]
    fn test_invalid_exc_return_halts() {
        let mut cpu = SimCpu::new(BASE, 256).unwrap();
        let bogus = |_: &mut ExceptionFrame, _: ExcReturn| 0xFFFF_FFF5u32;
        assert_eq!(
            cpu.svc(Some(&bogus)),
            Err(ArchError::Fault(FaultError::InvalidExcReturn(0xFFFF_FFF5)))
        );
        assert!(cpu.fault_state().is_halted());
    }

    #[test]
    fn test_prepare_thread_rejects_small_stack() {
        let mut cpu = SimCpu::new(BASE, 256).unwrap();
        let mut ctx = ArchContext::init(BASE + 0x110, BASE + 0x100);
        assert!(matches!(
            cpu.prepare_thread(&mut ctx, 0x1000_0001, 0),
            Err(ArchError::Context(ContextError::InvalidStackBounds { .. }))
        ));
        assert_eq!(ctx.sp, BASE + 0x110);
    }

    #[test]
    fn test_ram_must_end_below_address_space_top() {
        assert_eq!(
            SimCpu::new(0xFFFF_F000, 0x400).unwrap_err(),
            ArchError::Fault(FaultError::BusFault(0xFFFF_F000))
        );
        let cpu = SimCpu::new(0xFFFF_F000, 0x3FF).unwrap();
        assert_eq!(cpu.msp, 0xFFFF_FFFC);
    }

    #[test]
    fn test_svc_from_handler_mode_uses_main_stack() {
        let mut cpu = SimCpu::new(BASE, 256).unwrap();
        cpu.mode = Mode::Handler;
        cpu.psp = BASE + 0x300;
        cpu.regs[0] = 0x55;
        let msp = cpu.msp;

        let seen = spin::Mutex::new(None);
        let dispatcher = |frame: &mut ExceptionFrame, exc: ExcReturn| {
            *seen.lock() = Some((frame.r0, exc));
            frame.r0 = 0x66;
            exc.bits()
        };
        let target = cpu.svc(Some(&dispatcher)).unwrap();

        assert_eq!(*seen.lock(), Some((0x55, ExcReturn::HANDLER_SECURE)));
        assert_eq!(target, 0xFFFF_FFF1);
        assert_eq!(cpu.mode(), Mode::Handler);
        assert_eq!(cpu.regs[0], 0x66);
        assert_eq!(cpu.msp, msp);
        assert_eq!(cpu.psp, BASE + 0x300);
    }
}
