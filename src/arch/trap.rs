//! Callback seams of the PendSV and SVCall trap stubs.
//!
//! The stubs in the hardware backend do nothing but move registers; they call
//! into [`pendsv_entry`] and [`svc_entry`], which forward to the scheduler and
//! dispatcher registered during bring-up.

use portable_atomic::{AtomicU32, Ordering};

use super::context::{ExceptionFrame, SwitchFrame};
use super::exc_return::ExcReturn;
use crate::errors::{ArchResult, RegistrationError};

/// Scheduling callback invoked by the context-switch trap.
///
/// Runs synchronously with the suspended thread's state in `frame`. To
/// resume another thread, rewrite the frame's stack pointer and limit (or
/// load a whole context) before returning. Must not block.
pub trait SwitchScheduler: Sync {
    fn schedule(&self, frame: &mut SwitchFrame);
}

impl<F> SwitchScheduler for F
where
    F: Fn(&mut SwitchFrame) + Sync,
{
    fn schedule(&self, frame: &mut SwitchFrame) {
        self(frame)
    }
}

/// Secure-service dispatcher invoked by the supervisor-call trap.
///
/// `frame` is the hardware-stacked frame of the caller (the argument base)
/// and `exc_return` the value LR held on entry. The return value is branched
/// to on exit: normally an EXC_RETURN value, possibly a different one than
/// `exc_return`.
pub trait ServiceDispatcher: Sync {
    fn dispatch(&self, frame: &mut ExceptionFrame, exc_return: ExcReturn) -> u32;
}

impl<F> ServiceDispatcher for F
where
    F: Fn(&mut ExceptionFrame, ExcReturn) -> u32 + Sync,
{
    fn dispatch(&self, frame: &mut ExceptionFrame, exc_return: ExcReturn) -> u32 {
        self(frame, exc_return)
    }
}

static SCHEDULER: spin::Once<&'static dyn SwitchScheduler> = spin::Once::new();
static DISPATCHER: spin::Once<&'static dyn ServiceDispatcher> = spin::Once::new();

static SWITCH_TRAPS: AtomicU32 = AtomicU32::new(0);
static SERVICE_TRAPS: AtomicU32 = AtomicU32::new(0);

/// Register the scheduler. Must happen before PendSV can be taken.
pub fn register_scheduler(scheduler: &'static dyn SwitchScheduler) -> ArchResult<()> {
    let mut installed = false;
    SCHEDULER.call_once(|| {
        installed = true;
        scheduler
    });
    if installed {
        crate::arch_info!("context-switch scheduler registered");
        Ok(())
    } else {
        crate::arch_warn!("scheduler already registered, ignoring");
        Err(RegistrationError::SchedulerAlreadySet.into())
    }
}

/// Register the service dispatcher. Must happen before SVC can be issued.
pub fn register_dispatcher(dispatcher: &'static dyn ServiceDispatcher) -> ArchResult<()> {
    let mut installed = false;
    DISPATCHER.call_once(|| {
        installed = true;
        dispatcher
    });
    if installed {
        crate::arch_info!("service dispatcher registered");
        Ok(())
    } else {
        crate::arch_warn!("dispatcher already registered, ignoring");
        Err(RegistrationError::DispatcherAlreadySet.into())
    }
}

/// Trap entry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapCounts {
    pub context_switches: u32,
    pub service_calls: u32,
}

/// Number of trap entries seen since boot.
pub fn trap_counts() -> TrapCounts {
    TrapCounts {
        context_switches: SWITCH_TRAPS.load(Ordering::Relaxed),
        service_calls: SERVICE_TRAPS.load(Ordering::Relaxed),
    }
}

/// Stack the supervisor call's arguments were pushed on.
///
/// Bit 2 of EXC_RETURN is set when the caller ran on the process stack.
#[inline]
pub const fn argument_base(exc_return: ExcReturn, msp: u32, psp: u32) -> u32 {
    if exc_return.uses_process_stack() {
        psp
    } else {
        msp
    }
}

/// Run one context-switch decision. Without a scheduler the frame is left
/// untouched and the same thread resumes.
#[inline]
pub fn run_scheduler(scheduler: Option<&dyn SwitchScheduler>, frame: &mut SwitchFrame) {
    if let Some(scheduler) = scheduler {
        scheduler.schedule(frame);
    }
}

/// Run one service call. Without a dispatcher the call returns to the caller
/// through the EXC_RETURN it was entered with.
#[inline]
pub fn run_dispatcher(
    dispatcher: Option<&dyn ServiceDispatcher>,
    frame: &mut ExceptionFrame,
    exc_return: ExcReturn,
) -> u32 {
    match dispatcher {
        Some(dispatcher) => dispatcher.dispatch(frame, exc_return),
        None => exc_return.bits(),
    }
}

/// Called by the PendSV stub with the address of the frame it pushed.
///
/// # Safety
///
/// `frame` must point at a live [`SwitchFrame`] on the main stack that
/// nothing else accesses until this function returns.
pub unsafe extern "C" fn pendsv_entry(frame: *mut SwitchFrame) {
    SWITCH_TRAPS.fetch_add(1, Ordering::Relaxed);
    // SAFETY: the caller guarantees exclusive access to a valid frame.
    let frame = unsafe { &mut *frame };
    run_scheduler(SCHEDULER.get().copied(), frame);
}

/// Called by the SVCall stub with the argument base and EXC_RETURN.
/// Returns the address the stub branches to.
///
/// # Safety
///
/// `args` must point at the hardware-stacked frame of the caller.
pub unsafe extern "C" fn svc_entry(args: *mut ExceptionFrame, exc_return: u32) -> u32 {
    SERVICE_TRAPS.fetch_add(1, Ordering::Relaxed);
    // SAFETY: hardware stacked a full frame at the argument base.
    let frame = unsafe { &mut *args };
    run_dispatcher(DISPATCHER.get().copied(), frame, ExcReturn::from_bits(exc_return))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::context::ArchContext;
    use crate::errors::ArchError;

    #[test]
    fn test_argument_base_follows_bit_two() {
        let (msp, psp) = (0x2000_0F00, 0x2000_8F00);
        assert_eq!(argument_base(ExcReturn::THREAD_SECURE_PSP, msp, psp), psp);
        assert_eq!(argument_base(ExcReturn::THREAD_SECURE_MSP, msp, psp), msp);
        assert_eq!(argument_base(ExcReturn::HANDLER_SECURE, msp, psp), msp);
    }

    #[test]
    fn test_missing_dispatcher_returns_through_caller() {
        let mut frame = ExceptionFrame::default();
        let target = run_dispatcher(None, &mut frame, ExcReturn::THREAD_SECURE_PSP);
        assert_eq!(target, ExcReturn::THREAD_SECURE_PSP.bits());
    }

    #[test]
    fn test_missing_scheduler_leaves_frame() {
        let mut words = [0u32; SwitchFrame::WORDS];
        words[0] = 0x2000_1000;
        words[1] = 0x2000_0800;
        let before = words;

        // SAFETY: SwitchFrame is a 12-word repr(C) block of u32.
        let frame = unsafe { &mut *(words.as_mut_ptr() as *mut SwitchFrame) };
        run_scheduler(None, frame);
        assert_eq!(words, before);
    }

    #[test]
    fn test_closures_act_as_callbacks() {
        let scheduler = |frame: &mut SwitchFrame| frame.set_stack_pointer(0x2000_4000);
        let mut ctx = ArchContext::init(0x2000_1000, 0x2000_0000);
        // SAFETY: ArchContext and SwitchFrame share one layout.
        let frame = unsafe { &mut *(&mut ctx as *mut ArchContext as *mut SwitchFrame) };
        run_scheduler(Some(&scheduler), frame);
        assert_eq!(ctx.sp, 0x2000_4000);

        let dispatcher = |frame: &mut ExceptionFrame, exc: ExcReturn| {
            frame.r0 = frame.r1 + frame.r2;
            exc.bits()
        };
        let mut frame = ExceptionFrame { r1: 2, r2: 3, ..Default::default() };
        let target = run_dispatcher(Some(&dispatcher), &mut frame, ExcReturn::THREAD_SECURE_PSP);
        assert_eq!(frame.r0, 5);
        assert_eq!(target, 0xFFFF_FFFD);
    }

    #[test]
    fn test_entry_points_forward_to_registered_hooks() {
        static SCHEDULER_HOOK: fn(&mut SwitchFrame) = |frame| {
            let sp = frame.stack_pointer();
            frame.set_stack_pointer(sp - 0x100);
        };
        static DISPATCHER_HOOK: fn(&mut ExceptionFrame, ExcReturn) -> u32 = |frame, _| {
            frame.r0 = 0xC0DE;
            ExcReturn::THREAD_SECURE_MSP.bits()
        };

        register_scheduler(&SCHEDULER_HOOK).unwrap();
        register_dispatcher(&DISPATCHER_HOOK).unwrap();
        assert_eq!(
            register_scheduler(&SCHEDULER_HOOK),
            Err(ArchError::Registration(RegistrationError::SchedulerAlreadySet))
        );
        assert_eq!(
            register_dispatcher(&DISPATCHER_HOOK),
            Err(ArchError::Registration(RegistrationError::DispatcherAlreadySet))
        );

        let before = trap_counts();

        let mut ctx = ArchContext::init(0x2000_1000, 0x2000_0000);
        // SAFETY: ArchContext and SwitchFrame share one layout.
        unsafe { pendsv_entry(&mut ctx as *mut ArchContext as *mut SwitchFrame) };
        assert_eq!(ctx.sp, 0x2000_0F00);

        let mut frame = ExceptionFrame::default();
        // SAFETY: `frame` is a live exception frame.
        let target = unsafe { svc_entry(&mut frame, ExcReturn::THREAD_SECURE_PSP.bits()) };
        assert_eq!(frame.r0, 0xC0DE);
        assert_eq!(target, ExcReturn::THREAD_SECURE_MSP.bits());

        let after = trap_counts();
        assert!(after.context_switches > before.context_switches);
        assert!(after.service_calls > before.service_calls);
    }
}
