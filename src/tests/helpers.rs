//! Test helper utilities: a board with thread stacks and simple hooks.

use alloc::vec::Vec;

use crate::arch::context::{ArchContext, CalleeSaved, SwitchFrame};
use crate::arch::sim::SimCpu;
use crate::arch::trap::SwitchScheduler;
use crate::arch::Arch;
use crate::errors::ArchResult;

pub(crate) const RAM_BASE: u32 = 0x2000_0000;
pub(crate) const RAM_WORDS: usize = 0x2000;
/// Main stack occupies the first 4 KiB.
pub(crate) const MAIN_STACK_TOP: u32 = RAM_BASE + 0x1000;
pub(crate) const THREAD_STACK_SIZE: u32 = 0x1000;

/// Stack bounds `(top, limit)` of thread slot `n`.
pub(crate) fn thread_stack(n: usize) -> (u32, u32) {
    let limit = MAIN_STACK_TOP + n as u32 * THREAD_STACK_SIZE;
    (limit + THREAD_STACK_SIZE, limit)
}

/// Entry point address of thread slot `n` (Thumb bit set).
pub(crate) fn thread_entry(n: usize) -> u32 {
    0x1000_0001 + n as u32 * 0x100
}

/// Recognisable callee-saved register values for a thread.
pub(crate) fn register_pattern(tag: u32) -> CalleeSaved {
    CalleeSaved::from_array(core::array::from_fn(|i| (tag << 16) | (4 + i as u32)))
}

/// A simulated core whose main stack sits below a row of thread stacks.
pub(crate) struct Board {
    pub(crate) cpu: SimCpu,
}

impl Board {
    pub(crate) fn new() -> Self {
        let mut cpu = SimCpu::new(RAM_BASE, RAM_WORDS).unwrap();
        cpu.msp = MAIN_STACK_TOP;
        cpu.msplim = RAM_BASE;
        Self { cpu }
    }

    /// Create and seed the context of thread slot `n`.
    pub(crate) fn spawn(&mut self, n: usize, arg: u32) -> ArchResult<ArchContext> {
        let (top, limit) = thread_stack(n);
        let mut ctx = ArchContext::try_init(top, limit)?;
        self.cpu.prepare_thread(&mut ctx, thread_entry(n), arg)?;
        Ok(ctx)
    }
}

struct TableState {
    contexts: Vec<ArchContext>,
    current: usize,
    next: Option<usize>,
    calls: usize,
}

/// Scheduler over a fixed table of contexts. Switches only when told to.
pub(crate) struct TableScheduler {
    state: spin::Mutex<TableState>,
}

impl TableScheduler {
    pub(crate) fn new(contexts: Vec<ArchContext>, current: usize) -> Self {
        Self {
            state: spin::Mutex::new(TableState {
                contexts,
                current,
                next: None,
                calls: 0,
            }),
        }
    }

    /// Switch to `next` on the following context-switch trap.
    pub(crate) fn select(&self, next: usize) {
        self.state.lock().next = Some(next);
    }

    pub(crate) fn context(&self, n: usize) -> ArchContext {
        self.state.lock().contexts[n]
    }

    pub(crate) fn current(&self) -> usize {
        self.state.lock().current
    }

    pub(crate) fn calls(&self) -> usize {
        self.state.lock().calls
    }
}

impl SwitchScheduler for TableScheduler {
    fn schedule(&self, frame: &mut SwitchFrame) {
        let mut state = self.state.lock();
        state.calls += 1;
        let Some(next) = state.next.take() else {
            return;
        };
        let current = state.current;
        if next == current {
            return;
        }
        let next_ctx = state.contexts[next];
        frame.switch(&mut state.contexts[current], &next_ctx);
        state.current = next;
    }
}

static BRING_UP_CALLS: spin::Mutex<Vec<&'static str>> = spin::Mutex::new(Vec::new());

/// Arch that records the order its configuration hooks run in.
pub(crate) struct RecordingArch;

impl RecordingArch {
    pub(crate) fn take_calls() -> Vec<&'static str> {
        core::mem::take(&mut *BRING_UP_CALLS.lock())
    }

    fn record(name: &'static str) {
        BRING_UP_CALLS.lock().push(name);
    }
}

impl Arch for RecordingArch {
    type SavedContext = ArchContext;

    fn init_context(sp: u32, sp_limit: u32) -> ArchContext {
        ArchContext::init(sp, sp_limit)
    }

    fn prioritize_secure_exceptions() {
        Self::record("prioritize_secure_exceptions");
    }

    fn configure_exception_priorities() {
        Self::record("configure_exception_priorities");
    }

    fn configure_coprocessors() {
        Self::record("configure_coprocessors");
    }

    fn clear_fp_status() {
        Self::record("clear_fp_status");
    }

    fn request_context_switch() {
        Self::record("request_context_switch");
    }
}
