//! Saved thread state and the frames shared between trap stubs and callbacks.
//!
//! Two frames exist while a trap is in progress:
//!
//! ```text
//!   handler (main) stack                 thread (process) stack
//!
//!   MSP->[ PSP        ]  SwitchFrame       PSP->[ R0 - R3 ]  ExceptionFrame
//!        [ PSP limit  ]                         [ R12     ]
//!        [ R2 (pad)   ]                         [ LR      ]
//!        [ EXC_RETURN ]                         [ PC      ]
//!        [ R8 - R11   ]                         [ xPSR    ]
//!        [ R4 - R7    ]
//! ```
//!
//! The exception frame is pushed by hardware on exception entry. The switch
//! frame is pushed by the PendSV stub and is the only thing the scheduler
//! sees. It has exactly the layout of [`ArchContext`], so a scheduler swaps
//! threads by copying records in and out of it.

use core::mem::{offset_of, size_of};

use super::exc_return::ExcReturn;
use crate::errors::{ArchResult, ContextError};

/// Callee-saved registers that the hardware does not stack, in the order the
/// PendSV stub pushes them.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalleeSaved {
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
}

impl CalleeSaved {
    /// Registers r4-r11 in register-number order.
    pub const fn to_array(&self) -> [u32; 8] {
        [
            self.r4, self.r5, self.r6, self.r7, self.r8, self.r9, self.r10, self.r11,
        ]
    }

    /// Build from registers r4-r11 in register-number order.
    pub const fn from_array(regs: [u32; 8]) -> Self {
        Self {
            r4: regs[0],
            r5: regs[1],
            r6: regs[2],
            r7: regs[3],
            r8: regs[4],
            r9: regs[5],
            r10: regs[6],
            r11: regs[7],
        }
    }
}

/// Per-thread architecture context.
///
/// Only meaningful while the owning thread is not running; while it runs the
/// live registers are authoritative and this record is stale until the next
/// context switch refreshes it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchContext {
    /// Process stack pointer
    pub sp: u32,
    /// Process stack limit (PSPLIM)
    pub sp_limit: u32,
    reserved: u32,
    /// Exception return value used to resume the thread
    pub exc_return: u32,
    pub callee_saved: CalleeSaved,
}

impl ArchContext {
    /// Create the context of a thread whose stack spans `[sp_limit, sp)`.
    ///
    /// The exception return value is always "thread mode, process stack,
    /// secure state"; a thread set up through this path can never resume in
    /// handler mode or in the non-secure world. Callers must pass
    /// `sp >= sp_limit`; nothing is checked here.
    pub const fn init(sp: u32, sp_limit: u32) -> Self {
        Self {
            sp,
            sp_limit,
            reserved: 0,
            exc_return: ExcReturn::THREAD_SECURE_PSP.bits(),
            callee_saved: CalleeSaved {
                r8: 0,
                r9: 0,
                r10: 0,
                r11: 0,
                r4: 0,
                r5: 0,
                r6: 0,
                r7: 0,
            },
        }
    }

    /// Checked variant of [`ArchContext::init`] for thread creation code.
    pub fn try_init(sp: u32, sp_limit: u32) -> ArchResult<Self> {
        let checked = if sp == 0 {
            Err(ContextError::NullStack)
        } else if sp < sp_limit {
            Err(ContextError::InvalidStackBounds { sp, limit: sp_limit })
        } else if sp & STACK_ALIGN_MASK != 0 {
            Err(ContextError::MisalignedStack(sp))
        } else if sp_limit & STACK_ALIGN_MASK != 0 {
            Err(ContextError::MisalignedStack(sp_limit))
        } else {
            Ok(Self::init(sp, sp_limit))
        };

        checked.map_err(|e| {
            crate::arch_warn!("rejected thread context: {}", e);
            e.into()
        })
    }

    /// The exception return value as a typed encoding.
    #[inline]
    pub const fn exc_return(&self) -> ExcReturn {
        ExcReturn::from_bits(self.exc_return)
    }

    /// Bytes of stack between the saved stack pointer and the limit.
    #[inline]
    pub const fn stack_headroom(&self) -> u32 {
        self.sp.saturating_sub(self.sp_limit)
    }
}

impl Default for ArchContext {
    fn default() -> Self {
        Self::init(0, 0)
    }
}

/// Stack pointers and limits must be 8-byte aligned.
pub const STACK_ALIGN_MASK: u32 = 0x7;

/// The block the PendSV stub pushes on the main stack and hands to the
/// scheduler.
///
/// The two leading words are the suspended thread's stack pointer and stack
/// limit. Rewriting them (or loading a whole [`ArchContext`]) before the
/// scheduler returns is the only way to switch threads. The layout is a
/// contract with the stub: changing it means bumping [`SwitchFrame::VERSION`].
#[repr(transparent)]
#[derive(Debug)]
pub struct SwitchFrame(ArchContext);

impl SwitchFrame {
    /// Layout version of the frame.
    pub const VERSION: u32 = 1;
    /// Size of the frame in words.
    pub const WORDS: usize = 12;

    #[inline]
    pub fn stack_pointer(&self) -> u32 {
        self.0.sp
    }

    #[inline]
    pub fn set_stack_pointer(&mut self, sp: u32) {
        self.0.sp = sp;
    }

    #[inline]
    pub fn stack_limit(&self) -> u32 {
        self.0.sp_limit
    }

    #[inline]
    pub fn set_stack_limit(&mut self, limit: u32) {
        self.0.sp_limit = limit;
    }

    #[inline]
    pub fn exc_return(&self) -> ExcReturn {
        self.0.exc_return()
    }

    /// The suspended thread's context as captured by the stub.
    #[inline]
    pub fn context(&self) -> &ArchContext {
        &self.0
    }

    /// Record the suspended thread's context.
    #[inline]
    pub fn save_into(&self, ctx: &mut ArchContext) {
        *ctx = self.0;
    }

    /// Make the stub resume `ctx` instead of the suspended thread.
    #[inline]
    pub fn load_from(&mut self, ctx: &ArchContext) {
        self.0 = *ctx;
    }

    /// Save the suspended thread into `prev` and resume `next`.
    pub fn switch(&mut self, prev: &mut ArchContext, next: &ArchContext) {
        self.save_into(prev);
        self.load_from(next);
    }
}

/// Frame stacked by hardware on exception entry (no FP state on Baseline).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl ExceptionFrame {
    /// Size of the frame in words.
    pub const WORDS: usize = 8;

    /// Argument registers r0-r3.
    pub const fn args(&self) -> [u32; 4] {
        [self.r0, self.r1, self.r2, self.r3]
    }
}

// Layout contract with the PendSV stub.
const _: () = {
    assert!(size_of::<ArchContext>() == SwitchFrame::WORDS * 4);
    assert!(size_of::<SwitchFrame>() == SwitchFrame::WORDS * 4);
    assert!(size_of::<ArchContext>() % 8 == 0);
    assert!(offset_of!(ArchContext, sp) == 0);
    assert!(offset_of!(ArchContext, sp_limit) == 4);
    assert!(offset_of!(ArchContext, reserved) == 8);
    assert!(offset_of!(ArchContext, exc_return) == 12);
    assert!(offset_of!(ArchContext, callee_saved) == 16);
    assert!(offset_of!(CalleeSaved, r8) == 0);
    assert!(offset_of!(CalleeSaved, r4) == 16);
    assert!(size_of::<ExceptionFrame>() == ExceptionFrame::WORDS * 4);
};
