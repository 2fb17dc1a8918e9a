// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture-specific context switching
//!
//! Each architecture (amd64, arm64, riscv64) has its own subdirectory
//! providing three primitives:
//!
//! - `uthreads_switch_context(from, to)`: push the callee-saved registers
//!   on the current stack, store the stack pointer in `from`, load the
//!   stack pointer from `to` and pop its registers.
//! - `init_frame(top, entry, data)`: lay out a first frame on an unused
//!   stack so that switching to it calls `entry(data)`.
//! - `stack_pointer()`: read the live stack pointer.
//!
//! A [`Context`] is therefore just the saved stack pointer; everything else
//! lives on the suspended stack itself.

#[cfg(target_arch = "x86_64")]
pub mod amd64;
#[cfg(target_arch = "x86_64")]
use amd64 as imp;

#[cfg(target_arch = "aarch64")]
pub mod arm64;
#[cfg(target_arch = "aarch64")]
use arm64 as imp;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;
#[cfg(target_arch = "riscv64")]
use riscv64 as imp;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "riscv64"
)))]
compile_error!("uthreads supports x86_64, aarch64 and riscv64 only");

/// Function started on a fresh stack; it must never return
pub type LocusEntry = extern "C" fn(usize) -> !;

/// Saved execution context
///
/// Valid to resume only after it has been written by [`switch_context`]
/// or [`Context::prepare`]; resuming it consumes the frame it points at.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Context {
    sp: usize,
}

impl Context {
    /// Create an empty context
    pub const fn new() -> Self {
        Self { sp: 0 }
    }

    /// Build a first frame on the stack ending at `stack_top` so that
    /// switching to this context calls `entry(data)`.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the end of a writable, otherwise unused stack
    /// buffer large enough for the frame and for everything `entry` runs.
    pub unsafe fn prepare(&mut self, stack_top: usize, entry: LocusEntry, data: usize) {
        self.sp = imp::init_frame(stack_top, entry, data);
    }
}

/// Save the running context into `from` and resume `to`.
///
/// Returns when some other context switches back into `from`.
///
/// # Safety
///
/// `from` must be writable and `to` must hold a context captured by an
/// earlier switch or built by [`Context::prepare`], whose stack is still
/// allocated. `from` and `to` may be the same context.
#[inline]
pub unsafe fn switch_context(from: *mut Context, to: *const Context) {
    debug_assert!((*to).sp != 0, "switch to a context that was never saved");
    imp::uthreads_switch_context(from, to);
}

/// Read the live stack pointer
#[inline(always)]
pub fn current_stack_pointer() -> usize {
    imp::stack_pointer()
}
