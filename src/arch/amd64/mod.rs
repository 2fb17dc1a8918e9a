// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86-64 context switch (System V ABI)
//!
//! Switch frame layout, lowest address first:
//!
//! ```text
//! [r15] [r14] [r13] [r12] [rbx] [rbp] [return address]
//! ```
//!
//! A fresh frame stores the locus entry in r13, its argument in r12 and
//! returns into `uthreads_locus_start`, which moves the argument into rdi
//! and calls the entry.

use core::arch::{asm, global_asm};

use x86_64::VirtAddr;

use super::{Context, LocusEntry};

global_asm!(
    ".text",
    ".global uthreads_switch_context",
    ".p2align 4",
    "uthreads_switch_context:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, [rsi]",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    "",
    ".global uthreads_locus_start",
    ".p2align 4",
    "uthreads_locus_start:",
    "mov rdi, r12",
    "call r13",
    "ud2",
);

extern "C" {
    pub fn uthreads_switch_context(from: *mut Context, to: *const Context);
    fn uthreads_locus_start();
}

/// Number of words popped by a switch into a fresh frame
const FRAME_WORDS: usize = 7;

/// Red zone left untouched above the first frame
const TOP_PADDING: usize = 16;

/// Lay out the first frame below `stack_top`, returning the saved stack
/// pointer for the new context.
pub unsafe fn init_frame(stack_top: usize, entry: LocusEntry, data: usize) -> usize {
    let top = VirtAddr::new(stack_top as u64).align_down(16u64);
    // After the six pops and the `ret`, rsp sits on a 16-byte boundary, so
    // the `call` in the trampoline enters `entry` with the usual alignment.
    let base = top.as_u64() as usize - TOP_PADDING - FRAME_WORDS * 8;
    let frame = base as *mut usize;

    frame.add(0).write(0); // r15
    frame.add(1).write(0); // r14
    frame.add(2).write(entry as usize); // r13
    frame.add(3).write(data); // r12
    frame.add(4).write(0); // rbx
    frame.add(5).write(0); // rbp: terminates frame-pointer walks
    frame.add(6).write(uthreads_locus_start as *const () as usize);

    base
}

/// Read rsp
#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
