// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! AArch64 context switch (AAPCS64)
//!
//! The switch frame is 160 bytes: x19-x28, fp, lr, then d8-d15.
//! A fresh frame carries the argument in x19, the entry in x20 and
//! `uthreads_locus_start` as the link register.

use core::arch::{asm, global_asm};

use super::{Context, LocusEntry};

global_asm!(
    ".text",
    ".global uthreads_switch_context",
    ".p2align 2",
    "uthreads_switch_context:",
    "sub sp, sp, #160",
    "stp x19, x20, [sp, #0]",
    "stp x21, x22, [sp, #16]",
    "stp x23, x24, [sp, #32]",
    "stp x25, x26, [sp, #48]",
    "stp x27, x28, [sp, #64]",
    "stp x29, x30, [sp, #80]",
    "stp d8, d9, [sp, #96]",
    "stp d10, d11, [sp, #112]",
    "stp d12, d13, [sp, #128]",
    "stp d14, d15, [sp, #144]",
    "mov x9, sp",
    "str x9, [x0]",
    "ldr x9, [x1]",
    "mov sp, x9",
    "ldp x19, x20, [sp, #0]",
    "ldp x21, x22, [sp, #16]",
    "ldp x23, x24, [sp, #32]",
    "ldp x25, x26, [sp, #48]",
    "ldp x27, x28, [sp, #64]",
    "ldp x29, x30, [sp, #80]",
    "ldp d8, d9, [sp, #96]",
    "ldp d10, d11, [sp, #112]",
    "ldp d12, d13, [sp, #128]",
    "ldp d14, d15, [sp, #144]",
    "add sp, sp, #160",
    "ret",
    "",
    ".global uthreads_locus_start",
    ".p2align 2",
    "uthreads_locus_start:",
    "mov x0, x19",
    "blr x20",
    "brk #0x1",
);

extern "C" {
    pub fn uthreads_switch_context(from: *mut Context, to: *const Context);
    fn uthreads_locus_start();
}

const FRAME_SIZE: usize = 160;

/// Lay out the first frame below `stack_top`.
pub unsafe fn init_frame(stack_top: usize, entry: LocusEntry, data: usize) -> usize {
    let top = stack_top & !0xF;
    let base = top - FRAME_SIZE;
    core::ptr::write_bytes(base as *mut u8, 0, FRAME_SIZE);

    let frame = base as *mut usize;
    frame.add(0).write(data); // x19
    frame.add(1).write(entry as usize); // x20
    frame.add(11).write(uthreads_locus_start as *const () as usize); // x30

    base
}

#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    unsafe {
        asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
