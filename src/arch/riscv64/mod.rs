// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! RISC-V 64 context switch (LP64D)
//!
//! Switch frame: ra, s0-s11, fs0-fs11, one padding word (208 bytes).

use core::arch::{asm, global_asm};

use super::{Context, LocusEntry};

global_asm!(
    ".text",
    ".global uthreads_switch_context",
    ".p2align 2",
    "uthreads_switch_context:",
    "addi sp, sp, -208",
    "sd ra, 0(sp)",
    "sd s0, 8(sp)",
    "sd s1, 16(sp)",
    "sd s2, 24(sp)",
    "sd s3, 32(sp)",
    "sd s4, 40(sp)",
    "sd s5, 48(sp)",
    "sd s6, 56(sp)",
    "sd s7, 64(sp)",
    "sd s8, 72(sp)",
    "sd s9, 80(sp)",
    "sd s10, 88(sp)",
    "sd s11, 96(sp)",
    "fsd fs0, 104(sp)",
    "fsd fs1, 112(sp)",
    "fsd fs2, 120(sp)",
    "fsd fs3, 128(sp)",
    "fsd fs4, 136(sp)",
    "fsd fs5, 144(sp)",
    "fsd fs6, 152(sp)",
    "fsd fs7, 160(sp)",
    "fsd fs8, 168(sp)",
    "fsd fs9, 176(sp)",
    "fsd fs10, 184(sp)",
    "fsd fs11, 192(sp)",
    "sd sp, 0(a0)",
    "ld sp, 0(a1)",
    "ld ra, 0(sp)",
    "ld s0, 8(sp)",
    "ld s1, 16(sp)",
    "ld s2, 24(sp)",
    "ld s3, 32(sp)",
    "ld s4, 40(sp)",
    "ld s5, 48(sp)",
    "ld s6, 56(sp)",
    "ld s7, 64(sp)",
    "ld s8, 72(sp)",
    "ld s9, 80(sp)",
    "ld s10, 88(sp)",
    "ld s11, 96(sp)",
    "fld fs0, 104(sp)",
    "fld fs1, 112(sp)",
    "fld fs2, 120(sp)",
    "fld fs3, 128(sp)",
    "fld fs4, 136(sp)",
    "fld fs5, 144(sp)",
    "fld fs6, 152(sp)",
    "fld fs7, 160(sp)",
    "fld fs8, 168(sp)",
    "fld fs9, 176(sp)",
    "fld fs10, 184(sp)",
    "fld fs11, 192(sp)",
    "addi sp, sp, 208",
    "ret",
    "",
    ".global uthreads_locus_start",
    ".p2align 2",
    "uthreads_locus_start:",
    "mv a0, s1",
    "jalr s2",
    "unimp",
);

extern "C" {
    pub fn uthreads_switch_context(from: *mut Context, to: *const Context);
    fn uthreads_locus_start();
}

const FRAME_SIZE: usize = 208;

/// Lay out the first frame below `stack_top`.
pub unsafe fn init_frame(stack_top: usize, entry: LocusEntry, data: usize) -> usize {
    let top = stack_top & !0xF;
    let base = top - FRAME_SIZE;
    core::ptr::write_bytes(base as *mut u8, 0, FRAME_SIZE);

    let frame = base as *mut usize;
    frame.add(0).write(uthreads_locus_start as *const () as usize); // ra
    frame.add(2).write(data); // s1
    frame.add(3).write(entry as usize); // s2

    base
}

#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    unsafe {
        asm!("mv {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
    }
    sp
}
