// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Stack buffers

use std::alloc::{alloc, dealloc, Layout};
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::config::STACK_ALIGN;
use crate::error::{Result, ThreadError};

/// Allocation counters shared by an allocator and its stacks
#[derive(Debug, Default)]
struct StackCounters {
    allocated: Cell<usize>,
    released: Cell<usize>,
}

/// Hands out fixed-size stacks and counts their lifetimes
#[derive(Debug)]
pub struct StackAllocator {
    /// Size of every stack in bytes
    size: usize,
    counters: Rc<StackCounters>,
}

impl StackAllocator {
    /// Create an allocator for stacks of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            size,
            counters: Rc::new(StackCounters::default()),
        }
    }

    /// Size of the stacks handed out
    pub fn stack_size(&self) -> usize {
        self.size
    }

    /// Allocate a stack
    ///
    /// # Returns
    ///
    /// * `Ok(Stack)` - A fresh, exclusively owned buffer
    /// * `Err(ThreadError::OutOfMemory)` - The allocator had no memory left
    pub fn allocate(&self) -> Result<Stack> {
        let layout = Layout::from_size_align(self.size, STACK_ALIGN)
            .map_err(|_| ThreadError::InvalidStackSize(self.size))?;

        // SAFETY: the layout has a non-zero size (checked by the config).
        let base = NonNull::new(unsafe { alloc(layout) }).ok_or(ThreadError::OutOfMemory)?;

        let allocated = &self.counters.allocated;
        allocated.set(allocated.get() + 1);

        Ok(Stack {
            base,
            layout,
            counters: Rc::clone(&self.counters),
        })
    }

    /// Number of stacks allocated so far
    pub fn allocated(&self) -> usize {
        self.counters.allocated.get()
    }

    /// Number of stacks released so far
    pub fn released(&self) -> usize {
        self.counters.released.get()
    }

    /// Number of stacks currently alive
    pub fn live(&self) -> usize {
        self.allocated() - self.released()
    }
}

/// An exclusively owned stack buffer
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    layout: Layout,
    counters: Rc<StackCounters>,
}

impl Stack {
    /// Lowest address of the buffer
    pub fn base(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// One past the highest address (stacks grow down from here)
    pub fn top(&self) -> usize {
        self.base() + self.layout.size()
    }

    /// Size of the buffer in bytes
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Check whether a stack pointer lies within this buffer
    pub fn contains(&self, sp: usize) -> bool {
        sp >= self.base() && sp <= self.top()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: `base` came from `alloc` with exactly this layout and is
        // released only here.
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
        let released = &self.counters.released;
        released.set(released.get() + 1);
    }
}
