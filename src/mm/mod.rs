// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory Management
//!
//! Stacks for threads and tasks are carved out of the global allocator.
//! Every [`Stack`] is a single-owner buffer released by its `Drop`, so a
//! stack is freed exactly once, when the locus that owns it is reaped.
//!
//! # Usage
//!
//! ```rust
//! use uthreads::mm::StackAllocator;
//!
//! let allocator = StackAllocator::new(64 * 1024);
//! let stack = allocator.allocate()?;
//! assert!(stack.contains(stack.top() - 8));
//! drop(stack);
//! assert_eq!(allocator.live(), 0);
//! # Ok::<(), uthreads::ThreadError>(())
//! ```

pub mod stack;

pub use stack::{Stack, StackAllocator};
