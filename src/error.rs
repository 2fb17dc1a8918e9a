// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime errors
//!
//! Only recoverable conditions are reported through [`ThreadError`].
//! Broken runtime invariants (yielding with no current thread, a run
//! queue that is no longer a ring, a stack pointer outside every known
//! stack) are programming errors and abort with a diagnostic instead.

use core::fmt;

/// Errors returned by fallible runtime operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// Stack or control-block memory could not be allocated
    OutOfMemory,
    /// Configured stack size is zero, misaligned or below the minimum
    InvalidStackSize(usize),
    /// Handle does not name a live thread of this runtime
    InvalidThread,
    /// Thread is already current or linked on a queue
    AlreadyQueued,
    /// `start_threading` was entered while a runtime is already running
    /// on this OS thread
    AlreadyRunning,
    /// No runtime is running on this OS thread
    NoActiveRuntime,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::InvalidStackSize(size) => write!(f, "invalid stack size: {size} bytes"),
            Self::InvalidThread => f.write_str("no such thread"),
            Self::AlreadyQueued => f.write_str("thread is already current or queued"),
            Self::AlreadyRunning => f.write_str("a runtime is already running on this thread"),
            Self::NoActiveRuntime => f.write_str("no runtime is running on this thread"),
        }
    }
}

impl std::error::Error for ThreadError {}

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, ThreadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ThreadError::OutOfMemory.to_string(), "out of memory");
        assert_eq!(
            ThreadError::InvalidStackSize(12).to_string(),
            "invalid stack size: 12 bytes"
        );
    }
}
