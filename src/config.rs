// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime configuration

use static_assertions::const_assert;

use crate::error::{Result, ThreadError};
use crate::sched::SchedulingPolicy;

/// Default stack size for threads and tasks (64 KiB)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack the runtime accepts
pub const MIN_STACK_SIZE: usize = 4096;

/// Required stack size granularity (ABI stack alignment)
pub const STACK_ALIGN: usize = 16;

/// Default scheduling quantum in ticks
pub const DEFAULT_TIME_QUANTUM: u64 = 1;

const_assert!(DEFAULT_STACK_SIZE % STACK_ALIGN == 0);
const_assert!(MIN_STACK_SIZE % STACK_ALIGN == 0);
const_assert!(DEFAULT_STACK_SIZE >= MIN_STACK_SIZE);

/// Runtime configuration
///
/// ```ignore
/// let config = RuntimeConfig::default()
///     .with_policy(SchedulingPolicy::ShortestJobFirst)
///     .with_time_quantum(3);
/// let rt = Runtime::with_config(config)?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Size in bytes of every thread and task stack
    pub stack_size: usize,
    /// Base unit used to size weighted round-robin slices
    pub time_quantum: u64,
    /// Policy consulted at every scheduling point
    pub policy: SchedulingPolicy,
}

impl RuntimeConfig {
    /// Set the stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Set the time quantum
    pub fn with_time_quantum(mut self, time_quantum: u64) -> Self {
        self.time_quantum = time_quantum;
        self
    }

    /// Set the scheduling policy
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the configuration before a runtime is built from it
    pub fn validate(&self) -> Result<()> {
        let size = self.stack_size;
        if size < MIN_STACK_SIZE || size % STACK_ALIGN != 0 {
            return Err(ThreadError::InvalidStackSize(size));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            time_quantum: DEFAULT_TIME_QUANTUM,
            policy: SchedulingPolicy::RoundRobin,
        }
    }
}
