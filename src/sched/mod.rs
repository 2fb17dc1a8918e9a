// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler and thread management
//!
//! This module provides the runtime, its queues and the scheduling
//! policies it consults.
//!
//! # Example
//! ```
//! use uthreads::sched::{Runtime, SchedulingPolicy};
//! use uthreads::RuntimeConfig;
//!
//! fn job(_: usize) {}
//!
//! let config = RuntimeConfig::default().with_policy(SchedulingPolicy::ShortestJobFirst);
//! let rt = Runtime::with_config(config)?;
//! let t = rt.thread_create(job, 0)?;
//! rt.set_processing_time(t, 3)?;
//! rt.thread_add_runqueue(t)?;
//! rt.start_threading()?;
//! # Ok::<(), uthreads::ThreadError>(())
//! ```

pub mod clock;
pub mod policy;
pub mod scheduler;
pub mod state;
pub mod thread;

pub use clock::{Clock, ManualClock, SystemClock};
pub use policy::{PolicyFn, SchedArgs, SchedResult, SchedTable, SchedulingPolicy};
pub use scheduler::{
    thread_add_runqueue, thread_assign_task, thread_create, thread_exit, thread_release_at,
    thread_self, thread_yield, with_runtime, Runtime, RuntimeStats,
};
pub use state::{ReleaseQueue, RunQueue, Slot, ThreadState};
pub use thread::{EntryPoint, SchedInfo, ThreadHandle, ThreadId, NO_DEADLINE};
