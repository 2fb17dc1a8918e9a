// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # uthreads - Cooperative user-level threads for Rustux
//!
//! A single-CPU thread runtime in user space. Threads run on their own
//! stacks and give up the CPU only by yielding or exiting; a pluggable
//! policy decides who runs next and for how long.
//!
//! - **Policies**: default (smallest ID), round-robin, weighted
//!   round-robin, shortest-job-first, least-slack-time, deadline-monotonic
//! - **Tasks**: nested units of work pushed onto a thread, run LIFO
//! - **Periodic jobs**: processing time, relative deadline and period per
//!   thread, with deadline-miss detection
//!
//! ## Layout
//!
//! ```text
//! src/
//! ├── arch/              # Context switch per architecture
//! │   ├── amd64/
//! │   ├── arm64/
//! │   └── riscv64/
//! ├── mm/                # Stack buffers
//! ├── sched/             # Runtime, queues, policies, clocks
//! ├── config.rs          # RuntimeConfig
//! └── error.rs           # ThreadError
//! ```
//!
//! ## Usage
//!
//! ```
//! use uthreads::{thread_yield, Runtime, RuntimeConfig, SchedulingPolicy};
//!
//! fn worker(rounds: usize) {
//!     for _ in 0..rounds {
//!         thread_yield();
//!     }
//! }
//!
//! let config = RuntimeConfig::default().with_policy(SchedulingPolicy::WeightedRoundRobin);
//! let rt = Runtime::with_config(config)?;
//! for rounds in 1..=3 {
//!     let t = rt.thread_create(worker, rounds)?;
//!     rt.set_weight(t, rounds as u64)?;
//!     rt.thread_add_runqueue(t)?;
//! }
//! rt.start_threading()?;
//! assert_eq!(rt.stats().live_stacks(), 0);
//! # Ok::<(), uthreads::ThreadError>(())
//! ```
//!
//! Logging goes through the `log` facade; install any logger to see
//! lifecycle events.

pub mod arch;
pub mod config;
pub mod error;
pub mod mm;
pub mod sched;

#[cfg(test)]
mod tests;

pub use config::RuntimeConfig;
pub use error::{Result, ThreadError};
pub use sched::{
    thread_add_runqueue, thread_assign_task, thread_create, thread_exit, thread_release_at,
    thread_self, thread_yield, with_runtime, Clock, ManualClock, Runtime, RuntimeStats,
    SchedArgs, SchedResult, SchedulingPolicy, SystemClock, ThreadHandle, ThreadId,
};
