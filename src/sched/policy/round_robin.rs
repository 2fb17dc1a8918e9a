// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Non-real-time policies: default, round-robin, weighted round-robin
//!
//! Round-robin rotation is done by the runtime, which puts the outgoing
//! thread back at the tail of the run queue. Under WRR a thread whose
//! slice has not expired goes back to the head instead. These policies only
//! look at the head and size its slice.

use super::{SchedArgs, SchedResult};

/// Pick the thread with the smallest ID and give it its whole remaining
/// time.
pub fn schedule_default(args: &SchedArgs<'_>) -> SchedResult {
    let smallest = args.run_queue.iter().min_by_key(|&slot| args.info(slot).id);

    match smallest {
        Some(slot) => SchedResult::run(slot, args.info(slot).remaining_time),
        None => SchedResult::idle(1),
    }
}

/// Run the head of the run queue for one quantum.
pub fn schedule_rr(args: &SchedArgs<'_>) -> SchedResult {
    match args.run_queue.front() {
        Some(slot) => SchedResult::run(slot, args.time_quantum),
        None => SchedResult::idle(1),
    }
}

/// Run the head of the run queue for `weight` quanta, or less if its job
/// finishes sooner.
pub fn schedule_wrr(args: &SchedArgs<'_>) -> SchedResult {
    let Some(slot) = args.run_queue.front() else {
        return SchedResult::idle(1);
    };

    let info = args.info(slot);
    let slice = info.weight.saturating_mul(args.time_quantum);
    SchedResult::run(slot, info.remaining_time.min(slice))
}
