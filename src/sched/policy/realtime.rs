// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Real-time policies: least-slack-time and deadline-monotonic
//!
//! Both policies share the same slice shaping. The selected thread gets its
//! whole remaining time, cut short at the release of any waiting thread
//! that would outrank it, and never past its own absolute deadline.

use super::{SchedArgs, SchedResult};
use crate::sched::state::Slot;

/// Shorten `allocated` to the first release that `outranks` the selection
///
/// `outranks(waiting, release)` is only asked about releases that fall
/// inside the current slice.
fn truncate_at_releases(
    args: &SchedArgs<'_>,
    mut allocated: u64,
    mut outranks: impl FnMut(Slot, u64) -> bool,
) -> u64 {
    let now = args.current_time;
    for (waiting, release) in args.release_queue.iter() {
        if release < now.saturating_add(allocated) && outranks(waiting, release) {
            allocated = release.saturating_sub(now);
        }
    }
    allocated
}

/// Least slack first
pub fn schedule_lst(args: &SchedArgs<'_>) -> SchedResult {
    let now = args.current_time;
    let least = args.run_queue.iter().min_by_key(|&slot| {
        let info = args.info(slot);
        (info.slack(now), info.id)
    });

    let Some(slot) = least else {
        return args.idle_until_release();
    };

    let selected = args.info(slot);
    let allocated = truncate_at_releases(args, selected.remaining_time, |waiting, release| {
        let waiting = args.info(waiting);
        // Slack of the selection at `release` if it keeps running until then
        let elapsed = release.saturating_sub(now) as i128;
        let selected_slack = selected.slack(release) + elapsed;
        (waiting.slack(release), waiting.id) < (selected_slack, selected.id)
    });

    SchedResult::run(slot, allocated.min(selected.current_deadline.saturating_sub(now)))
}

/// Shortest relative deadline first
///
/// A selection whose absolute deadline has already passed comes back with
/// a zero allocation: the runtime treats that as a deadline miss.
pub fn schedule_dm(args: &SchedArgs<'_>) -> SchedResult {
    let now = args.current_time;
    let priority = |slot: Slot| {
        let info = args.info(slot);
        (info.deadline, info.id)
    };

    let Some(slot) = args.run_queue.iter().min_by_key(|&slot| priority(slot)) else {
        return args.idle_until_release();
    };

    let selected = args.info(slot);
    if selected.current_deadline <= now {
        return SchedResult::run(slot, 0);
    }

    let allocated = truncate_at_releases(args, selected.remaining_time, |waiting, _| {
        priority(waiting) < priority(slot)
    });

    SchedResult::run(slot, allocated.min(selected.current_deadline - now))
}
