// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Shortest-job-first

use super::{SchedArgs, SchedResult};

/// Run the ready thread with the least remaining time.
///
/// The slice covers the whole remaining time unless a waiting thread with
/// a strictly shorter job is released before it ends; the slice then stops
/// at that release, so the policy gets to reconsider.
pub fn schedule_sjf(args: &SchedArgs<'_>) -> SchedResult {
    let now = args.current_time;
    let shortest = args.run_queue.iter().min_by_key(|&slot| {
        let info = args.info(slot);
        (info.remaining_time, info.id)
    });

    let Some(slot) = shortest else {
        return args.idle_until_release();
    };

    let selected = args.info(slot);
    let mut allocated = selected.remaining_time;
    for (waiting, release) in args.release_queue.iter() {
        if release < now.saturating_add(allocated)
            && args.info(waiting).remaining_time < selected.remaining_time
        {
            allocated = release.saturating_sub(now);
        }
    }

    SchedResult::run(slot, allocated)
}
