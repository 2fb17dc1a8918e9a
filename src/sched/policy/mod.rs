// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduling policies
//!
//! A policy is a pure function from a read-only view of the queues and the
//! clock ([`SchedArgs`]) to a decision ([`SchedResult`]): which run-queue
//! entry runs next, and for how many ticks before the policy is asked
//! again. Policies never touch execution state; the runtime applies the
//! decision.
//!
//! Whenever the primary criterion of a policy is equal across candidates,
//! the smaller thread ID wins.
//!
//! # Policies
//!
//! | Policy | Pick | Allocation |
//! |--------|------|------------|
//! | Default | smallest ID | remaining time |
//! | RoundRobin | run-queue head | one quantum |
//! | WeightedRoundRobin | run-queue head | `min(remaining, weight * quantum)` |
//! | ShortestJobFirst | least remaining time | up to the release of a shorter job |
//! | LeastSlackTime | least slack | up to a release with less slack, capped at the deadline |
//! | DeadlineMonotonic | shortest relative deadline | up to a higher-priority release, capped at the deadline |

use core::fmt;

use super::state::{ReleaseQueue, RunQueue, Slot};
use super::thread::SchedInfo;

mod realtime;
mod round_robin;
mod sjf;

pub use realtime::{schedule_dm, schedule_lst};
pub use round_robin::{schedule_default, schedule_rr, schedule_wrr};
pub use sjf::schedule_sjf;

/// Read access to the scheduling metadata of queued slots
pub trait SchedTable {
    fn sched_info(&self, slot: Slot) -> &SchedInfo;
}

impl SchedTable for Vec<SchedInfo> {
    fn sched_info(&self, slot: Slot) -> &SchedInfo {
        &self[slot]
    }
}

/// Policy input
#[derive(Clone, Copy)]
pub struct SchedArgs<'a> {
    /// Metadata of every slot linked on either queue
    pub table: &'a dyn SchedTable,
    pub run_queue: &'a RunQueue,
    pub release_queue: &'a ReleaseQueue,
    pub current_time: u64,
    pub time_quantum: u64,
}

impl<'a> SchedArgs<'a> {
    /// Metadata of a queued slot
    pub fn info(&self, slot: Slot) -> &'a SchedInfo {
        self.table.sched_info(slot)
    }

    /// Release-queue entry released first, ties going to the smaller ID
    pub fn earliest_release(&self) -> Option<(Slot, u64)> {
        self.release_queue
            .iter()
            .min_by_key(|&(slot, release)| (release, self.info(slot).id))
    }

    /// Idle until the earliest release, or for one tick if nothing waits
    pub fn idle_until_release(&self) -> SchedResult {
        match self.earliest_release() {
            Some((_, release)) => SchedResult::idle(release.saturating_sub(self.current_time)),
            None => SchedResult::idle(1),
        }
    }
}

/// Policy output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedResult {
    /// Chosen run-queue entry; `None` is the run-queue sentinel, i.e. idle
    pub scheduled: Option<Slot>,
    /// Ticks to run the choice before the policy is invoked again
    pub allocated_time: u64,
}

impl SchedResult {
    pub const fn run(slot: Slot, allocated_time: u64) -> Self {
        Self {
            scheduled: Some(slot),
            allocated_time,
        }
    }

    pub const fn idle(allocated_time: u64) -> Self {
        Self {
            scheduled: None,
            allocated_time,
        }
    }

    pub const fn is_idle(&self) -> bool {
        self.scheduled.is_none()
    }
}

/// A policy function
pub type PolicyFn = fn(&SchedArgs<'_>) -> SchedResult;

/// Scheduling policies
#[derive(Clone, Copy)]
pub enum SchedulingPolicy {
    /// Smallest thread ID first
    Default,
    /// Advance to the next ring entry every scheduling point
    RoundRobin,
    /// Weighted round-robin
    WeightedRoundRobin,
    /// Shortest job first
    ShortestJobFirst,
    /// Least slack time
    LeastSlackTime,
    /// Deadline monotonic
    DeadlineMonotonic,
    /// A caller-supplied policy
    Custom(PolicyFn),
}

impl SchedulingPolicy {
    /// Decide what runs next
    pub fn schedule(&self, args: &SchedArgs<'_>) -> SchedResult {
        match self {
            Self::Default => schedule_default(args),
            Self::RoundRobin => schedule_rr(args),
            Self::WeightedRoundRobin => schedule_wrr(args),
            Self::ShortestJobFirst => schedule_sjf(args),
            Self::LeastSlackTime => schedule_lst(args),
            Self::DeadlineMonotonic => schedule_dm(args),
            Self::Custom(policy) => policy(args),
        }
    }

    /// Whether a thread that yields before its slice runs out keeps the
    /// head of the run queue for the rest of the slice
    pub const fn holds_unspent_slice(&self) -> bool {
        matches!(self, Self::WeightedRoundRobin)
    }

    /// Short name used in log lines
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::RoundRobin => "rr",
            Self::WeightedRoundRobin => "wrr",
            Self::ShortestJobFirst => "sjf",
            Self::LeastSlackTime => "lst",
            Self::DeadlineMonotonic => "dm",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::RoundRobin
    }
}


#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::fixture::Queues;
    use super::*;

    #[test]
    fn test_dispatch_by_variant() {
        let mut q = Queues::new();
        let a = q.ready(2, 4);
        q.ready(1, 9);

        let args = q.args(0, 3);
        assert_eq!(SchedulingPolicy::RoundRobin.schedule(&args), SchedResult::run(a, 3));
        assert_eq!(SchedulingPolicy::Default.schedule(&args), SchedResult::run(1, 9));
        assert_eq!(SchedulingPolicy::ShortestJobFirst.schedule(&args), SchedResult::run(a, 4));
    }

    #[test]
    fn test_custom_policy() {
        fn always_idle(_: &SchedArgs<'_>) -> SchedResult {
            SchedResult::idle(42)
        }

        let mut q = Queues::new();
        q.ready(1, 1);
        let policy = SchedulingPolicy::Custom(always_idle);
        assert_eq!(policy.schedule(&q.args(0, 1)), SchedResult::idle(42));
        assert_eq!(policy.name(), "custom");
    }

    #[test]
    fn test_earliest_release_tie_breaks_on_id() {
        let mut q = Queues::new();
        q.waiting(7, 1, 5);
        let e = q.waiting(3, 1, 5);
        q.waiting(1, 1, 9);
        assert_eq!(q.args(0, 1).earliest_release(), Some((e, 5)));
    }

    /// Threads with equal primary keys: (id, remaining, relative deadline)
    fn tied_threads() -> impl Strategy<Value = (Vec<u64>, u64, u64, u64)> {
        (
            proptest::collection::hash_set(1u64..1000, 2..8),
            1u64..50,
            1u64..50,
            0u64..20,
        )
            .prop_map(|(ids, remaining, deadline, now)| {
                // Hash order: the smallest ID is rarely linked first
                (ids.into_iter().collect(), remaining, deadline, now)
            })
    }

    /// Arbitrary run queue (remaining, relative deadline, absolute deadline)
    /// plus release queue (remaining, relative deadline, release offset)
    fn workload() -> impl Strategy<Value = (u64, Vec<(u64, u64, u64)>, Vec<(u64, u64, u64)>)> {
        (
            0u64..100,
            proptest::collection::vec((1u64..30, 1u64..60, 0u64..150), 1..8),
            proptest::collection::vec((1u64..30, 1u64..60, 1u64..40), 0..6),
        )
    }

    fn build(now: u64, ready: &[(u64, u64, u64)], waiting: &[(u64, u64, u64)]) -> Queues {
        let mut q = Queues::new();
        let mut id = 1;
        for &(remaining, relative, absolute) in ready {
            let slot = q.ready(id, remaining);
            q.deadline(slot, relative, absolute);
            id += 1;
        }
        for &(remaining, relative, offset) in waiting {
            let release = now + offset;
            let slot = q.waiting(id, remaining, release);
            q.deadline(slot, relative, release + relative);
            id += 1;
        }
        q
    }

    proptest! {
        #[test]
        fn prop_ties_go_to_smallest_id((ids, remaining, deadline, now) in tied_threads()) {
            let mut q = Queues::new();
            for &id in &ids {
                let slot = q.ready(id, remaining);
                q.deadline(slot, deadline, now + deadline + remaining);
            }
            let smallest = *ids.iter().min().unwrap();
            let args = q.args(now, 2);

            for policy in [
                SchedulingPolicy::Default,
                SchedulingPolicy::ShortestJobFirst,
                SchedulingPolicy::LeastSlackTime,
                SchedulingPolicy::DeadlineMonotonic,
            ] {
                let slot = policy.schedule(&args).scheduled.unwrap();
                prop_assert_eq!(q.table[slot].id, smallest, "{:?}", policy);
            }
        }

        #[test]
        fn prop_realtime_never_runs_past_deadline((now, ready, waiting) in workload()) {
            let q = build(now, &ready, &waiting);
            let args = q.args(now, 1);

            for policy in [SchedulingPolicy::LeastSlackTime, SchedulingPolicy::DeadlineMonotonic] {
                let result = policy.schedule(&args);
                let slot = result.scheduled.unwrap();
                let deadline = q.table[slot].current_deadline;
                prop_assert!(
                    now + result.allocated_time <= deadline.max(now),
                    "{:?} allocated {} at {} past deadline {}",
                    policy, result.allocated_time, now, deadline
                );
            }
        }

        #[test]
        fn prop_dm_zero_allocation_iff_deadline_missed((now, ready, waiting) in workload()) {
            let q = build(now, &ready, &waiting);
            let result = schedule_dm(&q.args(now, 1));
            let slot = result.scheduled.unwrap();
            let missed = q.table[slot].current_deadline <= now;
            prop_assert_eq!(result.allocated_time == 0, missed);
        }

        #[test]
        fn prop_policies_are_pure((now, ready, waiting) in workload()) {
            let q = build(now, &ready, &waiting);
            let args = q.args(now, 3);
            for policy in [
                SchedulingPolicy::Default,
                SchedulingPolicy::WeightedRoundRobin,
                SchedulingPolicy::ShortestJobFirst,
                SchedulingPolicy::LeastSlackTime,
                SchedulingPolicy::DeadlineMonotonic,
            ] {
                prop_assert_eq!(policy.schedule(&args), policy.schedule(&args));
            }
            prop_assert_eq!(q.run_queue.len(), ready.len());
            prop_assert_eq!(q.release_queue.len(), waiting.len());
        }
    }
}
