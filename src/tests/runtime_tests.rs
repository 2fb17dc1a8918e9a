// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread lifecycle tests
//!
//! Create, enqueue, yield, exit and the return to the host.

use proptest::prelude::*;

use super::{record, take_events};
use crate::config::RuntimeConfig;
use crate::error::ThreadError;
use crate::sched::{
    thread_add_runqueue, thread_create, thread_exit, thread_self, thread_yield, with_runtime,
    Runtime, SchedulingPolicy,
};

/// Yield `rounds` times, logging `<id>.<round>` before each yield
fn rounds(rounds: usize) {
    let id = thread_self().unwrap().id();
    for round in 0..rounds {
        record(format!("{id}.{round}"));
        thread_yield();
    }
}

fn spawn_all(rt: &Runtime, args: &[usize]) {
    for &arg in args {
        let t = rt.thread_create(rounds, arg).unwrap();
        rt.thread_add_runqueue(t).unwrap();
    }
}

/// Test that round-robin rotates through the run queue
#[test]
fn test_round_robin_interleaves() {
    let rt = Runtime::new();
    spawn_all(&rt, &[3, 3, 3]);
    rt.start_threading().unwrap();

    assert_eq!(
        take_events(),
        ["1.0", "2.0", "3.0", "1.1", "2.1", "3.1", "1.2", "2.2", "3.2"]
    );
}

/// Test that the last exit returns to the host with everything freed
#[test]
fn test_exit_returns_to_host() {
    let rt = Runtime::new();
    spawn_all(&rt, &[2, 0, 5]);
    rt.start_threading().unwrap();

    let stats = rt.stats();
    assert_eq!(rt.thread_count(), 0);
    assert_eq!(stats.threads_created, 3);
    assert_eq!(stats.threads_exited, 3);
    assert_eq!(stats.yields, 7);
    assert_eq!(stats.stacks_allocated, 3);
    assert_eq!(stats.live_stacks(), 0);
    assert!(rt.current_thread().is_none());
}

/// Test that a lone thread can yield to itself
#[test]
fn test_single_thread_yields_to_itself() {
    let rt = Runtime::new();
    spawn_all(&rt, &[4]);
    rt.start_threading().unwrap();

    assert_eq!(take_events(), ["1.0", "1.1", "1.2", "1.3"]);
    // One dispatch to start, then one per yield
    assert_eq!(rt.stats().dispatches, 5);
}

/// Test the default policy: smallest ID first, whatever the queue order
#[test]
fn test_default_policy_runs_by_id() {
    let config = RuntimeConfig::default().with_policy(SchedulingPolicy::Default);
    let rt = Runtime::with_config(config).unwrap();
    let handles: Vec<_> = (0..3).map(|_| rt.thread_create(rounds, 2).unwrap()).collect();
    for &i in &[2, 0, 1] {
        rt.thread_add_runqueue(handles[i]).unwrap();
    }
    rt.start_threading().unwrap();

    assert_eq!(take_events(), ["1.0", "1.1", "2.0", "2.1", "3.0", "3.1"]);
}

fn exits_early(arg: usize) {
    record("start");
    if arg == 0 {
        thread_exit();
    }
    record("end");
}

/// Test that an explicit exit ends the thread on the spot
#[test]
fn test_explicit_exit() {
    let rt = Runtime::new();
    for arg in [0, 1] {
        let t = rt.thread_create(exits_early, arg).unwrap();
        rt.thread_add_runqueue(t).unwrap();
    }
    rt.start_threading().unwrap();

    assert_eq!(take_events(), ["start", "start", "end"]);
    assert_eq!(rt.stats().live_stacks(), 0);
}

fn parent(children: usize) {
    for _ in 0..children {
        let child = thread_create(rounds, 1).unwrap();
        thread_add_runqueue(child).unwrap();
    }
    record("parent");
    thread_yield();
    record("parent done");
}

/// Test creating threads from inside a running thread
#[test]
fn test_spawn_from_thread() {
    let rt = Runtime::new();
    let t = rt.thread_create(parent, 2).unwrap();
    rt.thread_add_runqueue(t).unwrap();
    rt.start_threading().unwrap();

    assert_eq!(take_events(), ["parent", "2.0", "3.0", "parent done"]);
    assert_eq!(rt.stats().threads_exited, 3);
}

fn reenter(_: usize) {
    let result = with_runtime(|rt| rt.start_threading()).unwrap();
    record(format!("{result:?}"));
}

/// Test that a runtime cannot be started from inside a thread
#[test]
fn test_start_threading_reentry() {
    let rt = Runtime::new();
    let t = rt.thread_create(reenter, 0).unwrap();
    rt.thread_add_runqueue(t).unwrap();
    rt.start_threading().unwrap();

    assert_eq!(take_events(), [format!("{:?}", Err::<(), _>(ThreadError::AlreadyRunning))]);
}

/// Test that a runtime can be started again after it drained
#[test]
fn test_restart_after_drain() {
    let rt = Runtime::new();
    spawn_all(&rt, &[1]);
    rt.start_threading().unwrap();
    spawn_all(&rt, &[1]);
    rt.start_threading().unwrap();

    assert_eq!(take_events(), ["1.0", "2.0"]);
    assert_eq!(rt.stats().live_stacks(), 0);
}

/// Test that a failed stack allocation is reported, not ignored
#[test]
fn test_create_out_of_memory() {
    let config = RuntimeConfig::default().with_stack_size(1 << 62);
    let rt = Runtime::with_config(config).unwrap();

    assert_eq!(rt.thread_create(rounds, 0), Err(ThreadError::OutOfMemory));
    assert_eq!(rt.thread_count(), 0);
    assert_eq!(rt.stats().threads_created, 0);
}

/// Test that a detached thread holds its stack and its tasks' stacks
#[test]
fn test_detached_thread_holds_stacks() {
    let rt = Runtime::new();
    let t = rt.thread_create(rounds, 1).unwrap();
    rt.thread_assign_task(t, rounds, 1).unwrap();
    rt.thread_assign_task(t, rounds, 2).unwrap();

    let stats = rt.stats();
    assert_eq!(stats.live_stacks(), 3);
    assert_eq!(stats.tasks_created, 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any mix of threads and yields drains completely and frees every stack
    #[test]
    fn prop_run_to_completion_frees_everything(
        yields in proptest::collection::vec(0usize..6, 1..8),
        policy in prop_oneof![
            Just(SchedulingPolicy::Default),
            Just(SchedulingPolicy::RoundRobin),
            Just(SchedulingPolicy::WeightedRoundRobin),
        ],
    ) {
        let rt = Runtime::with_config(RuntimeConfig::default().with_policy(policy)).unwrap();
        spawn_all(&rt, &yields);
        rt.start_threading().unwrap();

        let events = take_events();
        let stats = rt.stats();
        prop_assert_eq!(events.len(), yields.iter().sum::<usize>());
        prop_assert_eq!(stats.threads_exited, yields.len() as u64);
        prop_assert_eq!(stats.stacks_released, stats.stacks_allocated);
        prop_assert_eq!(rt.thread_count(), 0);
    }
}
