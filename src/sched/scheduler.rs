// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler implementation
//!
//! The [`Runtime`] owns every thread, both queues and the "current" slot.
//! At each scheduling point it charges the elapsed time to the outgoing
//! thread, moves due releases to the run queue, asks the configured
//! [`SchedulingPolicy`](super::SchedulingPolicy) for a decision and
//! switches to the active locus of the selection.
//!
//! # Example
//! ```
//! use uthreads::{Runtime, thread_yield};
//!
//! fn worker(n: usize) {
//!     for _ in 0..n {
//!         thread_yield();
//!     }
//! }
//!
//! let rt = Runtime::new();
//! let a = rt.thread_create(worker, 3)?;
//! let b = rt.thread_create(worker, 2)?;
//! rt.thread_add_runqueue(a)?;
//! rt.thread_add_runqueue(b)?;
//! rt.start_threading()?;
//! assert_eq!(rt.stats().threads_exited, 2);
//! # Ok::<(), uthreads::ThreadError>(())
//! ```
//!
//! # Suspended frames
//!
//! A context switch never happens while the runtime state is borrowed.
//! A locus that finishes cannot free its own stack, so it is parked as a
//! zombie and dropped by whoever runs next ([`Runtime::reap`]).

use core::cell::{Cell, RefCell, UnsafeCell};
use core::ptr;

use log::{debug, info, trace, warn};

use super::clock::{Clock, ManualClock};
use super::policy::SchedArgs;
use super::state::{ReleaseQueue, RunQueue, Slot, ThreadState};
use super::thread::{
    EntryPoint, LocusKind, Task, Thread, ThreadHandle, ThreadId, ThreadTable, NO_DEADLINE,
};
use crate::arch::{current_stack_pointer, switch_context, Context};
use crate::config::RuntimeConfig;
use crate::error::{Result, ThreadError};
use crate::mm::StackAllocator;

thread_local! {
    /// Runtime inside `start_threading` on this OS thread
    static ACTIVE: Cell<*const Runtime> = const { Cell::new(ptr::null()) };
}

/// Counters kept by a runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub threads_created: u64,
    pub threads_exited: u64,
    pub tasks_created: u64,
    pub tasks_completed: u64,
    /// Voluntary yields
    pub yields: u64,
    /// Selections handed a time slice
    pub dispatches: u64,
    /// Jobs abandoned after a zero-allocation miss signal
    pub deadline_misses: u64,
    /// Ticks spent idle on policy request
    pub idle_ticks: u64,
    pub stacks_allocated: usize,
    pub stacks_released: usize,
}

impl RuntimeStats {
    /// Stacks allocated and not yet freed
    pub fn live_stacks(&self) -> usize {
        self.stacks_allocated - self.stacks_released
    }
}

/// A locus that finished on its own stack, waiting to be freed
#[derive(Debug)]
enum Zombie {
    Thread(Thread),
    Task(Task),
}

struct RuntimeState {
    config: RuntimeConfig,
    threads: ThreadTable,
    run_queue: RunQueue,
    release_queue: ReleaseQueue,
    /// Running thread; in neither queue
    current: Option<Slot>,
    next_id: ThreadId,
    clock: Box<dyn Clock>,
    /// Clock reading when the current thread was dispatched
    slice_start: u64,
    /// Slice granted to the current thread
    allocated_time: u64,
    /// Thread held at the run-queue head with ticks left of its slice
    unspent_slice: Option<(Slot, u64)>,
    zombie: Option<Zombie>,
    stats: RuntimeStats,
    stacks: StackAllocator,
}

impl RuntimeState {
    fn create_thread(&mut self, entry: EntryPoint, arg: usize) -> Result<ThreadHandle> {
        let slot = self.threads.reserve_slot()?;
        self.run_queue.reserve_slot(slot)?;
        self.release_queue.reserve_slot(slot)?;
        let stack = self.stacks.allocate()?;

        let id = self.next_id;
        self.next_id += 1;
        let thread = Thread::new(id, entry, arg, stack, self.clock.now());
        let handle = self.threads.insert(slot, thread);
        self.stats.threads_created += 1;

        debug!(
            "thread {id}: created in slot {slot}, {} byte stack",
            self.stacks.stack_size()
        );
        Ok(handle)
    }

    fn detached_mut(&mut self, handle: ThreadHandle) -> Result<&mut Thread> {
        let slot = self.threads.resolve(handle)?;
        let thread = self.threads.thread_mut(slot);
        if thread.state != ThreadState::Detached {
            return Err(ThreadError::AlreadyQueued);
        }
        Ok(thread)
    }

    fn add_runqueue(&mut self, handle: ThreadHandle) -> Result<()> {
        self.detached_mut(handle)?.state = ThreadState::Ready;
        self.run_queue.push_back(handle.slot());
        debug!("thread {}: enqueued", handle.id());
        Ok(())
    }

    fn release_at(&mut self, handle: ThreadHandle, release: u64) -> Result<()> {
        let thread = self.detached_mut(handle)?;
        thread.state = ThreadState::Waiting;
        thread.sched.job_release = release;
        thread.sched.current_deadline = thread.sched.deadline_after(release);
        self.release_queue.push(handle.slot(), release);
        debug!("thread {}: parked until {release}", handle.id());
        Ok(())
    }

    fn assign_task(&mut self, handle: ThreadHandle, entry: EntryPoint, arg: usize) -> Result<()> {
        let slot = self.threads.resolve(handle)?;
        let stack = self.stacks.allocate()?;
        let thread = self.threads.thread_mut(slot);
        thread.push_task(Task::new(entry, arg, stack))?;
        self.stats.tasks_created += 1;

        trace!("thread {}: task pushed, depth {}", handle.id(), thread.task_depth());
        Ok(())
    }

    /// Put the outgoing thread back, charging it for its slice
    fn requeue(&mut self, slot: Slot, now: u64) {
        let elapsed = now.saturating_sub(self.slice_start);
        let thread = self.threads.thread_mut(slot);
        let info = &mut thread.sched;
        info.remaining_time = info.remaining_time.saturating_sub(elapsed);

        if info.remaining_time == 0 && info.period.is_some() {
            if let Some(release) = info.next_job() {
                trace!("thread {}: job done, next release {release}", info.id);
                thread.state = ThreadState::Waiting;
                self.release_queue.push(slot, release);
                return;
            }
        }

        thread.state = ThreadState::Ready;
        let unspent = self.allocated_time.saturating_sub(elapsed);
        if unspent > 0 && self.config.policy.holds_unspent_slice() {
            trace!("thread {}: keeps the head, {unspent} ticks left", thread.id());
            self.run_queue.push_front(slot);
            self.unspent_slice = Some((slot, unspent));
        } else {
            self.run_queue.push_back(slot);
        }
    }

    /// Release-queue entry due first at `now`
    fn next_due(&self, now: u64) -> Option<(Slot, u64)> {
        self.release_queue
            .iter()
            .filter(|&(_, release)| release <= now)
            .min_by_key(|&(slot, release)| (release, self.threads.thread(slot).id()))
    }

    fn release_due(&mut self, now: u64) {
        while let Some((slot, release)) = self.next_due(now) {
            self.release_queue.remove(slot);
            let thread = self.threads.thread_mut(slot);
            thread.state = ThreadState::Ready;
            self.run_queue.push_back(slot);
            trace!("thread {}: released at {now} (due {release})", thread.id());
        }
    }

    /// Give up on the current job of a thread that missed its deadline
    fn abandon_job(&mut self, slot: Slot, now: u64) {
        self.run_queue.remove(slot);
        let thread = self.threads.thread_mut(slot);
        let info = &mut thread.sched;
        warn!(
            "thread {}: missed deadline {} at {now}, {} ticks of work left",
            info.id, info.current_deadline, info.remaining_time
        );
        self.stats.deadline_misses += 1;

        match info.next_job() {
            Some(release) => {
                thread.state = ThreadState::Waiting;
                self.release_queue.push(slot, release);
            }
            None => {
                info.current_deadline = NO_DEADLINE;
                self.run_queue.push_back(slot);
            }
        }
    }

    /// Pick the next current thread
    ///
    /// Returns `None` once both queues are empty. Does not switch stacks.
    fn schedule(&mut self) -> Option<Slot> {
        if let Some(slot) = self.current.take() {
            let now = self.clock.now();
            self.requeue(slot, now);
        }

        loop {
            let now = self.clock.now();
            self.release_due(now);
            if self.run_queue.is_empty() && self.release_queue.is_empty() {
                return None;
            }
            self.run_queue.validate();
            self.release_queue.validate();
            debug_assert!(
                self.run_queue.iter().all(|slot| !self.release_queue.contains(slot)),
                "thread linked on both queues"
            );

            let result = self.config.policy.schedule(&SchedArgs {
                table: &self.threads,
                run_queue: &self.run_queue,
                release_queue: &self.release_queue,
                current_time: now,
                time_quantum: self.config.time_quantum,
            });

            let Some(slot) = result.scheduled else {
                let ticks = result.allocated_time.max(1);
                trace!("idle for {ticks} ticks at {now}");
                self.stats.idle_ticks += ticks;
                self.clock.idle(ticks);
                continue;
            };

            let allocated = match self.unspent_slice.take() {
                Some((held, unspent)) if held == slot => unspent,
                _ => result.allocated_time,
            };

            let deadline = self.threads.thread(slot).sched.current_deadline;
            if allocated == 0 && deadline <= now {
                self.abandon_job(slot, now);
                continue;
            }

            if !self.run_queue.remove(slot) {
                panic!(
                    "{} policy selected slot {slot}, which is not on the run queue",
                    self.config.policy.name()
                );
            }
            let thread = self.threads.thread_mut(slot);
            thread.state = ThreadState::Running;
            trace!("thread {}: dispatched for {allocated} ticks at {now}", thread.id());

            self.current = Some(slot);
            self.slice_start = now;
            self.allocated_time = allocated;
            self.stats.dispatches += 1;
            return Some(slot);
        }
    }

    /// Context to resume for `slot`, building a first frame if its active
    /// locus never ran
    fn dispatch_target(&self, slot: Slot) -> *const Context {
        let (kind, locus) = self.threads.thread(slot).active_locus();
        if !locus.is_captured() {
            // SAFETY: the locus never ran, so nothing lives on its stack.
            unsafe { locus.prepare(locus_main, kind) };
        }
        locus.context_ptr()
    }

    fn current_slot(&self, op: &str) -> Slot {
        match self.current {
            Some(slot) => slot,
            None => panic!("{op}: no current thread"),
        }
    }

    fn bury(&mut self, zombie: Zombie) {
        // A previous zombie would have been reaped on resume; dropping it
        // here is still safe since we run on another stack.
        drop(self.zombie.replace(zombie));
    }
}

/// Cooperative thread runtime
///
/// Build one, create threads, enqueue them and call
/// [`start_threading`](Self::start_threading). The runtime is confined to
/// the OS thread that created it.
pub struct Runtime {
    state: RefCell<RuntimeState>,
    /// Continuation of the `start_threading` caller
    outer: UnsafeCell<Context>,
    /// Throwaway save area for loci that never resume
    scratch: UnsafeCell<Context>,
}

impl Runtime {
    /// Runtime with the default configuration and a manual clock
    pub fn new() -> Self {
        Self::build(RuntimeConfig::default(), Box::new(ManualClock::new()))
    }

    /// Runtime with `config` and a manual clock
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        Self::with_clock(config, ManualClock::new())
    }

    /// Runtime with `config`, measuring time with `clock`
    pub fn with_clock(config: RuntimeConfig, clock: impl Clock + 'static) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, Box::new(clock)))
    }

    fn build(config: RuntimeConfig, clock: Box<dyn Clock>) -> Self {
        let slice_start = clock.now();
        Self {
            state: RefCell::new(RuntimeState {
                config,
                threads: ThreadTable::new(),
                run_queue: RunQueue::new(),
                release_queue: ReleaseQueue::new(),
                current: None,
                next_id: 1,
                clock,
                slice_start,
                allocated_time: 0,
                unspent_slice: None,
                zombie: None,
                stats: RuntimeStats::default(),
                stacks: StackAllocator::new(config.stack_size),
            }),
            outer: UnsafeCell::new(Context::new()),
            scratch: UnsafeCell::new(Context::new()),
        }
    }

    pub fn config(&self) -> RuntimeConfig {
        self.state.borrow().config
    }

    /// Create a thread that will run `entry(arg)` on its own stack
    ///
    /// The thread is in no queue until it is added to one.
    pub fn thread_create(&self, entry: EntryPoint, arg: usize) -> Result<ThreadHandle> {
        self.state.borrow_mut().create_thread(entry, arg)
    }

    /// Append a fresh thread to the run queue
    pub fn thread_add_runqueue(&self, thread: ThreadHandle) -> Result<()> {
        self.state.borrow_mut().add_runqueue(thread)
    }

    /// Park a fresh thread in the release queue until `release_time`
    pub fn thread_release_at(&self, thread: ThreadHandle, release_time: u64) -> Result<()> {
        self.state.borrow_mut().release_at(thread, release_time)
    }

    /// Push a task running `entry(arg)` on top of a thread's task chain
    ///
    /// The task starts the next time the thread is dispatched.
    pub fn thread_assign_task(&self, thread: ThreadHandle, entry: EntryPoint, arg: usize) -> Result<()> {
        self.state.borrow_mut().assign_task(thread, entry, arg)
    }

    fn update<R>(&self, thread: ThreadHandle, f: impl FnOnce(&mut Thread) -> R) -> Result<R> {
        let mut state = self.state.borrow_mut();
        let slot = state.threads.resolve(thread)?;
        Ok(f(state.threads.thread_mut(slot)))
    }

    /// Set the weighted round-robin weight
    pub fn set_weight(&self, thread: ThreadHandle, weight: u64) -> Result<()> {
        self.update(thread, |t| t.sched.weight = weight)
    }

    /// Set the execution time of each job; also resets the current job
    pub fn set_processing_time(&self, thread: ThreadHandle, ticks: u64) -> Result<()> {
        self.update(thread, |t| {
            t.sched.processing_time = ticks;
            t.sched.remaining_time = ticks;
        })
    }

    /// Set the relative deadline, counted from the current job's release
    pub fn set_deadline(&self, thread: ThreadHandle, deadline: u64) -> Result<()> {
        self.update(thread, |t| {
            t.sched.deadline = deadline;
            t.sched.current_deadline = t.sched.deadline_after(t.sched.job_release);
        })
    }

    /// Make a thread periodic with `jobs` jobs (at least one)
    pub fn set_period(&self, thread: ThreadHandle, period: u64, jobs: u32) -> Result<()> {
        self.update(thread, |t| {
            t.sched.period = Some(period);
            t.sched.jobs_left = jobs.max(1);
        })
    }

    /// Handle of the running thread
    pub fn current_thread(&self) -> Option<ThreadHandle> {
        let state = self.state.borrow();
        state.current.and_then(|slot| state.threads.handle(slot))
    }

    /// ID of the running thread
    pub fn current_id(&self) -> Option<ThreadId> {
        self.current_thread().map(|handle| handle.id())
    }

    /// Current clock reading
    pub fn now(&self) -> u64 {
        self.state.borrow().clock.now()
    }

    /// Slice granted to the running thread by the last scheduling decision
    ///
    /// Advisory: nothing preempts a thread that outruns it.
    pub fn allocated_time(&self) -> u64 {
        self.state.borrow().allocated_time
    }

    /// Remaining execution time of a thread's current job
    pub fn remaining_time(&self, thread: ThreadHandle) -> Result<u64> {
        self.update(thread, |t| t.sched.remaining_time)
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.state.borrow().threads.len()
    }

    pub fn stats(&self) -> RuntimeStats {
        let state = self.state.borrow();
        RuntimeStats {
            stacks_allocated: state.stacks.allocated(),
            stacks_released: state.stacks.released(),
            ..state.stats
        }
    }

    /// Run threads until both queues are empty
    ///
    /// Returns immediately when nothing was enqueued.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if a runtime is already threading on this OS thread.
    pub fn start_threading(&self) -> Result<()> {
        if !active_runtime().is_null() {
            return Err(ThreadError::AlreadyRunning);
        }

        let target = {
            let mut state = self.state.borrow_mut();
            let Some(slot) = state.schedule() else {
                debug!("start_threading: nothing to run");
                return Ok(());
            };
            info!(
                "threading started: {} threads, {} policy",
                state.threads.len(),
                state.config.policy.name()
            );
            state.dispatch_target(slot)
        };

        let _active = ActiveGuard::register(self);
        // SAFETY: `outer` is only resumed by the last exit, while `self`
        // is still borrowed by this call.
        unsafe { switch_context(self.outer.get(), target) };
        self.reap();

        let state = self.state.borrow();
        info!(
            "threading finished at {}: {} threads exited, {} deadline misses",
            state.clock.now(),
            state.stats.threads_exited,
            state.stats.deadline_misses
        );
        Ok(())
    }

    /// Suspend the running locus and dispatch whatever the policy picks
    ///
    /// # Panics
    ///
    /// If there is no current thread, or the caller runs on a stack that
    /// belongs to none of its loci.
    pub fn yield_now(&self) {
        let (from, to) = {
            let mut state = self.state.borrow_mut();
            let slot = state.current_slot("thread_yield");
            let sp = current_stack_pointer();
            match state.threads.thread(slot).locus_at(sp) {
                Some((_, locus)) => locus.mark_captured(),
                None => panic!("thread_yield: stack pointer {sp:#x} outside every locus"),
            }
            state.stats.yields += 1;

            let Some(next) = state.schedule() else {
                panic!("thread_yield: yielding thread vanished from the queues");
            };
            let from = match state.threads.thread(slot).locus_at(sp) {
                Some((_, locus)) => locus.context_ptr(),
                None => panic!("thread_yield: locus lost while scheduling"),
            };
            (from, state.dispatch_target(next))
        };

        // SAFETY: `from` is the running locus; `to` was captured or just
        // prepared. No borrow of the state is held across the switch.
        unsafe { switch_context(from, to) };
        self.reap();
    }

    /// Terminate the running thread and everything stacked on it
    fn exit_current(&self) -> ! {
        let target = {
            let mut state = self.state.borrow_mut();
            let slot = state.current_slot("thread_exit");
            state.current = None;
            let Some(thread) = state.threads.remove(slot) else {
                panic!("thread_exit: slot {slot} is empty");
            };
            debug!(
                "thread {}: exited with {} pending tasks",
                thread.id(),
                thread.task_depth()
            );
            state.stats.threads_exited += 1;
            state.bury(Zombie::Thread(thread));

            match state.schedule() {
                Some(next) => state.dispatch_target(next),
                None => self.outer.get().cast_const(),
            }
        };

        // SAFETY: nothing resumes `scratch`; the exiting stack stays
        // allocated until the next locus reaps it.
        unsafe { switch_context(self.scratch.get(), target) };
        panic!("thread_exit: exited thread resumed");
    }

    /// Drop the task that just returned and resume its thread directly
    fn finish_task(&self) -> ! {
        let target = {
            let mut state = self.state.borrow_mut();
            let slot = state.current_slot("task completion");
            let sp = current_stack_pointer();
            let thread = state.threads.thread_mut(slot);
            let Some(task) = thread.remove_task_at(sp) else {
                panic!("task completion: stack pointer {sp:#x} outside every task");
            };
            trace!("thread {}: task done, depth {}", thread.id(), thread.task_depth());
            state.stats.tasks_completed += 1;
            state.bury(Zombie::Task(task));
            state.dispatch_target(slot)
        };

        // SAFETY: as in `exit_current`.
        unsafe { switch_context(self.scratch.get(), target) };
        panic!("task completion: finished task resumed");
    }

    /// Free the locus that finished before the last switch, if any
    pub fn reap(&self) {
        let zombie = self.state.borrow_mut().zombie.take();
        if let Some(zombie) = zombie {
            match &zombie {
                Zombie::Thread(thread) => trace!("thread {}: reaped", thread.id()),
                Zombie::Task(task) => trace!("task {}: reaped", task.locus().entry().1),
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of a runtime as the active one of this OS thread
struct ActiveGuard;

impl ActiveGuard {
    fn register(runtime: &Runtime) -> Self {
        ACTIVE.with(|active| active.set(runtime));
        ActiveGuard
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(ptr::null()));
    }
}

fn active_runtime() -> *const Runtime {
    ACTIVE.with(Cell::get)
}

/// Run `f` against the runtime threading on this OS thread
pub fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> Result<R> {
    let runtime = active_runtime();
    if runtime.is_null() {
        return Err(ThreadError::NoActiveRuntime);
    }
    // SAFETY: the pointer is set only while `start_threading` borrows the
    // runtime, and cleared before that call returns.
    Ok(f(unsafe { &*runtime }))
}

/// Entry of every fresh locus
extern "C" fn locus_main(kind: usize) -> ! {
    let kind = LocusKind::from_raw(kind);
    let runtime = match with_runtime(|rt| rt as *const Runtime) {
        Ok(runtime) => runtime,
        Err(err) => panic!("locus started outside start_threading: {err}"),
    };
    // SAFETY: see `with_runtime`; the runtime outlives every locus.
    let runtime = unsafe { &*runtime };
    runtime.reap();

    let (entry, arg) = {
        let state = runtime.state.borrow();
        let slot = state.current_slot("locus start");
        state.threads.thread(slot).active_locus().1.entry()
    };
    entry(arg);

    match kind {
        LocusKind::Thread => runtime.exit_current(),
        LocusKind::Task => runtime.finish_task(),
    }
}

/// Create a thread on the active runtime
pub fn thread_create(entry: EntryPoint, arg: usize) -> Result<ThreadHandle> {
    with_runtime(|rt| rt.thread_create(entry, arg))?
}

/// Append a fresh thread to the active runtime's run queue
pub fn thread_add_runqueue(thread: ThreadHandle) -> Result<()> {
    with_runtime(|rt| rt.thread_add_runqueue(thread))?
}

/// Park a fresh thread of the active runtime until `release_time`
pub fn thread_release_at(thread: ThreadHandle, release_time: u64) -> Result<()> {
    with_runtime(|rt| rt.thread_release_at(thread, release_time))?
}

/// Push a task onto a thread of the active runtime
pub fn thread_assign_task(thread: ThreadHandle, entry: EntryPoint, arg: usize) -> Result<()> {
    with_runtime(|rt| rt.thread_assign_task(thread, entry, arg))?
}

/// Handle of the calling thread
pub fn thread_self() -> Result<ThreadHandle> {
    with_runtime(Runtime::current_thread)?.ok_or(ThreadError::NoActiveRuntime)
}

/// Give the CPU to whatever the policy picks next
///
/// # Panics
///
/// When called outside a running thread.
pub fn thread_yield() {
    if let Err(err) = with_runtime(Runtime::yield_now) {
        panic!("thread_yield: {err}");
    }
}

/// Terminate the calling thread
///
/// # Panics
///
/// When called outside a running thread.
pub fn thread_exit() -> ! {
    match with_runtime(|rt| rt as *const Runtime) {
        // SAFETY: see `with_runtime`.
        Ok(runtime) => unsafe { &*runtime }.exit_current(),
        Err(err) => panic!("thread_exit: {err}"),
    }
}
