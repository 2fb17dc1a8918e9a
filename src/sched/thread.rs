// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread representation and management
//!
//! Defines the Thread and Task structs, their scheduling metadata and the
//! slot table that owns every live thread.

use core::cell::{Cell, UnsafeCell};

use bitflags::bitflags;

use super::policy::SchedTable;
use super::state::{Slot, ThreadState};
use crate::arch::Context;
use crate::error::{Result, ThreadError};
use crate::mm::Stack;

/// Thread ID type
pub type ThreadId = u64;

/// Entry procedure of a thread or task
pub type EntryPoint = fn(usize);

/// Relative or absolute deadline of a thread without one
pub const NO_DEADLINE: u64 = u64::MAX;

bitflags! {
    /// Execution-locus flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LocusFlags: u8 {
        /// A first frame was built and entered
        const STARTED = 1 << 0;
        /// The context has been captured by a yield at least once
        const CONTEXT_SAVED = 1 << 1;
    }
}

/// Which kind of locus a fresh frame starts
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocusKind {
    Thread = 0,
    Task = 1,
}

impl LocusKind {
    /// Create from raw value
    pub const fn from_raw(raw: usize) -> Self {
        match raw {
            1 => Self::Task,
            _ => Self::Thread,
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> usize {
        self as usize
    }
}

/// Something that runs on its own stack: a thread's own flow or a task
#[derive(Debug)]
pub struct Locus {
    entry: EntryPoint,
    arg: usize,
    stack: Stack,
    context: UnsafeCell<Context>,
    flags: Cell<LocusFlags>,
}

impl Locus {
    fn new(entry: EntryPoint, arg: usize, stack: Stack) -> Self {
        Self {
            entry,
            arg,
            stack,
            context: UnsafeCell::new(Context::new()),
            flags: Cell::new(LocusFlags::empty()),
        }
    }

    /// Entry procedure and its argument
    pub fn entry(&self) -> (EntryPoint, usize) {
        (self.entry, self.arg)
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Raw pointer to the saved context, for the switch primitive
    pub fn context_ptr(&self) -> *mut Context {
        self.context.get()
    }

    /// Check whether the context holds a resumable capture
    pub fn is_captured(&self) -> bool {
        self.flags.get().contains(LocusFlags::CONTEXT_SAVED)
    }

    pub fn mark_captured(&self) {
        self.flags.set(self.flags.get() | LocusFlags::CONTEXT_SAVED);
    }

    /// Build the first frame of this locus
    ///
    /// # Safety
    ///
    /// The locus must never have been started; its stack is overwritten.
    pub unsafe fn prepare(&self, start: crate::arch::LocusEntry, kind: LocusKind) {
        let flags = self.flags.get();
        assert!(
            !flags.intersects(LocusFlags::STARTED | LocusFlags::CONTEXT_SAVED),
            "locus: entry procedure started twice"
        );
        (*self.context.get()).prepare(self.stack.top(), start, kind.into_raw());
        self.flags.set(flags | LocusFlags::STARTED);
    }
}

/// Scheduling metadata of a thread
///
/// All times are in ticks of the runtime clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedInfo {
    /// Thread ID, used for tie-breaking only
    pub id: ThreadId,
    /// Weighted round-robin weight
    pub weight: u64,
    /// Execution time left in the current job
    pub remaining_time: u64,
    /// Execution time of one job
    pub processing_time: u64,
    /// Relative deadline
    pub deadline: u64,
    /// Absolute deadline of the current job
    pub current_deadline: u64,
    /// Release time of the current job
    pub job_release: u64,
    /// Job period for periodic threads
    pub period: Option<u64>,
    /// Jobs left, including the current one
    pub jobs_left: u32,
}

impl SchedInfo {
    /// Metadata of a fresh thread released at `now`
    pub fn new(id: ThreadId, now: u64) -> Self {
        Self {
            id,
            weight: 1,
            remaining_time: 0,
            processing_time: 0,
            deadline: NO_DEADLINE,
            current_deadline: NO_DEADLINE,
            job_release: now,
            period: None,
            jobs_left: 1,
        }
    }

    /// Slack at time `at`: deadline minus time minus remaining work
    pub fn slack(&self, at: u64) -> i128 {
        self.current_deadline as i128 - at as i128 - self.remaining_time as i128
    }

    pub fn has_deadline(&self) -> bool {
        self.current_deadline != NO_DEADLINE
    }

    /// Absolute deadline of a job released at `release`
    pub fn deadline_after(&self, release: u64) -> u64 {
        match self.deadline {
            NO_DEADLINE => NO_DEADLINE,
            deadline => release.saturating_add(deadline),
        }
    }

    /// Move to the next periodic job
    ///
    /// Returns the release time of that job, or `None` if the thread is
    /// not periodic or has no jobs left.
    pub fn next_job(&mut self) -> Option<u64> {
        let period = self.period?;
        if self.jobs_left <= 1 {
            self.jobs_left = 0;
            return None;
        }

        self.jobs_left -= 1;
        self.job_release = self.job_release.saturating_add(period);
        self.remaining_time = self.processing_time;
        self.current_deadline = self.deadline_after(self.job_release);
        Some(self.job_release)
    }
}

/// A nested unit of execution pushed onto a thread
#[derive(Debug)]
pub struct Task {
    locus: Locus,
}

impl Task {
    pub fn new(entry: EntryPoint, arg: usize, stack: Stack) -> Self {
        Self {
            locus: Locus::new(entry, arg, stack),
        }
    }

    pub fn locus(&self) -> &Locus {
        &self.locus
    }
}

/// Thread structure
///
/// Owns its stack and its task chain. The chain is LIFO: the last task is
/// the top and the only one that may run, each task resting on the one
/// pushed before it.
#[derive(Debug)]
pub struct Thread {
    locus: Locus,
    /// Scheduling metadata
    pub sched: SchedInfo,
    /// Queue membership
    pub state: ThreadState,
    tasks: Vec<Task>,
}

impl Thread {
    /// Create a new thread
    pub fn new(id: ThreadId, entry: EntryPoint, arg: usize, stack: Stack, now: u64) -> Self {
        Self {
            locus: Locus::new(entry, arg, stack),
            sched: SchedInfo::new(id, now),
            state: ThreadState::Detached,
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.sched.id
    }

    /// The thread's own flow
    pub fn locus(&self) -> &Locus {
        &self.locus
    }

    /// Push a task as the new top of the chain
    pub fn push_task(&mut self, task: Task) -> Result<()> {
        self.tasks
            .try_reserve(1)
            .map_err(|_| ThreadError::OutOfMemory)?;
        self.tasks.push(task);
        Ok(())
    }

    pub fn top_task(&self) -> Option<&Task> {
        self.tasks.last()
    }

    /// Number of pending tasks
    pub fn task_depth(&self) -> usize {
        self.tasks.len()
    }

    /// The locus that runs when this thread is dispatched
    pub fn active_locus(&self) -> (LocusKind, &Locus) {
        match self.tasks.last() {
            Some(task) => (LocusKind::Task, &task.locus),
            None => (LocusKind::Thread, &self.locus),
        }
    }

    /// Find the locus whose stack holds `sp`
    ///
    /// Usually the top task or the thread itself, but a locus that pushes
    /// a task and then yields keeps running beneath the new top.
    pub fn locus_at(&self, sp: usize) -> Option<(LocusKind, &Locus)> {
        if self.locus.stack.contains(sp) {
            return Some((LocusKind::Thread, &self.locus));
        }
        self.tasks
            .iter()
            .rev()
            .find(|task| task.locus.stack.contains(sp))
            .map(|task| (LocusKind::Task, &task.locus))
    }

    /// Unlink the task whose stack holds `sp`
    pub fn remove_task_at(&mut self, sp: usize) -> Option<Task> {
        let pos = self
            .tasks
            .iter()
            .rposition(|task| task.locus.stack.contains(sp))?;
        Some(self.tasks.remove(pos))
    }
}

/// Copyable reference to a thread of a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle {
    slot: Slot,
    id: ThreadId,
}

impl ThreadHandle {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }
}

/// Single-owner arena of live threads
#[derive(Debug, Default)]
pub struct ThreadTable {
    slots: Vec<Option<Thread>>,
    free: Vec<Slot>,
    count: usize,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the slot the next thread will occupy, growing the table if
    /// needed
    ///
    /// The slot stays on the free list until [`insert`](Self::insert), so
    /// a creation that fails later leaves nothing behind.
    pub fn reserve_slot(&mut self) -> Result<Slot> {
        if let Some(&slot) = self.free.last() {
            return Ok(slot);
        }

        let slot = self.slots.len();
        self.slots
            .try_reserve(1)
            .map_err(|_| ThreadError::OutOfMemory)?;
        // Room for every slot on the free list: releasing never allocates.
        self.free
            .try_reserve(slot + 1 - self.free.len())
            .map_err(|_| ThreadError::OutOfMemory)?;
        self.slots.push(None);
        self.free.push(slot);
        Ok(slot)
    }

    /// Store a thread in a slot returned by [`reserve_slot`](Self::reserve_slot)
    pub fn insert(&mut self, slot: Slot, thread: Thread) -> ThreadHandle {
        assert!(self.slots[slot].is_none(), "thread table: slot {slot} is occupied");
        if self.free.last() == Some(&slot) {
            self.free.pop();
        }

        let handle = ThreadHandle {
            slot,
            id: thread.id(),
        };
        self.slots[slot] = Some(thread);
        self.count += 1;
        handle
    }

    /// Take a thread out of the table
    pub fn remove(&mut self, slot: Slot) -> Option<Thread> {
        let thread = self.slots.get_mut(slot)?.take()?;
        self.free.push(slot);
        self.count -= 1;
        Some(thread)
    }

    pub fn get(&self, slot: Slot) -> Option<&Thread> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Thread> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Look up a live thread; broken invariants abort
    pub fn thread(&self, slot: Slot) -> &Thread {
        match self.get(slot) {
            Some(thread) => thread,
            None => panic!("thread table: slot {slot} is empty"),
        }
    }

    pub fn thread_mut(&mut self, slot: Slot) -> &mut Thread {
        match self.get_mut(slot) {
            Some(thread) => thread,
            None => panic!("thread table: slot {slot} is empty"),
        }
    }

    /// Handle of the thread in `slot`
    pub fn handle(&self, slot: Slot) -> Option<ThreadHandle> {
        self.get(slot).map(|thread| ThreadHandle {
            slot,
            id: thread.id(),
        })
    }

    /// Check that a handle still names the thread it was created for
    pub fn resolve(&self, handle: ThreadHandle) -> Result<Slot> {
        match self.get(handle.slot) {
            Some(thread) if thread.id() == handle.id => Ok(handle.slot),
            _ => Err(ThreadError::InvalidThread),
        }
    }

    /// Number of live threads
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl SchedTable for ThreadTable {
    fn sched_info(&self, slot: Slot) -> &SchedInfo {
        &self.thread(slot).sched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::StackAllocator;

    fn noop(_: usize) {}

    #[test]
    fn test_sched_info_defaults() {
        let info = SchedInfo::new(7, 20);
        assert_eq!(info.id, 7);
        assert_eq!(info.weight, 1);
        assert_eq!(info.job_release, 20);
        assert!(!info.has_deadline());
    }

    #[test]
    fn test_slack() {
        let mut info = SchedInfo::new(1, 0);
        info.current_deadline = 10;
        info.remaining_time = 4;
        assert_eq!(info.slack(3), 3);
        assert_eq!(info.slack(9), -3);
    }

    #[test]
    fn test_next_job_advances_period() {
        let mut info = SchedInfo::new(1, 0);
        info.processing_time = 2;
        info.deadline = 5;
        info.current_deadline = 5;
        info.period = Some(8);
        info.jobs_left = 2;

        assert_eq!(info.next_job(), Some(8));
        assert_eq!(info.remaining_time, 2);
        assert_eq!(info.current_deadline, 13);
        assert_eq!(info.jobs_left, 1);

        assert_eq!(info.next_job(), None);
        assert_eq!(info.jobs_left, 0);
    }

    #[test]
    fn test_next_job_aperiodic() {
        let mut info = SchedInfo::new(1, 0);
        assert_eq!(info.next_job(), None);
    }

    #[test]
    fn test_task_chain_is_lifo() {
        let stacks = StackAllocator::new(4096);
        let mut thread = Thread::new(1, noop, 0, stacks.allocate().unwrap(), 0);
        assert_eq!(thread.active_locus().0, LocusKind::Thread);

        thread.push_task(Task::new(noop, 1, stacks.allocate().unwrap())).unwrap();
        thread.push_task(Task::new(noop, 2, stacks.allocate().unwrap())).unwrap();
        assert_eq!(thread.task_depth(), 2);

        let (kind, locus) = thread.active_locus();
        assert_eq!(kind, LocusKind::Task);
        assert_eq!(locus.entry().1, 2);

        let top_sp = thread.top_task().unwrap().locus().stack().top() - 16;
        let popped = thread.remove_task_at(top_sp).unwrap();
        assert_eq!(popped.locus().entry().1, 2);
        assert_eq!(thread.active_locus().1.entry().1, 1);

        drop(popped);
        drop(thread);
        assert_eq!(stacks.live(), 0);
    }

    #[test]
    fn test_locus_at_uses_stack_ranges() {
        let stacks = StackAllocator::new(4096);
        let mut thread = Thread::new(1, noop, 0, stacks.allocate().unwrap(), 0);
        thread.push_task(Task::new(noop, 9, stacks.allocate().unwrap())).unwrap();

        let own = thread.locus().stack().top() - 64;
        assert_eq!(thread.locus_at(own).unwrap().0, LocusKind::Thread);

        let task_sp = thread.top_task().unwrap().locus().stack().base() + 64;
        assert_eq!(thread.locus_at(task_sp).unwrap().0, LocusKind::Task);

        let elsewhere = &thread as *const Thread as usize;
        assert!(thread.locus_at(elsewhere).is_none());
    }

    #[test]
    fn test_remove_task_below_top() {
        let stacks = StackAllocator::new(4096);
        let mut thread = Thread::new(1, noop, 0, stacks.allocate().unwrap(), 0);
        thread.push_task(Task::new(noop, 1, stacks.allocate().unwrap())).unwrap();
        let lower_sp = thread.top_task().unwrap().locus().stack().top() - 16;
        thread.push_task(Task::new(noop, 2, stacks.allocate().unwrap())).unwrap();

        assert_eq!(thread.locus_at(lower_sp).unwrap().1.entry().1, 1);

        let removed = thread.remove_task_at(lower_sp).unwrap();
        assert_eq!(removed.locus().entry().1, 1);
        assert_eq!(thread.task_depth(), 1);
        assert_eq!(thread.active_locus().1.entry().1, 2);

        let own_sp = thread.locus().stack().top() - 16;
        assert!(thread.remove_task_at(own_sp).is_none());
    }

    #[test]
    fn test_table_reuses_slots_but_not_ids() {
        let stacks = StackAllocator::new(4096);
        let mut table = ThreadTable::new();

        let slot = table.reserve_slot().unwrap();
        let first = table.insert(slot, Thread::new(1, noop, 0, stacks.allocate().unwrap(), 0));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(first), Ok(slot));

        drop(table.remove(slot));
        assert!(table.is_empty());
        assert_eq!(table.resolve(first), Err(ThreadError::InvalidThread));

        let again = table.reserve_slot().unwrap();
        assert_eq!(again, slot);
        let second = table.insert(again, Thread::new(2, noop, 0, stacks.allocate().unwrap(), 0));
        assert_eq!(second.slot(), first.slot());
        assert_ne!(second.id(), first.id());
        assert_eq!(table.resolve(first), Err(ThreadError::InvalidThread));
    }

    #[test]
    fn test_unused_reservation_is_reused() {
        let mut table = ThreadTable::new();
        let first = table.reserve_slot().unwrap();
        assert_eq!(table.reserve_slot().unwrap(), first);
        assert!(table.is_empty());
        assert!(table.get(first).is_none());
    }

    #[test]
    fn test_locus_kind_raw() {
        assert_eq!(LocusKind::from_raw(LocusKind::Task.into_raw()), LocusKind::Task);
        assert_eq!(LocusKind::from_raw(0), LocusKind::Thread);
    }
}
