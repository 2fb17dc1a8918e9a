// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread state and queues
//!
//! Both queues are circular, sentinel-headed rings threaded through the
//! slots of the thread table. A queue only links slots: the threads
//! themselves stay owned by the table.
//!
//! ```text
//!   sentinel <-> slot 3 <-> slot 0 <-> slot 7 <-> (back to sentinel)
//! ```
//!
//! An empty ring is the sentinel linked to itself.

use crate::error::{Result, ThreadError};

/// Index of a thread in the thread table
pub type Slot = usize;

/// Where a thread currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet handed to the scheduler
    Detached,
    /// Linked on the run queue
    Ready,
    /// Linked on the release queue until its release time
    Waiting,
    /// The current thread
    Running,
}

/// Sentinel position inside `Ring::nodes`
const SENTINEL: usize = 0;

#[derive(Debug, Clone, Copy)]
struct Node {
    prev: usize,
    next: usize,
    linked: bool,
}

impl Node {
    const UNLINKED: Node = Node {
        prev: SENTINEL,
        next: SENTINEL,
        linked: false,
    };
}

/// Sentinel-headed circular doubly-linked ring of slots
///
/// Slot `s` is stored at `nodes[s + 1]`; `nodes[0]` is the sentinel.
#[derive(Debug)]
pub struct Ring {
    nodes: Vec<Node>,
    len: usize,
}

impl Ring {
    /// Create an empty ring
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                prev: SENTINEL,
                next: SENTINEL,
                linked: true,
            }],
            len: 0,
        }
    }

    /// Make room for slots up to `slot` without linking anything
    pub fn reserve_slot(&mut self, slot: Slot) -> Result<()> {
        let needed = slot + 2;
        if needed > self.nodes.len() {
            self.nodes
                .try_reserve(needed - self.nodes.len())
                .map_err(|_| ThreadError::OutOfMemory)?;
            self.nodes.resize(needed, Node::UNLINKED);
        }
        Ok(())
    }

    /// Number of linked slots
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the ring holds only its sentinel
    pub fn is_empty(&self) -> bool {
        self.nodes[SENTINEL].next == SENTINEL
    }

    /// Check whether `slot` is linked on this ring
    pub fn contains(&self, slot: Slot) -> bool {
        self.nodes.get(slot + 1).is_some_and(|node| node.linked)
    }

    /// First slot after the sentinel
    pub fn front(&self) -> Option<Slot> {
        match self.nodes[SENTINEL].next {
            SENTINEL => None,
            idx => Some(idx - 1),
        }
    }

    /// Link `slot` just before the sentinel
    ///
    /// The slot must have been reserved and must not already be linked.
    pub fn push_back(&mut self, slot: Slot) {
        let idx = slot + 1;
        assert!(
            !self.nodes[idx].linked,
            "ring: slot {slot} is already linked"
        );

        let tail = self.nodes[SENTINEL].prev;
        self.nodes[idx] = Node {
            prev: tail,
            next: SENTINEL,
            linked: true,
        };
        self.nodes[tail].next = idx;
        self.nodes[SENTINEL].prev = idx;
        self.len += 1;
    }

    /// Link `slot` just after the sentinel
    pub fn push_front(&mut self, slot: Slot) {
        let idx = slot + 1;
        assert!(
            !self.nodes[idx].linked,
            "ring: slot {slot} is already linked"
        );

        let head = self.nodes[SENTINEL].next;
        self.nodes[idx] = Node {
            prev: SENTINEL,
            next: head,
            linked: true,
        };
        self.nodes[head].prev = idx;
        self.nodes[SENTINEL].next = idx;
        self.len += 1;
    }

    /// Point the back link of `slot` at itself
    #[cfg(test)]
    pub(crate) fn break_back_link(&mut self, slot: Slot) {
        self.nodes[slot + 1].prev = slot + 1;
    }

    /// Unlink `slot`, returning false if it was not on the ring
    pub fn remove(&mut self, slot: Slot) -> bool {
        if !self.contains(slot) {
            return false;
        }

        let idx = slot + 1;
        let Node { prev, next, .. } = self.nodes[idx];
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[idx] = Node::UNLINKED;
        self.len -= 1;
        true
    }

    /// Walk the ring from the sentinel, in link order
    pub fn iter(&self) -> RingIter<'_> {
        RingIter {
            ring: self,
            cursor: self.nodes[SENTINEL].next,
            steps: 0,
        }
    }

    /// Check that forward and backward links agree and close the ring
    ///
    /// A broken ring cannot be repaired, so this panics.
    pub fn validate(&self) {
        let mut idx = SENTINEL;
        for _ in 0..=self.len {
            let next = self.nodes[idx].next;
            if self.nodes[next].prev != idx {
                panic!("ring: broken back link at node {next}");
            }
            idx = next;
        }
        if idx != SENTINEL {
            panic!("ring: {} linked slots do not close the ring", self.len);
        }
    }
}

impl Default for Ring {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the slots of a [`Ring`]
pub struct RingIter<'a> {
    ring: &'a Ring,
    cursor: usize,
    steps: usize,
}

impl Iterator for RingIter<'_> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.cursor == SENTINEL {
            return None;
        }
        if self.steps == self.ring.len {
            panic!("ring: walked past {} linked slots without returning to the sentinel", self.ring.len);
        }

        let slot = self.cursor - 1;
        self.cursor = self.ring.nodes[self.cursor].next;
        self.steps += 1;
        Some(slot)
    }
}

/// Run queue: threads eligible to be picked by the scheduler
pub type RunQueue = Ring;

/// Release queue
///
/// Threads that become eligible at an absolute release time. Entries keep
/// the order in which they were parked.
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    ring: Ring,
    release_times: Vec<u64>,
}

impl ReleaseQueue {
    /// Create an empty release queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Make room for slots up to `slot`
    pub fn reserve_slot(&mut self, slot: Slot) -> Result<()> {
        self.ring.reserve_slot(slot)?;
        if slot >= self.release_times.len() {
            self.release_times
                .try_reserve(slot + 1 - self.release_times.len())
                .map_err(|_| ThreadError::OutOfMemory)?;
            self.release_times.resize(slot + 1, 0);
        }
        Ok(())
    }

    /// Park `slot` until `release_time`
    pub fn push(&mut self, slot: Slot, release_time: u64) {
        self.ring.push_back(slot);
        self.release_times[slot] = release_time;
    }

    /// Remove `slot`, returning its release time if it was parked
    pub fn remove(&mut self, slot: Slot) -> Option<u64> {
        if self.ring.remove(slot) {
            Some(self.release_times[slot])
        } else {
            None
        }
    }

    /// Release time of a parked slot
    pub fn release_time(&self, slot: Slot) -> Option<u64> {
        self.ring.contains(slot).then(|| self.release_times[slot])
    }

    /// Check whether `slot` is parked
    pub fn contains(&self, slot: Slot) -> bool {
        self.ring.contains(slot)
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Walk `(slot, release_time)` pairs in queue order
    pub fn iter(&self) -> impl Iterator<Item = (Slot, u64)> + '_ {
        self.ring.iter().map(|slot| (slot, self.release_times[slot]))
    }

    pub fn validate(&self) {
        self.ring.validate();
    }

    #[cfg(test)]
    pub(crate) fn break_back_link(&mut self, slot: Slot) {
        self.ring.break_back_link(slot);
    }
}
