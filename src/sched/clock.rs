// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Time sources
//!
//! The runtime measures everything in abstract ticks. A [`Clock`] says what
//! tick it is and how to wait when the policy decides to idle.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Time source of a runtime
pub trait Clock {
    /// Current tick
    fn now(&self) -> u64;

    /// Let `ticks` ticks pass with nothing to run
    fn idle(&self, ticks: u64);
}

/// Virtual clock that only moves when told to
///
/// Clones share the same counter, so a test can keep one handle and hand
/// another to the runtime. Idling advances the counter directly.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Rc<Cell<u64>>,
}

impl ManualClock {
    /// Create a clock at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `ticks`
    pub fn advance(&self, ticks: u64) {
        self.ticks.set(self.ticks.get().saturating_add(ticks));
    }

    /// Jump to an absolute tick
    pub fn set(&self, tick: u64) {
        self.ticks.set(tick);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.ticks.get()
    }

    fn idle(&self, ticks: u64) {
        self.advance(ticks);
    }
}

/// Wall clock with a fixed tick length
///
/// Ticks count from the creation of the clock; idling sleeps the OS thread.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
    tick: Duration,
}

impl SystemClock {
    /// Create a clock whose ticks last `tick` (at least one nanosecond)
    pub fn new(tick: Duration) -> Self {
        Self {
            origin: Instant::now(),
            tick: tick.max(Duration::from_nanos(1)),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        let ticks = self.origin.elapsed().as_nanos() / self.tick.as_nanos();
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    fn idle(&self, ticks: u64) {
        let nanos = self.tick.as_nanos().saturating_mul(u128::from(ticks));
        let nanos = u64::try_from(nanos).unwrap_or(u64::MAX);
        std::thread::sleep(Duration::from_nanos(nanos));
    }
}
