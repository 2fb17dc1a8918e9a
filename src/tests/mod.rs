// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! Full runtime scenarios: threads, tasks and real-time policies running
//! on their own stacks. Entry procedures report what they did through a
//! per-OS-thread event log, since they only receive a `usize`.

mod runtime_tests;

use std::cell::RefCell;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Append an event to the log of this test
pub(crate) fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

/// Drain the event log
pub(crate) fn take_events() -> Vec<String> {
    EVENTS.with(|events| events.take())
}
