//! Test harness for driving the simulator without a front end.
//!
//! This module provides:
//! - [`RecordingScheduler`], a [`Scheduler`] that only records what it is
//!   asked to deliver, for stepping process instances by hand
//! - [`scenarios`], ready-made layouts, process bodies and engines for the
//!   canonical end-to-end behaviours
//!
//! # Usage
//!
//! ```bash
//! cargo run -- scenario producer-consumer
//! ```

pub mod scenarios;

use crate::interpreter::traits::{Event, Scheduler};

/// Scheduler that records every request instead of delivering it.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    /// `(event, delay)` in request order.
    pub events: Vec<(Event, u64)>,
    /// Time reported by `now()`.
    pub time: u64,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the oldest request.
    pub fn pop(&mut self) -> Option<(Event, u64)> {
        if self.events.is_empty() {
            None
        } else {
            Some(self.events.remove(0))
        }
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule(&mut self, event: Event, delay: u64) {
        self.events.push((event, delay));
    }

    fn now(&self) -> u64 {
        self.time
    }
}

pub use scenarios::{Scenario, ScenarioRun};
