//! Discrete-event coordinator.
//!
//! The engine owns the global state, the event queue and every process
//! instance, and delivers events one at a time in time order.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::config::Config;
use crate::interpreter::core::{format_leakage, ChpProcess, ProcessStatus, StepContext, StepResult};
use crate::interpreter::diagnostics::{Diagnostics, SimLog};
use crate::interpreter::execute::ExternRegistry;
use crate::interpreter::traits::{Event, Scheduler, SimError, SimResult};
use crate::lang::Chp;
use crate::state::{LayoutResolver, ProcessId, StateStore};

use super::queue::EventQueue;

/// Engine execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    /// Engine is ready to run.
    #[default]
    Ready,
    /// Events are being delivered.
    Running,
    /// Engine is paused.
    Paused,
    /// No events left while some process is still blocked.
    Idle,
    /// Every process has terminated.
    Halted,
    /// A fatal error stopped the run.
    Error,
}

/// Discrete-event simulation engine.
pub struct SimEngine {
    config: Config,
    store: StateStore,
    queue: EventQueue,
    processes: Vec<ChpProcess>,
    /// Process id to index in `processes`.
    index: HashMap<ProcessId, usize>,
    diag: Diagnostics,
    log: SimLog,
    externs: ExternRegistry,
    status: EngineStatus,
    events: u64,
}

impl SimEngine {
    /// Create an engine with an empty store.
    pub fn new(config: Config) -> Self {
        let externs = ExternRegistry::with_aliases(config.externs.clone());
        Self {
            config,
            store: StateStore::new(),
            queue: EventQueue::new(),
            processes: Vec::new(),
            index: HashMap::new(),
            diag: Diagnostics::new(),
            log: SimLog::new(),
            externs,
            status: EngineStatus::Ready,
            events: 0,
        }
    }

    /// Echo `log(...)` output to stdout as it is produced.
    pub fn with_echo(mut self) -> Self {
        self.log = SimLog::echoing();
        self
    }

    /// Build a process instance and schedule its first statement.
    pub fn add_process(&mut self, layout: &dyn LayoutResolver, body: Option<&Chp>) -> SimResult<ProcessId> {
        let mut process = ChpProcess::build(&mut self.store, layout, body, &self.config, &mut self.diag)?;
        process.start(&mut self.queue)?;
        let pid = process.pid();
        log::debug!("added process {} as {}", process.instance(), pid);
        self.index.insert(pid, self.processes.len());
        self.processes.push(process);
        Ok(pid)
    }

    /// Deliver the next event.
    ///
    /// Returns `Ok(false)` once the queue is empty.
    pub fn step(&mut self) -> SimResult<bool> {
        if matches!(self.status, EngineStatus::Error | EngineStatus::Paused) {
            return Ok(false);
        }
        let Some((_, ev)) = self.queue.pop() else {
            self.status = if self.processes.iter().all(|p| p.status() == ProcessStatus::Terminated) {
                EngineStatus::Halted
            } else {
                EngineStatus::Idle
            };
            return Ok(false);
        };
        self.status = EngineStatus::Running;

        let result = self.dispatch(ev);
        match result {
            Ok(r) => {
                self.events += 1;
                if r == StepResult::Stale {
                    log::trace!("dropped stale event {:?}", ev);
                }
                Ok(true)
            }
            Err(e) => {
                log::error!("simulation stopped at time {}: {}", self.queue.now(), e);
                self.status = EngineStatus::Error;
                Err(e)
            }
        }
    }

    fn dispatch(&mut self, ev: Event) -> SimResult<StepResult> {
        let i = *self
            .index
            .get(&ev.process)
            .ok_or_else(|| SimError::Malformed(format!("event for unknown process {}", ev.process)))?;
        let mut ctx = StepContext {
            store: &mut self.store,
            sched: &mut self.queue,
            diag: &mut self.diag,
            log: &mut self.log,
            externs: &self.externs,
        };
        self.processes[i].step(ev, &mut ctx)
    }

    /// Deliver up to `max_events` events.
    ///
    /// Stops early when the queue drains or an error occurs. Returns the
    /// number of events delivered.
    pub fn run(&mut self, max_events: u64) -> SimResult<u64> {
        let start = self.events;
        for _ in 0..max_events {
            if !self.step()? {
                break;
            }
        }
        Ok(self.events - start)
    }

    /// Deliver every event due at or before `time`.
    pub fn run_until(&mut self, time: u64) -> SimResult<u64> {
        let start = self.events;
        while self.queue.peek_time().is_some_and(|t| t <= time) {
            if !self.step()? {
                break;
            }
        }
        Ok(self.events - start)
    }

    /// Pause execution.
    pub fn pause(&mut self) {
        if matches!(self.status, EngineStatus::Ready | EngineStatus::Running) {
            self.status = EngineStatus::Paused;
        }
    }

    /// Resume execution.
    pub fn resume(&mut self) {
        if self.status == EngineStatus::Paused {
            self.status = EngineStatus::Ready;
        }
    }

    /// Restart every process from its root at time zero.
    ///
    /// Variable values are kept; channel and stall registrations are dropped.
    pub fn reset(&mut self) -> SimResult<()> {
        self.queue.clear();
        for p in &mut self.processes {
            p.restart(&mut self.store, &mut self.queue)?;
        }
        self.log.clear();
        self.diag.clear();
        self.status = EngineStatus::Ready;
        self.events = 0;
        Ok(())
    }

    // --- Queries ---

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Get status as string for display.
    pub fn status_string(&self) -> &'static str {
        match self.status {
            EngineStatus::Ready => "Ready",
            EngineStatus::Running => "Running",
            EngineStatus::Paused => "Paused",
            EngineStatus::Idle => "Idle",
            EngineStatus::Halted => "Halted",
            EngineStatus::Error => "Error",
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> u64 {
        self.queue.now()
    }

    /// Events delivered since the last reset.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Store access for declaring layouts before adding processes.
    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn externs_mut(&mut self) -> &mut ExternRegistry {
        &mut self.externs
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn log(&self) -> &SimLog {
        &self.log
    }

    pub fn processes(&self) -> &[ChpProcess] {
        &self.processes
    }

    pub fn process(&self, pid: ProcessId) -> Option<&ChpProcess> {
        self.index.get(&pid).map(|&i| &self.processes[i])
    }

    pub fn total_energy(&self) -> u64 {
        self.processes.iter().map(ChpProcess::energy).sum()
    }

    /// Watts.
    pub fn total_leakage(&self) -> f64 {
        self.processes.iter().map(ChpProcess::leakage).sum()
    }

    pub fn total_area(&self) -> u64 {
        self.processes.iter().map(ChpProcess::area).sum()
    }

    /// State of every process followed by the totals.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        for p in &self.processes {
            out.push_str(&p.dump_state());
        }
        let _ = writeln!(out, "--- Totals at time {} ---", self.now());
        let _ = writeln!(out, "Energy cost: {}", self.total_energy());
        let _ = writeln!(out, "Leakage: {}", format_leakage(self.total_leakage()));
        let _ = writeln!(out, "Area: {}", self.total_area());
        out
    }
}
