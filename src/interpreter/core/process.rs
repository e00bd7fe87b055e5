//! Process instance execution.
//!
//! A process instance walks its [`Graph`] with up to
//! [`MAX_SLOTS`](crate::interpreter::graph::MAX_SLOTS) program-counter slots.
//! Every delivered [`Event`] advances one slot by one statement:
//!
//! 1. Pass through structural nodes (joins, selection exits)
//! 2. Execute the statement
//! 3. Schedule the slot's next event after the next statement's delay,
//!    unless the slot forked, blocked or ended
//!
//! A blocked slot keeps pointing at its statement. The peer that unblocks it
//! schedules a wake-up event for that slot.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::config::Config;
use crate::interpreter::compile::{ChpExpr, ExprCompiler};
use crate::interpreter::diagnostics::{Diagnostics, SimLog};
use crate::interpreter::execute::{write_fields, write_scalar, Evaluator, ExternRegistry, ScopeStack};
use crate::interpreter::graph::{Graph, GraphBuilder, NodeId, RecvTarget, Stmt};
use crate::interpreter::sync::{register_probes, undo_probes, Rendezvous, Transfer, WaitSet};
use crate::interpreter::traits::{Event, Scheduler, SimError, SimResult, SlotRef};
use crate::interpreter::value::Value;
use crate::lang::Chp;
use crate::state::{LayoutResolver, ProbeWaitId, ProcessId, ScalarSlot, StateStore, Waiter};

use super::fanout::register_fanout;

/// Everything a step may touch outside the process itself.
pub struct StepContext<'a> {
    pub store: &'a mut StateStore,
    pub sched: &'a mut dyn Scheduler,
    pub diag: &'a mut Diagnostics,
    pub log: &'a mut SimLog,
    pub externs: &'a ExternRegistry,
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The slot advanced; its next event is scheduled.
    Continue,
    /// The slot is parked on a channel or a selection.
    Blocked,
    /// The selection could not register a wait and polls again later.
    Poll,
    /// The slot forked; every arm has its first event scheduled.
    Forked,
    /// The slot ran off the end of its branch or waits at a join.
    Ended,
    /// The event no longer matches the slot's state and was ignored.
    Stale,
}

/// Process instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// At least one slot is live.
    Running,
    /// Every slot has ended.
    Terminated,
}

/// One simulated CHP process.
pub struct ChpProcess {
    pid: ProcessId,
    instance: String,
    type_name: String,
    graph: Rc<Graph>,
    /// Node of each program-counter slot, `None` when free.
    slots: Vec<Option<NodeId>>,
    /// Slot is parked and expects a wake-up.
    waiting: Vec<bool>,
    join_counts: Vec<usize>,
    /// Slot waiting for a shared-variable change.
    stalled_slot: Option<usize>,
    /// Probe-wait object of each slot blocked on channel probes.
    probes: Vec<Option<ProbeWaitId>>,
    /// Re-poll interval of a selection that cannot register a wait.
    poll_delay: u64,
    energy: u64,
    leakage: f64,
    area: u64,
    scopes: ScopeStack,
}

impl ChpProcess {
    /// Compile `body` for the instance described by `layout` and register it
    /// with the store.
    pub fn build(
        store: &mut StateStore,
        layout: &dyn LayoutResolver,
        body: Option<&Chp>,
        config: &Config,
        diag: &mut Diagnostics,
    ) -> SimResult<Self> {
        let graph = {
            let mut exprs = ExprCompiler::new(layout, diag);
            GraphBuilder::new(&mut exprs, config).build(body)?
        };
        let pid = store.register_process(layout.instance_name());
        let (leakage, area) = config.process_costs(layout.type_name());
        let process = Self::from_graph(pid, layout.instance_name(), layout.type_name(), graph)
            .with_costs(leakage, area)
            .with_poll_delay(config.default_delay());
        process.compute_fanout(store)?;
        Ok(process)
    }

    /// Wrap an already built graph.
    pub fn from_graph(pid: ProcessId, instance: &str, type_name: &str, graph: Graph) -> Self {
        let n = graph.max_slots().max(1);
        let counters = graph.counters();
        Self {
            pid,
            instance: instance.to_string(),
            type_name: type_name.to_string(),
            graph: Rc::new(graph),
            slots: vec![None; n],
            waiting: vec![false; n],
            join_counts: vec![0; counters],
            stalled_slot: None,
            probes: vec![None; n],
            poll_delay: crate::config::DEFAULT_DELAY,
            energy: 0,
            leakage: 0.0,
            area: 0,
            scopes: ScopeStack::new(),
        }
    }

    pub fn with_costs(mut self, leakage: f64, area: u64) -> Self {
        self.leakage = leakage;
        self.area = area;
        self
    }

    pub fn with_poll_delay(mut self, delay: u64) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Register this process as a listener on every variable it touches.
    pub fn compute_fanout(&self, store: &mut StateStore) -> SimResult<()> {
        register_fanout(&self.graph, self.pid, store)
    }

    /// Enter the root node on slot 0.
    pub fn start(&mut self, sched: &mut dyn Scheduler) -> SimResult<()> {
        let Some(root) = self.graph.root() else {
            log::debug!("{}: empty body", self.instance);
            return Ok(());
        };
        self.slots[0] = Some(root);
        self.schedule_next(0, sched);
        Ok(())
    }

    /// Drop all execution state and start again from the root.
    pub fn restart(&mut self, store: &mut StateStore, sched: &mut dyn Scheduler) -> SimResult<()> {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.waiting.iter_mut().for_each(|w| *w = false);
        self.join_counts.iter_mut().for_each(|c| *c = 0);
        self.stalled_slot = None;
        self.probes.iter_mut().for_each(|p| *p = None);
        self.scopes.clear();
        store.release(self.pid);
        self.start(sched)
    }

    /// Deliver one event.
    pub fn step(&mut self, ev: Event, ctx: &mut StepContext<'_>) -> SimResult<StepResult> {
        let mut wakeup = ev.wakeup;
        let mut slot = match ev.slot {
            SlotRef::Slot(s) => s,
            SlotRef::Stalled => match self.stalled_slot.take() {
                Some(s) => s,
                None => return Ok(StepResult::Stale),
            },
        };
        if self.slots.get(slot).copied().flatten().is_none() {
            return Ok(StepResult::Stale);
        }
        if wakeup {
            if !self.waiting[slot] {
                log::trace!("{}: stale wake-up for t#{:02}", self.instance, slot);
                return Ok(StepResult::Stale);
            }
            self.waiting[slot] = false;
        }

        let graph = Rc::clone(&self.graph);
        let node = loop {
            let Some(n) = self.slots[slot] else {
                return Ok(StepResult::Ended);
            };
            if graph.node(n).stmt.is_some() {
                break n;
            }
            slot = self.advance(slot);
            wakeup = false;
        };
        let Some(stmt) = graph.node(node).stmt.as_ref() else {
            return Err(SimError::Malformed(format!("{}: statement vanished", self.instance)));
        };
        log::trace!(
            "[{:8}] {} t#{:02}{}: {}",
            ctx.sched.now(),
            self.instance,
            slot,
            if wakeup { " (wake)" } else { "" },
            stmt
        );

        match &stmt.kind {
            Stmt::Fork { .. } => {
                self.energy += stmt.energy;
                return self.fork(slot, &graph.node(node).branches, ctx.sched);
            }
            Stmt::Assign { target, value } => {
                let mut ev = self.evaluator(ctx);
                let v = ev.eval(value)?;
                let loc = ev.locate(target)?;
                write_scalar(ctx.store, loc, v)?;
                propagate(ctx, &[loc]);
            }
            Stmt::AssignStruct { target, value } => {
                let mut ev = self.evaluator(ctx);
                let v = ev.eval_struct(value)?;
                let locs = ev.locate_struct(target)?;
                write_fields(ctx.store, &locs, &v)?;
                propagate(ctx, &locs);
            }
            Stmt::Send { chan, value } => {
                let me = Waiter {
                    process: self.pid,
                    slot,
                };
                if wakeup {
                    Rendezvous::new(ctx.store, ctx.sched, ctx.diag).send_resume(chan.offset, me)?;
                } else {
                    let v = match value {
                        Some(e) => self.evaluator(ctx).eval_value(e)?,
                        None => Value::default(),
                    };
                    let sent = Rendezvous::new(ctx.store, ctx.sched, ctx.diag).send(chan.offset, me, v)?;
                    if sent.is_blocked() {
                        self.waiting[slot] = true;
                        return Ok(StepResult::Blocked);
                    }
                }
            }
            Stmt::Recv { chan, target } => {
                let me = Waiter {
                    process: self.pid,
                    slot,
                };
                let mut rdv = Rendezvous::new(ctx.store, ctx.sched, ctx.diag);
                let v = if wakeup {
                    rdv.recv_resume(chan.offset, me)?
                } else {
                    match rdv.recv(chan.offset, me)? {
                        Transfer::Done(v) => v,
                        Transfer::Blocked => {
                            self.waiting[slot] = true;
                            return Ok(StepResult::Blocked);
                        }
                    }
                };
                if let Some(target) = target {
                    self.deliver(target, v, &chan.name, ctx)?;
                }
            }
            Stmt::Log(items) => {
                let line = self.evaluator(ctx).format_log(items)?;
                let now = ctx.sched.now();
                ctx.log.write(now, slot, &self.instance, &line);
            }
            Stmt::Select { guards, wait } => {
                if wakeup {
                    self.release_wait(wait, slot, ctx.store)?;
                }
                match self.pick(guards, ctx)? {
                    Some(i) => self.slots[slot] = Some(graph.node(node).branches[i]),
                    None => return self.block(wait, slot, ctx),
                }
            }
            Stmt::Loop { guards } => match self.pick(guards, ctx)? {
                Some(i) => self.slots[slot] = Some(graph.node(node).branches[i]),
                None => slot = self.advance(slot),
            },
        }

        self.energy += stmt.energy;
        if matches!(
            stmt.kind,
            Stmt::Assign { .. } | Stmt::AssignStruct { .. } | Stmt::Send { .. } | Stmt::Recv { .. } | Stmt::Log(_)
        ) {
            slot = self.advance(slot);
        }
        Ok(if self.schedule_next(slot, ctx.sched) {
            StepResult::Continue
        } else {
            StepResult::Ended
        })
    }

    fn evaluator<'e>(&'e mut self, ctx: &'e mut StepContext<'_>) -> Evaluator<'e> {
        Evaluator::new(
            &*ctx.store,
            &mut self.scopes,
            ctx.externs,
            &mut *ctx.diag,
            &mut *ctx.log,
            &self.instance,
        )
    }

    /// Index of the first guard that holds. A missing guard is `else`.
    fn pick(&mut self, guards: &[Option<ChpExpr>], ctx: &mut StepContext<'_>) -> SimResult<Option<usize>> {
        let mut ev = self.evaluator(ctx);
        for (i, g) in guards.iter().enumerate() {
            let taken = match g {
                None => true,
                Some(g) => ev.eval(g)?.is_true(),
            };
            if taken {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Park a selection whose guards are all false.
    fn block(&mut self, wait: &WaitSet, slot: usize, ctx: &mut StepContext<'_>) -> SimResult<StepResult> {
        let me = Waiter {
            process: self.pid,
            slot,
        };
        if wait.shared && self.stalled_slot.is_some_and(|s| s != slot) {
            // Only one slot can wait on shared state; poll instead.
            ctx.sched.schedule(Event::step(self.pid, slot), self.poll_delay);
            return Ok(StepResult::Poll);
        }
        let probed = register_probes(ctx.store, wait, me, &mut self.probes[slot])?;
        if wait.shared {
            if self.stalled_slot.is_none() {
                self.stalled_slot = Some(slot);
                ctx.store.stall(self.pid);
            }
        } else if !probed {
            log::warn!(
                "{}: t#{:02} blocked on a selection with nothing to wait for",
                self.instance,
                slot
            );
        }
        self.waiting[slot] = true;
        Ok(StepResult::Blocked)
    }

    /// Undo the wait registrations of a woken selection.
    fn release_wait(&mut self, wait: &WaitSet, slot: usize, store: &mut StateStore) -> SimResult<()> {
        let me = Waiter {
            process: self.pid,
            slot,
        };
        undo_probes(store, wait, me, &mut self.probes[slot])?;
        if self.stalled_slot == Some(slot) {
            self.stalled_slot = None;
            store.unstall(self.pid);
        }
        Ok(())
    }

    /// Write a received value into its destination.
    fn deliver(&mut self, target: &RecvTarget, v: Value, chan: &str, ctx: &mut StepContext<'_>) -> SimResult<()> {
        match target {
            RecvTarget::Scalar(var) => {
                let loc = self.evaluator(ctx).locate(var)?;
                let s = v.as_scalar().ok_or_else(|| {
                    SimError::Malformed(format!("{}: structure received into scalar {}", chan, var.name))
                })?;
                write_scalar(ctx.store, loc, s)?;
                propagate(ctx, &[loc]);
            }
            RecvTarget::Struct(s) => {
                let locs = self.evaluator(ctx).locate_struct(s)?;
                let agg = v.as_aggregate().ok_or_else(|| {
                    SimError::Malformed(format!("{}: scalar received into structure {}", chan, s.name))
                })?;
                write_fields(ctx.store, &locs, agg)?;
                propagate(ctx, &locs);
            }
        }
        Ok(())
    }

    /// Start every arm of a fork. The first arm keeps `slot`.
    fn fork(&mut self, slot: usize, arms: &[NodeId], sched: &mut dyn Scheduler) -> SimResult<StepResult> {
        let mut started = Vec::with_capacity(arms.len());
        for (k, &arm) in arms.iter().enumerate() {
            let s = if k == 0 { slot } else { self.free_slot()? };
            self.slots[s] = Some(arm);
            started.push(s);
        }
        for s in started {
            self.schedule_next(s, sched);
        }
        Ok(StepResult::Forked)
    }

    fn free_slot(&self) -> SimResult<usize> {
        self.slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| SimError::TooManyThreads {
                process: self.instance.clone(),
                required: self.slots.len() + 1,
                limit: self.slots.len(),
            })
    }

    /// Move `slot` past its current node. Returns the slot now holding the
    /// continuation, which differs from `slot` only after a completed join.
    fn advance(&mut self, slot: usize) -> usize {
        let Some(cur) = self.slots[slot] else {
            return slot;
        };
        let next = self.graph.node(cur).next;
        let Some(next) = next else {
            self.slots[slot] = None;
            return slot;
        };
        let Some(join) = self.graph.node(next).join else {
            self.slots[slot] = Some(next);
            return slot;
        };

        self.join_counts[join.counter] += 1;
        if self.join_counts[join.counter] < join.wait {
            self.slots[slot] = None;
            return slot;
        }
        self.join_counts[join.counter] = 0;
        self.slots[slot] = None;
        let target = self
            .slots
            .iter()
            .position(Option::is_none)
            .filter(|&free| free < slot)
            .unwrap_or(slot);
        self.slots[target] = Some(next);
        log::trace!("{}: joined into t#{:02}", self.instance, target);
        target
    }

    /// Schedule the next statement of `slot`, passing through structural
    /// nodes first. Returns false when the slot ended instead.
    fn schedule_next(&mut self, mut slot: usize, sched: &mut dyn Scheduler) -> bool {
        let graph = Rc::clone(&self.graph);
        loop {
            let Some(n) = self.slots[slot] else {
                return false;
            };
            if let Some(stmt) = &graph.node(n).stmt {
                sched.schedule(Event::step(self.pid, slot), stmt.delay);
                return true;
            }
            slot = self.advance(slot);
        }
    }

    // --- Queries ---

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn status(&self) -> ProcessStatus {
        if self.slots.iter().any(Option::is_some) {
            ProcessStatus::Running
        } else {
            ProcessStatus::Terminated
        }
    }

    /// Number of live slots.
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Node held by `slot`.
    pub fn slot(&self, slot: usize) -> Option<NodeId> {
        self.slots.get(slot).copied().flatten()
    }

    pub fn stalled_slot(&self) -> Option<usize> {
        self.stalled_slot
    }

    pub fn join_count(&self, counter: usize) -> usize {
        self.join_counts.get(counter).copied().unwrap_or(0)
    }

    pub fn energy(&self) -> u64 {
        self.energy
    }

    /// Watts.
    pub fn leakage(&self) -> f64 {
        self.leakage
    }

    pub fn area(&self) -> u64 {
        self.area
    }

    /// Human-readable state: live statements and costs.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- Process: {} [ {} ] ---", self.instance, self.type_name);
        let mut found = false;
        for (i, s) in self.slots.iter().enumerate() {
            if let Some(n) = s {
                found = true;
                match &self.graph.node(*n).stmt {
                    Some(stmt) => {
                        let _ = writeln!(out, "t#{:02}: {}", i, stmt);
                    }
                    None => {
                        let _ = writeln!(out, "t#{:02}: (null)", i);
                    }
                }
            }
        }
        if !found {
            out.push_str("Terminated.\n");
        }
        let _ = writeln!(out, "Energy cost: {}", self.energy);
        let _ = writeln!(out, "Leakage: {}", format_leakage(self.leakage));
        let _ = writeln!(out, "Area: {}", self.area);
        out
    }
}

/// Leakage in the largest unit that keeps the value above one.
pub fn format_leakage(watts: f64) -> String {
    if watts > 1e-3 {
        format!("{} mW", watts * 1e3)
    } else if watts > 1e-6 {
        format!("{} uW", watts * 1e6)
    } else if watts > 1e-9 {
        format!("{} nW", watts * 1e9)
    } else {
        format!("{} pW", watts * 1e12)
    }
}

/// Wake stalled listeners of the written locations.
fn propagate(ctx: &mut StepContext<'_>, written: &[ScalarSlot]) {
    for loc in written {
        let listeners = match *loc {
            ScalarSlot::Bool(off) => ctx.store.bool_fanout(off).to_vec(),
            ScalarSlot::Int(off, _) => ctx.store.int_fanout(off).to_vec(),
        };
        for pid in listeners {
            if ctx.store.unstall(pid) {
                log::trace!("unstall {}", pid);
                ctx.sched.schedule(Event::unstall(pid), 0);
            }
        }
    }
}
