//! Per-process execution.
//!
//! A [`ChpProcess`] owns the compiled graph of one process instance and the
//! program-counter slots walking it. The engine delivers one event at a time
//! through [`ChpProcess::step`], passing a [`StepContext`] with the shared
//! store, the scheduler and the diagnostic sinks.
//!
//! # Execution Model
//!
//! Each slot runs independently:
//!
//! 1. Wait for its event (statement delay elapsed, or a wake-up)
//! 2. Execute the statement at its node
//! 3. Advance along `next`, a chosen guard branch, or into fork arms
//! 4. Schedule the following statement, park, or end at a join
//!
//! # Example
//!
//! ```ignore
//! use chpsim::interpreter::core::{ChpProcess, StepContext};
//!
//! let mut p = ChpProcess::build(&mut store, &layout, Some(&body), &config, &mut diag)?;
//! p.start(&mut queue)?;
//! while let Some(ev) = queue.pop() {
//!     p.step(ev, &mut ctx)?;
//! }
//! ```

mod fanout;
mod process;

pub use fanout::register_fanout;
pub use process::{format_leakage, ChpProcess, ProcessStatus, StepContext, StepResult};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::interpreter::diagnostics::{Diagnostics, SimLog};
    use crate::interpreter::execute::ExternRegistry;
    use crate::interpreter::traits::Event;
    use crate::lang::{BinOp, Chp, DataType, Expr, GuardedCmd, Id, LogArg};
    use crate::state::{ChanDir, ChanOffset, Logic, ProcessLayout, StateStore, Symbol};
    use crate::testing::RecordingScheduler;

    struct Bench {
        store: StateStore,
        sched: RecordingScheduler,
        diag: Diagnostics,
        log: SimLog,
        externs: ExternRegistry,
    }

    impl Bench {
        fn new() -> Self {
            Self {
                store: StateStore::new(),
                sched: RecordingScheduler::new(),
                diag: Diagnostics::new(),
                log: SimLog::new(),
                externs: ExternRegistry::new(),
            }
        }

        fn build(&mut self, layout: &ProcessLayout, body: Chp) -> ChpProcess {
            let mut p =
                ChpProcess::build(&mut self.store, layout, Some(&body), &Config::default(), &mut self.diag).unwrap();
            p.start(&mut self.sched).unwrap();
            p
        }

        fn step(&mut self, p: &mut ChpProcess, ev: Event) -> StepResult {
            let mut ctx = StepContext {
                store: &mut self.store,
                sched: &mut self.sched,
                diag: &mut self.diag,
                log: &mut self.log,
                externs: &self.externs,
            };
            p.step(ev, &mut ctx).unwrap()
        }

        /// Deliver the oldest pending event, which must target `p`.
        fn next(&mut self, p: &mut ChpProcess) -> StepResult {
            let (ev, _) = self.sched.pop().expect("no pending event");
            assert_eq!(ev.process, p.pid());
            self.step(p, ev)
        }
    }

    fn set(name: &str, v: u64) -> Chp {
        Chp::assign(Id::new(name), Expr::Int(v))
    }

    #[test]
    fn test_assignment_wraps_to_width() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        let x = layout.declare_int(&mut b.store, "x", 4, false);
        b.store.set_int(x, 15).unwrap();

        let body = Chp::assign(Id::new("x"), Expr::binary(BinOp::Add, Expr::var("x"), Expr::Int(1)));
        let mut p = b.build(&layout, body);
        assert_eq!(b.sched.events[0].1, 10);

        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert_eq!(b.store.get_int(x).unwrap(), 0);
        assert_eq!(p.status(), ProcessStatus::Terminated);
    }

    #[test]
    fn test_first_true_guard_wins() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        let x = layout.declare_int(&mut b.store, "x", 4, false);
        let y = layout.declare_int(&mut b.store, "y", 4, false);
        b.store.set_int(x, 5).unwrap();

        let body = Chp::Select(vec![
            GuardedCmd::new(Expr::binary(BinOp::Gt, Expr::var("x"), Expr::Int(2)), set("y", 1)),
            GuardedCmd::new(Expr::binary(BinOp::Gt, Expr::var("x"), Expr::Int(0)), set("y", 2)),
            GuardedCmd::otherwise(Some(set("y", 3))),
        ]);
        let mut p = b.build(&layout, body);

        assert_eq!(b.next(&mut p), StepResult::Continue);
        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert_eq!(b.store.get_int(y).unwrap(), 1);
        assert!(b.sched.events.is_empty());
    }

    #[test]
    fn test_fork_join_proceeds_once() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        let x = layout.declare_int(&mut b.store, "x", 4, false);
        layout.declare_int(&mut b.store, "y", 4, false);

        let sum = Chp::assign(Id::new("x"), Expr::binary(BinOp::Add, Expr::var("x"), Expr::var("y")));
        let body = Chp::Seq(vec![Chp::Par(vec![set("x", 1), set("y", 2)]), sum]);
        let mut p = b.build(&layout, body);

        assert_eq!(b.next(&mut p), StepResult::Forked);
        assert_eq!(p.live_slots(), 2);

        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert_eq!(p.join_count(0), 1);
        assert_eq!(p.live_slots(), 1);

        // The last arrival continues on the lowest free slot.
        assert_eq!(b.next(&mut p), StepResult::Continue);
        assert_eq!(p.join_count(0), 0);
        assert_eq!(b.sched.events.len(), 1);
        assert_eq!(b.sched.events[0].0, Event::step(p.pid(), 0));

        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert_eq!(b.store.get_int(x).unwrap(), 3);
        assert!(b.sched.events.is_empty());
    }

    /// Producer `P` owns output `R`; consumer `Q` sees the same channel as
    /// input `L`.
    fn pair(b: &mut Bench) -> (ProcessLayout, ProcessLayout) {
        let mut p = ProcessLayout::new("top.p", "producer");
        let chan = p.declare_chan(&mut b.store, "R", DataType::Int(8), ChanDir::Output);
        let mut q = ProcessLayout::new("top.q", "consumer");
        q.declare_int(&mut b.store, "x", 8, false);
        q.bind("L", Symbol::chan(chan, ChanDir::Input, DataType::Int(8)));
        (p, q)
    }

    #[test]
    fn test_send_then_receive() {
        let mut b = Bench::new();
        let (pl, ql) = pair(&mut b);
        let x = match ql.symbol("x") {
            Some(Symbol::Int { offset, .. }) => offset,
            other => panic!("unexpected symbol {:?}", other),
        };
        let mut p = b.build(&pl, Chp::send("R", Expr::Int(5)));
        let mut q = b.build(&ql, Chp::recv("L", "x"));

        assert_eq!(b.next(&mut p), StepResult::Blocked);
        assert_eq!(b.next(&mut q), StepResult::Ended);
        assert_eq!(b.store.get_int(x).unwrap(), 5);

        // The producer was woken by the consumer.
        let (ev, delay) = b.sched.pop().unwrap();
        assert_eq!((ev, delay), (Event::wake(p.pid(), 0), 0));
        assert_eq!(b.step(&mut p, ev), StepResult::Ended);
        assert!(b.diag.warnings().is_empty());
    }

    #[test]
    fn test_probe_selection_woken_by_sender() {
        let mut b = Bench::new();
        let (pl, ql) = pair(&mut b);
        let body = Chp::Select(vec![GuardedCmd::new(Expr::probe("L"), Chp::recv("L", "x"))]);
        let mut q = b.build(&ql, body);
        assert_eq!(b.next(&mut q), StepResult::Blocked);
        assert_eq!(b.store.live_probe_waits(), 1);

        let mut p = b.build(&pl, Chp::send("R", Expr::Int(9)));
        assert_eq!(b.next(&mut p), StepResult::Blocked);

        // Probe wake-up, then the receive it guards.
        assert_eq!(b.next(&mut q), StepResult::Continue);
        assert_eq!(b.store.live_probe_waits(), 0);
        assert_eq!(b.next(&mut q), StepResult::Ended);
        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert!(b.sched.events.is_empty());
    }

    #[test]
    fn test_shared_variable_unstalls_selection() {
        let mut b = Bench::new();
        let mut ql = ProcessLayout::new("top.q", "waiter");
        let go = ql.declare_bool(&mut b.store, "go", true);
        let y = ql.declare_int(&mut b.store, "y", 2, false);
        b.store.set_bool(go, Logic::Zero).unwrap();
        let mut pl = ProcessLayout::new("top.p", "setter");
        pl.bind("go", Symbol::Bool { offset: go, shared: true });

        let mut q = b.build(&ql, Chp::Select(vec![GuardedCmd::new(Expr::var("go"), set("y", 3))]));
        assert_eq!(b.next(&mut q), StepResult::Blocked);
        assert_eq!(q.stalled_slot(), Some(0));
        assert!(b.store.is_stalled(q.pid()));

        let mut p = b.build(&pl, Chp::assign(Id::new("go"), Expr::True));
        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert!(!b.store.is_stalled(q.pid()));

        let (ev, delay) = b.sched.pop().unwrap();
        assert_eq!((ev, delay), (Event::unstall(q.pid()), 0));
        assert_eq!(b.step(&mut q, ev), StepResult::Continue);
        assert_eq!(b.next(&mut q), StepResult::Ended);
        assert_eq!(b.store.get_int(y).unwrap(), 3);
    }

    #[test]
    fn test_second_shared_wait_polls_without_probing() {
        let mut b = Bench::new();
        let (_, mut ql) = pair(&mut b);
        let go = ql.declare_bool(&mut b.store, "go", true);
        b.store.set_bool(go, Logic::Zero).unwrap();
        let either = Expr::binary(BinOp::Or, Expr::probe("L"), Expr::var("go"));
        let body = Chp::Par(vec![
            Chp::Select(vec![GuardedCmd::new(Expr::var("go"), set("x", 1))]),
            Chp::Select(vec![GuardedCmd::new(either, Chp::recv("L", "x"))]),
        ]);
        let mut q = b.build(&ql, body);
        let pid = q.pid();

        assert_eq!(b.next(&mut q), StepResult::Forked);
        assert_eq!(b.next(&mut q), StepResult::Blocked);
        assert_eq!(q.stalled_slot(), Some(0));
        assert_eq!(b.next(&mut q), StepResult::Poll);
        assert_eq!(b.store.live_probe_waits(), 0);
        assert!(b.store.chan(ChanOffset(0)).unwrap().is_idle());

        let (ev, delay) = b.sched.pop().unwrap();
        assert_eq!((ev, delay), (Event::step(pid, 1), Config::default().default_delay()));
    }

    #[test]
    fn test_stale_wakeup_ignored() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        layout.declare_int(&mut b.store, "x", 4, false);
        let mut p = b.build(&layout, set("x", 1));
        let pid = p.pid();
        assert_eq!(b.step(&mut p, Event::wake(pid, 0)), StepResult::Stale);
        assert_eq!(b.step(&mut p, Event::unstall(pid)), StepResult::Stale);
        assert_eq!(p.live_slots(), 1);
    }

    #[test]
    fn test_log_statement() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        let x = layout.declare_int(&mut b.store, "x", 4, false);
        b.store.set_int(x, 7).unwrap();
        let mut p = b.build(
            &layout,
            Chp::log(vec![LogArg::Str("x=".to_string()), LogArg::Expr(Expr::var("x"))]),
        );
        b.sched.time = 42;
        assert_eq!(b.next(&mut p), StepResult::Ended);
        assert_eq!(b.log.lines(), &["[      42 t#:0] <top.p> x=7".to_string()]);
    }

    #[test]
    fn test_dump_state_and_restart() {
        let mut b = Bench::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        layout.declare_int(&mut b.store, "x", 4, false);
        let mut p = b.build(&layout, set("x", 1));
        assert_eq!(
            p.dump_state(),
            "--- Process: top.p [ proc ] ---\nt#00: assign: top.p.x\nEnergy cost: 0\nLeakage: 0 pW\nArea: 0\n"
        );

        b.next(&mut p);
        assert!(p.dump_state().contains("Terminated."));

        p.restart(&mut b.store, &mut b.sched).unwrap();
        assert_eq!(p.live_slots(), 1);
        assert_eq!(b.sched.events.len(), 1);
    }

    #[test]
    fn test_leakage_units() {
        assert_eq!(format_leakage(0.0), "0 pW");
        assert!(format_leakage(2.0e-6).ends_with(" uW"));
        assert!(format_leakage(5.0e-2).ends_with(" mW"));
        assert!(format_leakage(3.0e-9).ends_with(" nW"));
    }
}
