//! Canonical end-to-end scenarios.
//!
//! Each [`Scenario`] declares its layouts in a fresh [`SimEngine`], adds its
//! process bodies and exposes the variables worth inspecting afterwards.
//!
//! | Scenario | Behaviour |
//! |----------|-----------|
//! | `producer-consumer` | one send/receive rendezvous |
//! | `probe-select` | consumer polls a probe until the producer arrives |
//! | `counter-wrap` | 4-bit counter overflowing on assignment |
//! | `fork-join` | parallel arms joined before a dependent assignment |
//! | `shared-flag` | selection stalled on a shared boolean |

use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::interpreter::engine::SimEngine;
use crate::interpreter::traits::SimResult;
use crate::lang::{BinOp, Chp, DataType, Expr, GuardedCmd, Id, LogArg};
use crate::state::{ChanDir, IntOffset, Logic, ProcessLayout, StateStore, Symbol};

/// A ready-made simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    ProducerConsumer,
    ProbeSelect,
    CounterWrap,
    ForkJoin,
    SharedFlag,
}

/// A built scenario: the engine plus the integers worth reporting.
pub struct ScenarioRun {
    pub engine: SimEngine,
    pub watch: Vec<(String, IntOffset)>,
}

impl ScenarioRun {
    /// Current value of a watched integer.
    pub fn value(&self, name: &str) -> Option<u64> {
        let (_, off) = self.watch.iter().find(|(n, _)| n == name)?;
        self.engine.store().get_int(*off).ok()
    }

    /// `name = value` for every watched integer.
    pub fn report(&self) -> String {
        self.watch
            .iter()
            .map(|(name, off)| match self.engine.store().get_int(*off) {
                Ok(v) => format!("{} = {}\n", name, v),
                Err(e) => format!("{} = <{}>\n", name, e),
            })
            .collect()
    }
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::ProducerConsumer,
        Scenario::ProbeSelect,
        Scenario::CounterWrap,
        Scenario::ForkJoin,
        Scenario::SharedFlag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::ProducerConsumer => "producer-consumer",
            Scenario::ProbeSelect => "probe-select",
            Scenario::CounterWrap => "counter-wrap",
            Scenario::ForkJoin => "fork-join",
            Scenario::SharedFlag => "shared-flag",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::ProducerConsumer => "P sends 5 on a channel, Q receives it into x",
            Scenario::ProbeSelect => "Q polls #L with an else arm until P's send arrives",
            Scenario::CounterWrap => "x := 15; x := x + 1 on a 4-bit x",
            Scenario::ForkJoin => "(a := 1, b := 2); c := a + b",
            Scenario::SharedFlag => "Q waits on shared go, P sets it later",
        }
    }

    /// Build the scenario in a fresh engine.
    pub fn build(self, config: Config) -> SimResult<ScenarioRun> {
        let mut engine = SimEngine::new(config);
        let watch = match self {
            Scenario::ProducerConsumer => producer_consumer(&mut engine)?,
            Scenario::ProbeSelect => probe_select(&mut engine)?,
            Scenario::CounterWrap => counter_wrap(&mut engine)?,
            Scenario::ForkJoin => fork_join(&mut engine)?,
            Scenario::SharedFlag => shared_flag(&mut engine)?,
        };
        Ok(ScenarioRun { engine, watch })
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| format!("unknown scenario `{}`", s))
    }
}

fn set(name: &str, e: Expr) -> Chp {
    Chp::assign(Id::new(name), e)
}

fn log_var(label: &str, name: &str) -> Chp {
    Chp::log(vec![LogArg::Str(label.to_string()), LogArg::Expr(Expr::var(name))])
}

/// Producer `top.p` with output `R`, consumer `top.q` seeing it as input `L`
/// with an 8-bit `x`.
fn channel_pair(engine: &mut SimEngine) -> (ProcessLayout, ProcessLayout, IntOffset) {
    let store = engine.store_mut();
    let mut p = ProcessLayout::new("top.p", "producer");
    let chan = p.declare_chan(store, "R", DataType::Int(8), ChanDir::Output);
    let mut q = ProcessLayout::new("top.q", "consumer");
    let x = q.declare_int(store, "x", 8, false);
    store_zero(store, x);
    q.bind("L", Symbol::chan(chan, ChanDir::Input, DataType::Int(8)));
    (p, q, x)
}

fn store_zero(store: &mut StateStore, off: IntOffset) {
    // Fresh offsets are always in range.
    let _ = store.set_int(off, 0);
}

fn producer_consumer(engine: &mut SimEngine) -> SimResult<Vec<(String, IntOffset)>> {
    let (p, q, x) = channel_pair(engine);
    engine.add_process(&p, Some(&Chp::send("R", Expr::Int(5))))?;
    let body = Chp::Seq(vec![Chp::recv("L", "x"), log_var("got ", "x")]);
    engine.add_process(&q, Some(&body))?;
    Ok(vec![("top.q.x".to_string(), x)])
}

fn probe_select(engine: &mut SimEngine) -> SimResult<Vec<(String, IntOffset)>> {
    let (mut p, mut q, x) = channel_pair(engine);
    let store = engine.store_mut();
    let t = p.declare_int(store, "t", 4, false);
    let polls = q.declare_int(store, "polls", 8, false);
    store_zero(store, t);
    store_zero(store, polls);

    // Let the consumer poll a few times before sending.
    let producer = Chp::Seq(vec![
        Chp::Loop(vec![GuardedCmd::new(
            Expr::binary(BinOp::Lt, Expr::var("t"), Expr::Int(3)),
            set("t", Expr::binary(BinOp::Add, Expr::var("t"), Expr::Int(1))),
        )]),
        Chp::send("R", Expr::Int(5)),
    ]);
    let poll = Chp::Select(vec![
        GuardedCmd::new(Expr::probe("L"), Chp::recv("L", "x")),
        GuardedCmd::otherwise(Some(set(
            "polls",
            Expr::binary(BinOp::Add, Expr::var("polls"), Expr::Int(1)),
        ))),
    ]);
    let consumer = Chp::Seq(vec![
        Chp::Loop(vec![GuardedCmd::new(
            Expr::binary(BinOp::Eq, Expr::var("x"), Expr::Int(0)),
            poll,
        )]),
        log_var("probe took ", "x"),
    ]);
    engine.add_process(&p, Some(&producer))?;
    engine.add_process(&q, Some(&consumer))?;
    Ok(vec![("top.q.x".to_string(), x), ("top.q.polls".to_string(), polls)])
}

fn counter_wrap(engine: &mut SimEngine) -> SimResult<Vec<(String, IntOffset)>> {
    let mut l = ProcessLayout::new("top.c", "counter");
    let x = l.declare_int(engine.store_mut(), "x", 4, false);
    let body = Chp::Seq(vec![
        set("x", Expr::Int(15)),
        set("x", Expr::binary(BinOp::Add, Expr::var("x"), Expr::Int(1))),
        log_var("x=", "x"),
    ]);
    engine.add_process(&l, Some(&body))?;
    Ok(vec![("top.c.x".to_string(), x)])
}

fn fork_join(engine: &mut SimEngine) -> SimResult<Vec<(String, IntOffset)>> {
    let mut l = ProcessLayout::new("top.f", "forker");
    let store = engine.store_mut();
    let a = l.declare_int(store, "a", 4, false);
    let b = l.declare_int(store, "b", 4, false);
    let c = l.declare_int(store, "c", 4, false);
    let body = Chp::Seq(vec![
        Chp::Par(vec![set("a", Expr::Int(1)), set("b", Expr::Int(2))]),
        set("c", Expr::binary(BinOp::Add, Expr::var("a"), Expr::var("b"))),
        log_var("c=", "c"),
    ]);
    engine.add_process(&l, Some(&body))?;
    Ok(vec![
        ("top.f.a".to_string(), a),
        ("top.f.b".to_string(), b),
        ("top.f.c".to_string(), c),
    ])
}

fn shared_flag(engine: &mut SimEngine) -> SimResult<Vec<(String, IntOffset)>> {
    let store = engine.store_mut();
    let mut q = ProcessLayout::new("top.q", "waiter");
    let go = q.declare_bool(store, "go", true);
    let y = q.declare_int(store, "y", 2, false);
    let _ = store.set_bool(go, Logic::Zero);
    store_zero(store, y);

    let mut p = ProcessLayout::new("top.p", "setter");
    let t = p.declare_int(store, "t", 2, false);
    store_zero(store, t);
    p.bind("go", Symbol::Bool { offset: go, shared: true });

    let waiter = Chp::Seq(vec![
        Chp::Select(vec![GuardedCmd::new(Expr::var("go"), set("y", Expr::Int(3)))]),
        log_var("y=", "y"),
    ]);
    let setter = Chp::Seq(vec![set("t", Expr::Int(1)), set("go", Expr::True)]);
    engine.add_process(&q, Some(&waiter))?;
    engine.add_process(&p, Some(&setter))?;
    Ok(vec![("top.q.y".to_string(), y), ("top.p.t".to_string(), t)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::engine::EngineStatus;
    use crate::state::ChanOffset;

    fn run(sc: Scenario) -> ScenarioRun {
        let mut r = sc.build(Config::default()).unwrap();
        r.engine.run(1_000).unwrap();
        r
    }

    #[test]
    fn test_producer_consumer() {
        let r = run(Scenario::ProducerConsumer);
        assert_eq!(r.value("top.q.x"), Some(5));
        assert_eq!(r.engine.status(), EngineStatus::Halted);
        assert_eq!(r.engine.log().lines(), &["[      10 t#:0] <top.q> got 5".to_string()]);
        assert!(r.engine.store().chan(ChanOffset(0)).unwrap().is_idle());
        assert!(r.engine.diagnostics().warnings().is_empty());
    }

    #[test]
    fn test_probe_select_polls_then_receives() {
        let r = run(Scenario::ProbeSelect);
        assert_eq!(r.value("top.q.x"), Some(5));
        assert!(r.value("top.q.polls").unwrap() > 0);
        assert_eq!(r.engine.status(), EngineStatus::Halted);
        assert_eq!(r.engine.store().live_probe_waits(), 0);
    }

    #[test]
    fn test_counter_wraps() {
        let r = run(Scenario::CounterWrap);
        assert_eq!(r.value("top.c.x"), Some(0));
        assert_eq!(r.engine.log().lines(), &["[      20 t#:0] <top.c> x=0".to_string()]);
    }

    #[test]
    fn test_fork_join() {
        let r = run(Scenario::ForkJoin);
        assert_eq!(r.value("top.f.c"), Some(3));
        let p = &r.engine.processes()[0];
        assert_eq!(p.join_count(0), 0);
        assert!(p.dump_state().contains("Terminated."));
    }

    #[test]
    fn test_shared_flag() {
        let r = run(Scenario::SharedFlag);
        assert_eq!(r.value("top.q.y"), Some(3));
        assert_eq!(r.engine.status(), EngineStatus::Halted);
        assert!(!r.engine.store().is_stalled(r.engine.processes()[0].pid()));
    }

    #[test]
    fn test_names_round_trip() {
        for sc in Scenario::ALL {
            assert_eq!(sc.name().parse::<Scenario>(), Ok(sc));
        }
        assert!("nope".parse::<Scenario>().is_err());
    }
}
