//! Statement graphs.
//!
//! A process body is compiled once into a [`Graph`]: an arena of nodes
//! linked by `next` edges, with fork, join and guard nodes modelling
//! parallel composition and guarded commands. Process instances walk the
//! graph with program-counter slots.
//!
//! # Example
//!
//! ```ignore
//! use chpsim::interpreter::compile::ExprCompiler;
//! use chpsim::interpreter::graph::GraphBuilder;
//!
//! let mut exprs = ExprCompiler::new(&layout, &mut diag);
//! let graph = GraphBuilder::new(&mut exprs, &config).build(Some(&body))?;
//! assert!(graph.check_joins().is_empty());
//! ```

mod builder;
mod node;

pub use builder::{max_program_counters, GraphBuilder, MAX_SLOTS};
pub use node::{Graph, Join, Node, NodeId, RecvTarget, Statement, Stmt};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::interpreter::compile::ExprCompiler;
    use crate::interpreter::diagnostics::{Diagnostics, Warning};
    use crate::interpreter::traits::SimError;
    use crate::lang::{BinOp, Chp, DataType, Expr, GuardedCmd, Id, LogArg};
    use crate::state::{ChanDir, ProcessLayout, StateStore};

    fn layout(store: &mut StateStore) -> ProcessLayout {
        let mut layout = ProcessLayout::new("top.p", "proc");
        layout.declare_int(store, "x", 4, false);
        layout.declare_int(store, "y", 4, false);
        layout.declare_bool(store, "go", true);
        layout.declare_chan(store, "L", DataType::Int(8), ChanDir::Input);
        layout.declare_chan(store, "R", DataType::Int(8), ChanDir::Output);
        layout
    }

    fn build(body: &Chp, config: &Config) -> (Result<Graph, SimError>, Diagnostics) {
        let mut store = StateStore::new();
        let layout = layout(&mut store);
        let mut diag = Diagnostics::new();
        let graph = {
            let mut exprs = ExprCompiler::new(&layout, &mut diag);
            GraphBuilder::new(&mut exprs, config).build(Some(body))
        };
        (graph, diag)
    }

    fn set(name: &str, v: u64) -> Chp {
        Chp::assign(Id::new(name), Expr::Int(v))
    }

    #[test]
    fn test_sequence_chains() {
        let body = Chp::Seq(vec![set("x", 1), Chp::Skip, set("y", 2)]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();
        assert_eq!(graph.len(), 2);
        let root = graph.root().unwrap();
        let second = graph.node(root).next.unwrap();
        assert_eq!(graph.node(second).stmt.as_ref().unwrap().to_string(), "assign: top.p.y");
        assert!(graph.node(second).next.is_none());
    }

    #[test]
    fn test_fork_join_shape() {
        let body = Chp::Seq(vec![
            Chp::Par(vec![set("x", 1), Chp::Skip, set("y", 2)]),
            Chp::send("R", Expr::var("x")),
        ]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();

        let fork = graph.node(graph.root().unwrap());
        assert_eq!(fork.stmt.as_ref().unwrap().to_string(), "concur-fork: 2");
        assert_eq!(fork.branches.len(), 2);

        let join_id = graph.node(fork.branches[0]).next.unwrap();
        assert_eq!(graph.node(fork.branches[1]).next, Some(join_id));
        let join = graph.node(join_id);
        assert!(join.stmt.is_none());
        assert_eq!(join.join.unwrap().wait, 2);
        assert_eq!(graph.node(join.next.unwrap()).stmt.as_ref().unwrap().to_string(), "send: top.p.R");

        assert!(graph.check_joins().is_empty());
        assert_eq!(graph.max_slots(), 3);
        assert_eq!(graph.counters(), 1);
    }

    #[test]
    fn test_sibling_forks_get_distinct_counters() {
        let inner = || Chp::Par(vec![set("x", 1), set("y", 1)]);
        let body = Chp::Seq(vec![Chp::Par(vec![inner(), inner()]), inner()]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();

        let outer = graph.node(graph.root().unwrap());
        let a = graph.node(outer.branches[0]);
        let b = graph.node(outer.branches[1]);
        let counter_of = |fork: &Node| {
            let exit = graph.node(fork.branches[0]).next.unwrap();
            graph.node(exit).join.unwrap().counter
        };
        let outer_join = graph.node(a.branches[0]).next.unwrap();
        let outer_join = graph.node(outer_join).next.unwrap();
        assert_ne!(counter_of(a), counter_of(b));
        assert_eq!(graph.node(outer_join).join.unwrap().counter, 0);

        // The trailing fork runs after everything above has joined.
        let trailing = graph.node(graph.node(outer_join).next.unwrap());
        assert_eq!(counter_of(trailing), 0);
        assert_eq!(graph.counters(), 3);
        assert!(graph.check_joins().is_empty());
    }

    #[test]
    fn test_selection_shape() {
        let g = Expr::binary(BinOp::Gt, Expr::var("x"), Expr::Int(2));
        let body = Chp::Select(vec![
            GuardedCmd::new(g, set("y", 1)),
            GuardedCmd::otherwise(None),
        ]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();
        let sel = graph.node(graph.root().unwrap());
        assert_eq!(sel.stmt.as_ref().unwrap().to_string(), "cond: ");
        let post = sel.branches[1];
        assert!(graph.node(post).stmt.is_none());
        assert_eq!(graph.node(sel.branches[0]).next, Some(post));
        match &sel.stmt.as_ref().unwrap().kind {
            Stmt::Select { wait, .. } => assert!(wait.is_empty()),
            other => panic!("expected selection, got {:?}", other),
        }
    }

    #[test]
    fn test_selection_waits_on_probe_and_shared() {
        let body = Chp::Select(vec![
            GuardedCmd::new(Expr::probe("L"), Chp::recv("L", "x")),
            GuardedCmd::skip(Expr::var("go")),
        ]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();
        match &graph.node(graph.root().unwrap()).stmt.as_ref().unwrap().kind {
            Stmt::Select { wait, .. } => {
                assert_eq!(wait.probes.len(), 1);
                assert!(wait.shared);
            }
            other => panic!("expected selection, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_shape() {
        let g = Expr::binary(BinOp::Lt, Expr::var("x"), Expr::Int(3));
        let body = Chp::Seq(vec![
            Chp::Loop(vec![
                GuardedCmd::new(g, set("x", 1)),
                GuardedCmd::skip(Expr::False),
            ]),
            set("y", 0),
        ]);
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();
        let lp_id = graph.root().unwrap();
        let lp = graph.node(lp_id);
        assert_eq!(graph.node(lp.branches[0]).next, Some(lp_id));
        assert_eq!(lp.branches[1], lp_id);
        assert_eq!(graph.node(lp.next.unwrap()).stmt.as_ref().unwrap().to_string(), "assign: top.p.y");
    }

    #[test]
    fn test_do_loop_enters_body() {
        let g = Expr::binary(BinOp::Lt, Expr::var("x"), Expr::Int(3));
        let body = Chp::DoLoop(Box::new(GuardedCmd::new(g, set("x", 1))));
        let (graph, _) = build(&body, &Config::default());
        let graph = graph.unwrap();
        let entry = graph.node(graph.root().unwrap());
        assert_eq!(entry.stmt.as_ref().unwrap().to_string(), "assign: top.p.x");
        let guard_id = entry.next.unwrap();
        let guard = graph.node(guard_id);
        assert_eq!(guard.stmt.as_ref().unwrap().to_string(), "loop: ");
        assert_eq!(guard.branches, vec![graph.root().unwrap()]);
    }

    #[test]
    fn test_costs_from_config() {
        let config = Config::from_toml_str(
            r#"
            [chp.process.proc.stmt.x]
            D = 3
            E = 7
            "#,
        )
        .unwrap();
        let body = Chp::Seq(vec![set("x", 1), set("y", 1), Chp::log(vec![LogArg::Str("hi".to_string())])]);
        let (graph, _) = build(&body, &config);
        let graph = graph.unwrap();
        let costs: Vec<(u64, u64)> = graph.statements().map(|s| (s.delay, s.energy)).collect();
        assert_eq!(costs, vec![(3, 7), (10, 0), (0, 0)]);
    }

    #[test]
    fn test_thread_limit() {
        let wide = Chp::Par((0..33).map(|_| set("x", 1)).collect());
        let (graph, _) = build(&wide, &Config::default());
        assert!(matches!(
            graph,
            Err(SimError::TooManyThreads {
                required: 33,
                limit: 32,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_builtin_warns() {
        let body = Chp::Call("assert".to_string(), vec![]);
        let (graph, diag) = build(&body, &Config::default());
        assert!(graph.unwrap().root().is_none());
        assert!(matches!(diag.warnings()[0], Warning::UnknownBuiltin { .. }));
    }

    #[test]
    fn test_send_on_input_channel() {
        let (graph, _) = build(&Chp::send("L", Expr::Int(1)), &Config::default());
        assert!(matches!(graph, Err(SimError::WrongKind { .. })));
    }

    #[test]
    fn test_replicated_guard_rejected() {
        let mut gc = GuardedCmd::skip(Expr::True);
        gc.replicator = Some("i".to_string());
        let (graph, _) = build(&Chp::Select(vec![gc]), &Config::default());
        assert!(matches!(graph, Err(SimError::Malformed(_))));
    }
}
