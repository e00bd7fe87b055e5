//! Statement graph construction.
//!
//! | Statement | Shape |
//! |-----------|-------|
//! | sequence | sub-graphs chained through `next` |
//! | parallel | fork node, arms, join node |
//! | selection | guard node, arms converging on a post node |
//! | loop | guard node, arms looping back to it, exit through `next` |
//! | do-loop | body, then a one-guard loop node looping back to the body |
//! | leaf | one node carrying the statement |
//!
//! Each sub-graph is returned as an `(entry, exit)` pair. The caller attaches
//! its continuation to the exit's `next` edge. Statements that produce no
//! node (`skip`, empty sequences) return `None`.

use crate::config::Config;
use crate::interpreter::compile::{ChpExpr, ExprCompiler, Resolved};
use crate::interpreter::diagnostics::Warning;
use crate::interpreter::sync::WaitSet;
use crate::interpreter::traits::{SimError, SimResult};
use crate::lang::{Chp, GuardedCmd, Id};
use crate::state::ChanDir;

use super::node::{Graph, Join, Node, NodeId, RecvTarget, Statement, Stmt};

/// Hard limit on concurrently live program-counter slots per process.
pub const MAX_SLOTS: usize = 32;

type Span = Option<(NodeId, NodeId)>;

/// Builds the [`Graph`] of one process body.
pub struct GraphBuilder<'a, 'c> {
    exprs: &'c mut ExprCompiler<'a>,
    config: &'c Config,
    graph: Graph,
    /// First join counter free for the fork being built.
    next_counter: usize,
}

impl<'a, 'c> GraphBuilder<'a, 'c> {
    pub fn new(exprs: &'c mut ExprCompiler<'a>, config: &'c Config) -> Self {
        Self {
            exprs,
            config,
            graph: Graph::default(),
            next_counter: 0,
        }
    }

    /// Compile `body` into a graph.
    pub fn build(mut self, body: Option<&Chp>) -> SimResult<Graph> {
        let process = self.exprs.layout().instance_name().to_string();
        let required = body.map_or(1, max_program_counters);
        if required > MAX_SLOTS {
            return Err(SimError::TooManyThreads {
                process,
                required,
                limit: MAX_SLOTS,
            });
        }

        let span = match body {
            Some(c) => self.chp(c)?,
            None => None,
        };
        self.graph.root = span.map(|(entry, _)| entry);
        self.graph.max_slots = required;
        log::debug!(
            "{}: graph of {} nodes, {} slots, {} join counters",
            process,
            self.graph.nodes.len(),
            self.graph.max_slots,
            self.graph.counters
        );
        Ok(self.graph)
    }

    fn add(&mut self, node: Node) -> NodeId {
        self.graph.nodes.push(node);
        NodeId(self.graph.nodes.len() - 1)
    }

    fn leaf(&mut self, stmt: Statement) -> Span {
        let id = self.add(Node {
            stmt: Some(stmt),
            ..Node::default()
        });
        Some((id, id))
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.graph.nodes[from.0].next = Some(to);
    }

    fn costed(&self, kind: Stmt, id: &Id) -> Statement {
        let (delay, energy) = self
            .config
            .stmt_costs(self.exprs.layout().type_name(), id.root());
        Statement {
            kind,
            delay,
            energy,
        }
    }

    fn chp(&mut self, c: &Chp) -> SimResult<Span> {
        match c {
            Chp::Seq(items) => self.seq(items),
            Chp::Par(arms) => self.par(arms),
            Chp::Select(gcs) | Chp::SelectNondet(gcs) => self.select(gcs),
            Chp::Loop(gcs) => self.lp(gcs),
            Chp::DoLoop(gc) => self.do_loop(gc),
            Chp::Skip => Ok(None),
            Chp::Assign(id, e) => {
                let value = self.exprs.compile(e)?;
                let kind = match self.exprs.resolve(id)? {
                    Resolved::Scalar(target) => Stmt::Assign { target, value },
                    Resolved::Struct(target) => Stmt::AssignStruct { target, value },
                    Resolved::Chan(_) => return Err(self.wrong_kind(id, "a variable")),
                };
                let stmt = self.costed(kind, id);
                Ok(self.leaf(stmt))
            }
            Chp::Send(id, e) => {
                let chan = self.exprs.channel(id)?;
                if chan.dir != ChanDir::Output {
                    return Err(self.wrong_kind(id, "an output channel"));
                }
                let value = e.as_ref().map(|e| self.exprs.compile(e)).transpose()?;
                let stmt = self.costed(Stmt::Send { chan, value }, id);
                Ok(self.leaf(stmt))
            }
            Chp::Recv(id, target) => {
                let chan = self.exprs.channel(id)?;
                if chan.dir != ChanDir::Input {
                    return Err(self.wrong_kind(id, "an input channel"));
                }
                let target = match target {
                    None => None,
                    Some(t) => Some(match self.exprs.resolve(t)? {
                        Resolved::Scalar(v) => RecvTarget::Scalar(v),
                        Resolved::Struct(s) => RecvTarget::Struct(s),
                        Resolved::Chan(_) => return Err(self.wrong_kind(t, "a variable")),
                    }),
                };
                let stmt = self.costed(Stmt::Recv { chan, target }, id);
                Ok(self.leaf(stmt))
            }
            Chp::Call(name, args) => {
                if name != "log" {
                    let process = self.exprs.layout().instance_name().to_string();
                    self.exprs.warn(Warning::UnknownBuiltin {
                        process,
                        name: name.clone(),
                    });
                    return Ok(None);
                }
                let items = self.exprs.log_args(args)?;
                Ok(self.leaf(Statement::free(Stmt::Log(items))))
            }
        }
    }

    fn seq(&mut self, items: &[Chp]) -> SimResult<Span> {
        let mut span: Span = None;
        for item in items {
            let Some((entry, exit)) = self.chp(item)? else {
                continue;
            };
            span = match span {
                None => Some((entry, exit)),
                Some((first, last)) => {
                    self.link(last, entry);
                    Some((first, exit))
                }
            };
        }
        Ok(span)
    }

    fn par(&mut self, arms: &[Chp]) -> SimResult<Span> {
        // Sibling arms run at the same time, so a counter used anywhere in
        // one arm is never handed to another. Once the whole composition
        // has joined, its counters are free for whatever follows it.
        let mine = self.next_counter;
        self.next_counter = mine + 1;
        self.graph.counters = self.graph.counters.max(self.next_counter);

        let mut entries = Vec::new();
        let mut exits = Vec::new();
        for arm in arms {
            if let Some((entry, exit)) = self.chp(arm)? {
                entries.push(entry);
                exits.push(exit);
            }
            self.next_counter = self.graph.counters;
        }
        self.next_counter = mine;

        match entries.len() {
            0 => Ok(None),
            1 => Ok(Some((entries[0], exits[0]))),
            n => {
                let join = self.add(Node {
                    join: Some(Join {
                        counter: mine,
                        wait: n,
                    }),
                    ..Node::default()
                });
                for exit in exits {
                    self.link(exit, join);
                }
                let fork = self.add(Node {
                    stmt: Some(Statement::free(Stmt::Fork { arms: n })),
                    branches: entries,
                    ..Node::default()
                });
                Ok(Some((fork, join)))
            }
        }
    }

    fn guards(&mut self, gcs: &[GuardedCmd]) -> SimResult<Vec<Option<ChpExpr>>> {
        if gcs.is_empty() {
            return Err(SimError::Malformed("guarded command without arms".to_string()));
        }
        gcs.iter()
            .map(|gc| {
                if gc.replicator.is_some() {
                    return Err(SimError::Malformed(format!(
                        "{}: replicated guards must be expanded before simulation",
                        self.exprs.layout().instance_name()
                    )));
                }
                gc.guard.as_ref().map(|g| self.exprs.compile(g)).transpose()
            })
            .collect()
    }

    fn select(&mut self, gcs: &[GuardedCmd]) -> SimResult<Span> {
        let guards = self.guards(gcs)?;
        let wait = WaitSet::collect(guards.iter().flatten());
        let node = self.add(Node {
            stmt: Some(Statement::free(Stmt::Select { guards, wait })),
            ..Node::default()
        });
        let post = self.add(Node::default());
        let mut branches = Vec::with_capacity(gcs.len());
        for gc in gcs {
            let target = match gc.body.as_ref().map(|b| self.chp(b)).transpose()?.flatten() {
                Some((entry, exit)) => {
                    self.link(exit, post);
                    entry
                }
                None => post,
            };
            branches.push(target);
        }
        let n = &mut self.graph.nodes[node.0];
        n.branches = branches;
        n.next = Some(post);
        Ok(Some((node, post)))
    }

    fn lp(&mut self, gcs: &[GuardedCmd]) -> SimResult<Span> {
        let guards = self.guards(gcs)?;
        let node = self.add(Node {
            stmt: Some(Statement::free(Stmt::Loop { guards })),
            ..Node::default()
        });
        let mut branches = Vec::with_capacity(gcs.len());
        for gc in gcs {
            let target = match gc.body.as_ref().map(|b| self.chp(b)).transpose()?.flatten() {
                Some((entry, exit)) => {
                    self.link(exit, node);
                    entry
                }
                None => node,
            };
            branches.push(target);
        }
        self.graph.nodes[node.0].branches = branches;
        Ok(Some((node, node)))
    }

    fn do_loop(&mut self, gc: &GuardedCmd) -> SimResult<Span> {
        let guards = self.guards(std::slice::from_ref(gc))?;
        let node = self.add(Node {
            stmt: Some(Statement::free(Stmt::Loop { guards })),
            ..Node::default()
        });
        let body = gc.body.as_ref().map(|b| self.chp(b)).transpose()?.flatten();
        match body {
            Some((entry, exit)) => {
                self.link(exit, node);
                self.graph.nodes[node.0].branches = vec![entry];
                Ok(Some((entry, node)))
            }
            None => {
                self.graph.nodes[node.0].branches = vec![node];
                Ok(Some((node, node)))
            }
        }
    }

    fn wrong_kind(&self, id: &Id, expected: &'static str) -> SimError {
        SimError::WrongKind {
            ident: id.to_string(),
            process: self.exprs.layout().instance_name().to_string(),
            expected,
        }
    }
}

/// Most program-counter slots `c` can keep live at once.
pub fn max_program_counters(c: &Chp) -> usize {
    let arms = |gcs: &[GuardedCmd]| {
        gcs.iter()
            .filter_map(|gc| gc.body.as_ref())
            .map(max_program_counters)
            .max()
            .unwrap_or(1)
    };
    match c {
        Chp::Seq(items) => items.iter().map(max_program_counters).max().unwrap_or(1),
        Chp::Par(items) => items.iter().map(max_program_counters).sum::<usize>().max(1),
        Chp::Select(gcs) | Chp::SelectNondet(gcs) | Chp::Loop(gcs) => arms(gcs),
        Chp::DoLoop(gc) => arms(std::slice::from_ref(gc)),
        _ => 1,
    }
}
