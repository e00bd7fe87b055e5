//! Statement graph nodes.
//!
//! A compiled process body is an arena of [`Node`]s addressed by [`NodeId`].
//! Nodes without a statement are structural: selection exits, loop exits and
//! join points. A program-counter slot passes through them without spending
//! time.

use std::fmt;

use crate::interpreter::compile::{ChanRef, ChpExpr, LogItem, StructRef, VarRef};
use crate::interpreter::sync::WaitSet;

/// Index of a node in its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Destination of a receive.
#[derive(Debug, Clone)]
pub enum RecvTarget {
    Scalar(VarRef),
    Struct(StructRef),
}

/// Statement kinds.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Start `arms` concurrent branches, listed in the node's `branches`.
    Fork { arms: usize },
    Assign { target: VarRef, value: ChpExpr },
    AssignStruct { target: StructRef, value: ChpExpr },
    Send { chan: ChanRef, value: Option<ChpExpr> },
    Recv { chan: ChanRef, target: Option<RecvTarget> },
    Log(Vec<LogItem>),
    /// Deterministic selection; blocks while every guard is false.
    Select { guards: Vec<Option<ChpExpr>>, wait: WaitSet },
    /// Loop; exits through `next` once every guard is false.
    Loop { guards: Vec<Option<ChpExpr>> },
}

/// A statement with its costs.
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: Stmt,
    /// Time from the previous statement of the slot to this one.
    pub delay: u64,
    pub energy: u64,
}

impl Statement {
    /// A statement with zero cost.
    pub fn free(kind: Stmt) -> Self {
        Self {
            kind,
            delay: 0,
            energy: 0,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Stmt::Fork { arms } => write!(f, "concur-fork: {}", arms),
            Stmt::Assign { target, .. } => write!(f, "assign: {}", target.name),
            Stmt::AssignStruct { target, .. } => write!(f, "assign-struct: {}", target.name),
            Stmt::Send { chan, .. } => write!(f, "send: {}", chan.name),
            Stmt::Recv { chan, .. } => write!(f, "recv: {}", chan.name),
            Stmt::Log(_) => write!(f, "log"),
            Stmt::Select { .. } => write!(f, "cond: "),
            Stmt::Loop { .. } => write!(f, "loop: "),
        }
    }
}

/// Join bookkeeping on a join node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    /// Index into the process's join counters.
    pub counter: usize,
    /// Arrivals needed before the join proceeds.
    pub wait: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub stmt: Option<Statement>,
    pub next: Option<NodeId>,
    /// Fork arms or guard targets, in order.
    pub branches: Vec<NodeId>,
    pub join: Option<Join>,
}

/// A compiled process body.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(super) nodes: Vec<Node>,
    pub(super) root: Option<NodeId>,
    /// Most program-counter slots live at once.
    pub(super) max_slots: usize,
    /// Join counters needed.
    pub(super) counters: usize,
}

impl Graph {
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Checked node access.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Entry node, `None` for an empty body.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    pub fn counters(&self) -> usize {
        self.counters
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Every statement in the graph.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.nodes.iter().filter_map(|n| n.stmt.as_ref())
    }

    /// Join nodes whose arrival count does not match the number of edges
    /// reaching them. Empty for every graph the builder produces.
    pub fn check_joins(&self) -> Vec<NodeId> {
        let mut incoming = vec![0usize; self.nodes.len()];
        for n in &self.nodes {
            if let Some(next) = n.next {
                incoming[next.0] += 1;
            }
        }
        self.iter()
            .filter(|(id, n)| n.join.is_some_and(|j| j.wait != incoming[id.0]))
            .map(|(id, _)| id)
            .collect()
    }
}
