//! Fan-out registration.
//!
//! A process is a listener of every variable its statements read. Writes to
//! a variable wake stalled listeners, so a selection waiting on shared state
//! re-evaluates when that state changes. Indexed references register every
//! element of the array, since the element read depends on run-time indices.

use crate::interpreter::compile::{walk_index, ArrayIndex, ChpExpr, LogItem};
use crate::interpreter::graph::{Graph, RecvTarget, Stmt};
use crate::interpreter::traits::SimResult;
use crate::state::{ProcessId, ScalarSlot, StateStore};

/// Register `pid` on every variable read by `graph`.
pub fn register_fanout(graph: &Graph, pid: ProcessId, store: &mut StateStore) -> SimResult<()> {
    let mut out = Vec::new();
    for stmt in graph.statements() {
        match &stmt.kind {
            Stmt::Fork { .. } => {}
            Stmt::Assign { target, value } => {
                reads(value, &mut out);
                walk_index(&target.index, &mut |e| note(e, &mut out));
            }
            Stmt::AssignStruct { target, value } => {
                reads(value, &mut out);
                walk_index(&target.index, &mut |e| note(e, &mut out));
            }
            Stmt::Send { value, .. } => {
                if let Some(v) = value {
                    reads(v, &mut out);
                }
            }
            Stmt::Recv { target, .. } => match target {
                Some(RecvTarget::Scalar(v)) => walk_index(&v.index, &mut |e| note(e, &mut out)),
                Some(RecvTarget::Struct(s)) => walk_index(&s.index, &mut |e| note(e, &mut out)),
                None => {}
            },
            Stmt::Log(items) => {
                for item in items {
                    if let LogItem::Expr(e) = item {
                        reads(e, &mut out);
                    }
                }
            }
            Stmt::Select { guards, .. } | Stmt::Loop { guards } => {
                for g in guards.iter().flatten() {
                    reads(g, &mut out);
                }
            }
        }
    }

    for loc in &out {
        match *loc {
            ScalarSlot::Bool(off) => store.add_bool_fanout(off, pid)?,
            ScalarSlot::Int(off, _) => store.add_int_fanout(off, pid)?,
        }
    }
    log::debug!("{}: listening on {} locations", store.process_name(pid), out.len());
    Ok(())
}

fn reads(e: &ChpExpr, out: &mut Vec<ScalarSlot>) {
    e.walk(&mut |sub| note(sub, out));
}

/// Record the locations of a variable reference, ignoring sub-expressions.
fn note(e: &ChpExpr, out: &mut Vec<ScalarSlot>) {
    match e {
        ChpExpr::Var(v) | ChpExpr::Bitfield { var: v, .. } => elements(v.slot, v.index.as_deref(), out),
        ChpExpr::Struct(s) => {
            for &slot in &s.slots {
                elements(slot, s.index.as_deref(), out);
            }
        }
        _ => {}
    }
}

/// Every location `slot` may denote under `index`.
fn elements(slot: ScalarSlot, index: Option<&ArrayIndex>, out: &mut Vec<ScalarSlot>) {
    match index {
        None => out.push(slot),
        Some(ix) => out.extend((0..ix.range.size()).map(|n| slot.element(n, ix.int_stride, ix.bool_stride))),
    }
}
