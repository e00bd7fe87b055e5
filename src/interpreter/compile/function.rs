//! Compiled CHP functions.
//!
//! A function body is restricted to statements without side effects on
//! global state: no communication and no replication. Parallel
//! composition runs its arms in order.

use super::expr::{ChpExpr, LocalRef, LogItem};
use crate::lang::DataType;

/// A guarded arm inside a function body. `None` guard is `else`.
pub type FnArm = (Option<ChpExpr>, Option<FnStmt>);

/// Statement of a function body.
#[derive(Debug, Clone)]
pub enum FnStmt {
    Seq(Vec<FnStmt>),
    Select(Vec<FnArm>),
    Loop(Vec<FnArm>),
    DoLoop(Option<Box<FnStmt>>, ChpExpr),
    Skip,
    Assign(LocalRef, ChpExpr),
    Log(Vec<LogItem>),
}

/// A function ready to be called by the evaluator.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub ports: Vec<(String, DataType)>,
    pub locals: Vec<(String, DataType)>,
    pub ret: DataType,
    /// `None` for external functions.
    pub body: Option<FnStmt>,
}

impl CompiledFunction {
    pub fn is_external(&self) -> bool {
        self.body.is_none()
    }
}
