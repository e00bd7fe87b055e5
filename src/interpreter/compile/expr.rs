//! Compiled expressions.
//!
//! Variable references are resolved to store offsets ahead of time. Only the
//! array indices of a dereference are left to evaluate at run time.

use std::ops::Range;
use std::rc::Rc;

use super::function::CompiledFunction;
use crate::interpreter::value::Scalar;
use crate::lang::{BinOp, DataType, StructType, UnOp};
use crate::state::{ArrayRange, ChanDir, ChanOffset, ScalarSlot};

/// Run-time array index on a variable or structure reference.
#[derive(Debug, Clone)]
pub struct ArrayIndex {
    pub range: ArrayRange,
    pub indices: Vec<ChpExpr>,
    /// Integer slots per element.
    pub int_stride: usize,
    /// Boolean slots per element.
    pub bool_stride: usize,
}

/// Reference to a scalar in the global store.
#[derive(Debug, Clone)]
pub struct VarRef {
    /// Fully-qualified identifier.
    pub name: String,
    /// Location, of element 0 when indexed.
    pub slot: ScalarSlot,
    pub index: Option<Box<ArrayIndex>>,
    /// Visible to other processes.
    pub shared: bool,
}

impl VarRef {
    pub fn width(&self) -> u32 {
        self.slot.width()
    }
}

/// Reference to a structure in the global store.
#[derive(Debug, Clone)]
pub struct StructRef {
    pub name: String,
    pub ty: Rc<StructType>,
    /// Flattened field locations, of element 0 when indexed.
    pub slots: Vec<ScalarSlot>,
    pub index: Option<Box<ArrayIndex>>,
    pub shared: bool,
}

/// Reference to a channel.
#[derive(Debug, Clone)]
pub struct ChanRef {
    pub name: String,
    pub offset: ChanOffset,
    pub dir: ChanDir,
    pub data: DataType,
}

impl ChanRef {
    pub fn width(&self) -> u32 {
        self.data.width()
    }
}

/// Reference to a variable in a function's local scope.
#[derive(Debug, Clone)]
pub struct LocalRef {
    /// Scope binding name (`self` for the result).
    pub name: String,
    /// Type found at the end of the field path.
    pub ty: DataType,
    /// Flattened field positions covered within the binding.
    pub fields: Range<usize>,
}

/// Argument of a `log(...)` statement.
#[derive(Debug, Clone)]
pub enum LogItem {
    Str(String),
    Expr(ChpExpr),
}

/// A compiled expression.
#[derive(Debug, Clone)]
pub enum ChpExpr {
    Const(Scalar),
    Var(VarRef),
    Bitfield { var: VarRef, lo: u32, hi: u32 },
    Local(LocalRef),
    LocalBitfield { local: LocalRef, lo: u32, hi: u32 },
    /// Readiness of the opposite side of a channel.
    Probe(ChanRef),
    /// Data offered by a waiting sender.
    ChanValue(ChanRef),
    Unary(UnOp, Box<ChpExpr>),
    Binary(BinOp, Box<ChpExpr>, Box<ChpExpr>),
    Query(Box<ChpExpr>, Box<ChpExpr>, Box<ChpExpr>),
    Concat(Vec<ChpExpr>),
    BuiltinBool(Box<ChpExpr>),
    BuiltinInt(Box<ChpExpr>, Option<Box<ChpExpr>>),
    Call(Rc<CompiledFunction>, Vec<ChpExpr>),
    Struct(StructRef),
}

impl ChpExpr {
    /// Whether this expression produces an aggregate value.
    pub fn is_aggregate(&self) -> bool {
        match self {
            ChpExpr::Struct(_) => true,
            ChpExpr::ChanValue(c) => matches!(c.data, DataType::Struct(_)),
            ChpExpr::Call(f, _) => matches!(f.ret, DataType::Struct(_)),
            ChpExpr::Local(l) => matches!(l.ty, DataType::Struct(_)),
            _ => false,
        }
    }

    /// Visit this expression and every sub-expression, including array
    /// indices and call arguments, in pre-order.
    pub fn walk<'e>(&'e self, f: &mut dyn FnMut(&'e ChpExpr)) {
        f(self);
        match self {
            ChpExpr::Const(_)
            | ChpExpr::Local(_)
            | ChpExpr::LocalBitfield { .. }
            | ChpExpr::Probe(_)
            | ChpExpr::ChanValue(_) => {}
            ChpExpr::Var(v) | ChpExpr::Bitfield { var: v, .. } => walk_index(&v.index, f),
            ChpExpr::Struct(s) => walk_index(&s.index, f),
            ChpExpr::Unary(_, e) | ChpExpr::BuiltinBool(e) => e.walk(f),
            ChpExpr::BuiltinInt(e, w) => {
                e.walk(f);
                if let Some(w) = w {
                    w.walk(f);
                }
            }
            ChpExpr::Binary(_, l, r) => {
                l.walk(f);
                r.walk(f);
            }
            ChpExpr::Query(c, a, b) => {
                c.walk(f);
                a.walk(f);
                b.walk(f);
            }
            ChpExpr::Concat(items) | ChpExpr::Call(_, items) => {
                for e in items {
                    e.walk(f);
                }
            }
        }
    }
}

pub(crate) fn walk_index<'e>(index: &'e Option<Box<ArrayIndex>>, f: &mut dyn FnMut(&'e ChpExpr)) {
    if let Some(ix) = index {
        for e in &ix.indices {
            e.walk(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::IntOffset;

    fn var(name: &str, off: usize) -> ChpExpr {
        ChpExpr::Var(VarRef {
            name: name.to_string(),
            slot: ScalarSlot::Int(IntOffset(off), 8),
            index: None,
            shared: false,
        })
    }

    #[test]
    fn test_walk_visits_indices() {
        let indexed = ChpExpr::Var(VarRef {
            name: "a".to_string(),
            slot: ScalarSlot::Int(IntOffset(0), 8),
            index: Some(Box::new(ArrayIndex {
                range: ArrayRange::linear(4),
                indices: vec![var("i", 9)],
                int_stride: 1,
                bool_stride: 0,
            })),
            shared: false,
        });
        let e = ChpExpr::Binary(BinOp::Add, Box::new(indexed), Box::new(var("b", 1)));

        let mut names = Vec::new();
        e.walk(&mut |x| {
            if let ChpExpr::Var(v) = x {
                names.push(v.name.clone());
            }
        });
        assert_eq!(names, vec!["a", "i", "b"]);
        assert!(!e.is_aggregate());
    }
}
