//! Expression compiler.
//!
//! A one-time preprocessing step: source expressions from [`crate::lang`]
//! become [`ChpExpr`]s with variable references resolved to store offsets,
//! array dereference descriptors or channel handles.

mod compiler;
mod expr;
mod function;

pub use compiler::{literal_width, ExprCompiler, Resolved};
pub use expr::{ArrayIndex, ChanRef, ChpExpr, LocalRef, LogItem, StructRef, VarRef};
pub(crate) use expr::walk_index;
pub use function::{CompiledFunction, FnArm, FnStmt};
