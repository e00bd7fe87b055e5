//! CHP source trees handed over by the front end.
//!
//! Parsing and type checking happen elsewhere; this module only defines the
//! shape of what the simulator receives:
//!
//! - [`Id`] - dotted, optionally indexed identifiers (`a.b[i].c`)
//! - [`Expr`] - expressions over variables, probes and function calls
//! - [`Chp`] - the structured statement tree of a process body
//! - [`DataType`], [`StructType`], [`Function`] - the declarations they use
//!
//! # Example
//!
//! ```ignore
//! use chpsim::lang::{BinOp, Chp, Expr, Id};
//!
//! // x := x + 1
//! let body = Chp::assign(Id::new("x"), Expr::binary(BinOp::Add, Expr::var("x"), Expr::Int(1)));
//! ```

mod chp;
mod expr;
mod types;

pub use chp::{Chp, GuardedCmd, LogArg};
pub use expr::{BinOp, Expr, Id, IdPart, UnOp};
pub use types::{DataType, FieldKind, Function, StructType};
