//! Expression and structure evaluation.
//!
//! | Part | Responsibility |
//! |------|----------------|
//! | `scalar` | Scalar expressions, width rules, array dereference |
//! | `structure` | Aggregate values, structure reads and writes |
//! | `function` | CHP-bodied and external function calls |
//! | `scope` | Function-local bindings |
//! | `externs` | Native function registry |
//!
//! # Example
//!
//! ```ignore
//! use chpsim::interpreter::execute::{Evaluator, ExternRegistry, ScopeStack};
//!
//! let mut ev = Evaluator::new(&store, &mut scopes, &externs, &mut diag, &mut log, "top.p");
//! let v = ev.eval(&expr)?;
//! ```

mod externs;
mod function;
mod scalar;
mod scope;
mod structure;

pub use externs::{ExternFn, ExternRegistry};
pub use scalar::Evaluator;
pub use scope::{Scope, ScopeStack};
pub use structure::{write_fields, write_scalar};
