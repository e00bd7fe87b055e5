//! CHP execution core.
//!
//! This module turns compiled process bodies into running process instances
//! and drives them with a discrete-event scheduler. It is designed for:
//!
//! - **Exact bit-widths**: every value carries its width; only assignment
//!   truncates
//! - **Compile once**: expressions and statement graphs are resolved against
//!   the layout before the first event
//! - **Deterministic runs**: events are delivered in time order, ties in
//!   scheduling order
//! - **Easy testing**: the [`traits::Scheduler`] seam lets tests step
//!   processes by hand
//!
//! # Architecture
//!
//! - [`traits`]: events, the scheduler seam, fatal errors
//! - [`value`]: sized scalar and aggregate values
//! - [`diagnostics`]: recoverable warnings and the simulation log
//! - [`compile`]: expression compiler
//! - [`graph`]: statement graph builder
//! - [`execute`]: expression and structure evaluation, function calls
//! - [`sync`]: channel rendezvous and guard wait protocols
//! - [`core`]: per-process execution
//! - [`engine`]: discrete-event coordinator
//!
//! # Example
//!
//! ```ignore
//! use chpsim::interpreter::{SimEngine, EngineStatus};
//!
//! let mut engine = SimEngine::new(config);
//! engine.add_process(&layout, Some(&body))?;
//! engine.run(10_000)?;
//! assert_eq!(engine.status(), EngineStatus::Halted);
//! ```

pub mod traits;
pub mod value;
pub mod diagnostics;
pub mod compile;
pub mod graph;
pub mod execute;
pub mod sync;
pub mod core;
pub mod engine;

// Re-export key types for convenience
pub use traits::{Event, Scheduler, SimError, SimResult, SlotRef};
pub use value::{Aggregate, Scalar, Value};
pub use diagnostics::{Diagnostics, SimLog, Warning};

// Build types
pub use compile::{ChpExpr, ExprCompiler};
pub use graph::{Graph, GraphBuilder, NodeId, Statement, Stmt};

// Execute types
pub use execute::{Evaluator, ExternRegistry};

// Core types
pub use core::{ChpProcess, ProcessStatus, StepContext, StepResult};

// Engine types
pub use engine::{EngineStatus, EventQueue, SimEngine};
