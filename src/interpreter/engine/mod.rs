//! Discrete-event simulation engine.
//!
//! The `SimEngine` owns the global state store, the event queue and every
//! process instance. It provides the run loop for the CLI and the tests.
//!
//! # Execution Model
//!
//! Events are delivered strictly in time order, ties in scheduling order.
//! Each event advances one slot of one process by one statement, atomically
//! with respect to every other event. The run stops at the first fatal error.
//!
//! # Example
//!
//! ```ignore
//! use chpsim::config::Config;
//! use chpsim::interpreter::engine::SimEngine;
//!
//! let mut engine = SimEngine::new(Config::get().clone());
//! engine.add_process(&layout, Some(&body))?;
//!
//! // Run for up to 1000 events
//! engine.run(1000)?;
//! print!("{}", engine.dump_state());
//! ```

mod coordinator;
mod queue;

pub use coordinator::{EngineStatus, SimEngine};
pub use queue::EventQueue;
