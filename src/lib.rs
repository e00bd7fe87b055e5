//! chpsim library
//!
//! Discrete-event execution core for CHP (Communicating Hardware Processes).

pub mod config;
pub mod lang;
pub mod state;
pub mod interpreter;
pub mod testing;
