//! Inter-process synchronization.
//!
//! | Part | Responsibility |
//! |------|----------------|
//! | `channel` | Send/receive rendezvous and probe wake-ups |
//! | `guard` | Wait registration for blocked selections |
//!
//! Everything here runs inside one process step. Peers are never called
//! directly; they are woken by scheduling an [`Event`](crate::interpreter::traits::Event).

mod channel;
mod guard;

pub use channel::{notify_probe, Rendezvous, Transfer};
pub use guard::{register_probes, undo_probes, WaitSet};
