//! Global simulation state.
//!
//! This module holds everything shared between process instances:
//!
//! - [`StateStore`]: flat boolean/integer vectors, channel descriptors,
//!   fan-out lists, probe-wait objects and the stall registry
//! - [`ChannelState`]: per-channel rendezvous bookkeeping
//! - [`ProcessLayout`]: identifier to offset resolution for one instance

pub mod channel;
pub mod layout;
pub mod store;

pub use channel::{ChanDir, ChannelState, ProbeWait, ProbeWaitId, Waiter};
pub use layout::{field_slots, ArrayRange, LayoutResolver, ProcessLayout, ScalarSlot, Symbol};
pub use store::{BoolOffset, ChanOffset, IntOffset, Logic, ProcessId, StateStore};
