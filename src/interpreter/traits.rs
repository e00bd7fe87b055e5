//! Core traits and shared types for the interpreter.
//!
//! These define the abstraction boundaries between the execution core and
//! its collaborators:
//!
//! - `Scheduler`: the discrete-event queue that delivers [`Event`]s back to
//!   process instances
//! - `SimError`: every fatal condition, returned through `Result`
//!
//! The step of a process instance is atomic with respect to all other
//! events. Everything it wants to happen later (its own continuation, the
//! wake-up of a peer blocked on a channel) goes through `Scheduler::schedule`.

use std::fmt;

use smallvec::SmallVec;
use thiserror::Error;

use crate::state::ProcessId;

/// Which program-counter slot an event resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRef {
    /// A specific slot.
    Slot(usize),
    /// Whatever slot the process has recorded as stalled on shared state.
    Stalled,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotRef::Slot(s) => write!(f, "t#{:02}", s),
            SlotRef::Stalled => write!(f, "t#stall"),
        }
    }
}

/// A scheduled callback into a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Target process.
    pub process: ProcessId,
    /// Slot to advance.
    pub slot: SlotRef,
    /// Set when the event resumes a blocked or stalled slot.
    pub wakeup: bool,
}

impl Event {
    /// Plain continuation of a slot.
    pub fn step(process: ProcessId, slot: usize) -> Self {
        Self {
            process,
            slot: SlotRef::Slot(slot),
            wakeup: false,
        }
    }

    /// Resumption of a slot after a notification.
    pub fn wake(process: ProcessId, slot: usize) -> Self {
        Self {
            process,
            slot: SlotRef::Slot(slot),
            wakeup: true,
        }
    }

    /// Resumption of the stalled slot after a shared-variable change.
    pub fn unstall(process: ProcessId) -> Self {
        Self {
            process,
            slot: SlotRef::Stalled,
            wakeup: true,
        }
    }
}

/// The discrete-event scheduler seam.
///
/// Implemented by the engine's event queue; tests may drive a process
/// instance with any implementation.
pub trait Scheduler {
    /// Deliver `event` after `delay` time units.
    fn schedule(&mut self, event: Event, delay: u64);

    /// Current simulation time.
    fn now(&self) -> u64;
}

/// Index vector attached to out-of-bounds reports.
pub type IndexVec = SmallVec<[i64; 4]>;

fn fmt_indices(indices: &IndexVec) -> String {
    indices.iter().map(|i| format!("[{}]", i)).collect()
}

/// Fatal simulation errors.
///
/// Any of these aborts the run: the engine stops at the first one and hands
/// it to its caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Internal consistency failure in the compiled representation.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Identifier not known to the layout.
    #[error("unknown identifier `{ident}` in process {process}")]
    UnknownIdentifier {
        /// Identifier as written.
        ident: String,
        /// Owning process instance.
        process: String,
    },

    /// Identifier resolved to the wrong kind of object.
    #[error("`{ident}` in process {process} is not {expected}")]
    WrongKind {
        ident: String,
        process: String,
        /// Description of what was required.
        expected: &'static str,
    },

    /// Array dereference outside the declared ranges.
    #[error(
        "array index out of bounds: {ident}{} in process {process}",
        fmt_indices(.indices)
    )]
    IndexOutOfBounds {
        /// Fully-qualified identifier.
        ident: String,
        /// Evaluated index vector.
        indices: IndexVec,
        /// Owning process instance.
        process: String,
    },

    /// Raw state offset outside the store.
    #[error("{kind} state offset {offset} out of range")]
    StateOffset {
        kind: &'static str,
        offset: usize,
    },

    /// Body needs more concurrent slots than a process instance supports.
    #[error("process {process} needs {required} concurrent threads (limit {limit})")]
    TooManyThreads {
        process: String,
        required: usize,
        limit: usize,
    },

    /// Inconsistent registration found on a channel.
    #[error("channel protocol violation on {channel} in process {process}: {detail}")]
    ProtocolViolation {
        channel: String,
        process: String,
        detail: String,
    },

    /// Two processes tried to probe-wait on the same channel side.
    #[error("channel {channel} is being probed by multiple processes")]
    MultipleProbers { channel: String },

    /// `send`/`receive` inside a function body.
    #[error("function {function}: functions cannot use send/receive")]
    CommunicationInFunction { function: String },

    /// Replicated guard inside a function body.
    #[error("function {function}: no replication permitted in functions")]
    ReplicationInFunction { function: String },

    /// Selection inside a function with every guard false.
    #[error("function {function}: all guards false in selection")]
    AllGuardsFalse { function: String },

    /// Call with the wrong number of arguments.
    #[error("function {function}: expected {expected} arguments, got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    /// External function whose symbol is not registered.
    #[error("function {function}: could not resolve external symbol `{symbol}`")]
    UnresolvedExtern { function: String, symbol: String },

    /// External functions may only return scalars.
    #[error("function {function}: external functions cannot return structures")]
    ExternStructReturn { function: String },
}

/// Result alias used throughout the interpreter.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_out_of_bounds_display() {
        let e = SimError::IndexOutOfBounds {
            ident: "top.buf".to_string(),
            indices: smallvec![2, 9],
            process: "top".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "array index out of bounds: top.buf[2][9] in process top"
        );
    }

    #[test]
    fn test_error_display() {
        let e = SimError::TooManyThreads {
            process: "p".to_string(),
            required: 40,
            limit: 32,
        };
        assert_eq!(e.to_string(), "process p needs 40 concurrent threads (limit 32)");

        let e = SimError::CommunicationInFunction {
            function: "f".to_string(),
        };
        assert!(e.to_string().contains("cannot use send/receive"));
    }

    #[test]
    fn test_event_constructors() {
        let p = ProcessId(3);
        assert_eq!(Event::step(p, 1).slot, SlotRef::Slot(1));
        assert!(!Event::step(p, 1).wakeup);
        assert!(Event::wake(p, 2).wakeup);
        assert_eq!(Event::unstall(p).slot, SlotRef::Stalled);
        assert_eq!(SlotRef::Slot(4).to_string(), "t#04");
    }
}
