//! Channel descriptors.
//!
//! A descriptor records, per side, whether a process is waiting there and
//! whether that wait is a real (committing) one or only a probe. The
//! rendezvous logic that drives these fields lives in
//! `interpreter::sync::channel`.

use super::store::ProcessId;
use crate::interpreter::value::Value;

/// Identifier of a probe-wait object in the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeWaitId(pub usize);

/// Shared wake-up object for a process whose selection is blocked on probes.
///
/// One object may be attached to several channels; the first of them to
/// become ready disarms it, so the owner is woken exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeWait {
    pub owner: ProcessId,
    pub armed: bool,
}

/// A process parked on one side of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub process: ProcessId,
    /// Slot to resume.
    pub slot: usize,
}

/// Direction in which a process uses a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Input,
    Output,
}

/// Shared channel state.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    /// Fully-qualified name, for diagnostics.
    pub name: String,
    /// Payload width (0 for dataless channels).
    pub width: u32,
    /// Sender parked here, if any.
    pub send_here: Option<Waiter>,
    /// The parked sender is only probing.
    pub sender_probe: bool,
    /// Receiver parked here, if any.
    pub recv_here: Option<Waiter>,
    /// The parked receiver is only probing.
    pub receiver_probe: bool,
    /// Value handed to a receiver that was already waiting.
    pub data: Value,
    /// Value stashed by a waiting sender.
    pub data2: Value,
    /// Probe-wait object attached to this channel.
    pub probe: Option<ProbeWaitId>,
    /// Transfer spans several physical channels.
    pub fragmented: bool,
}

impl ChannelState {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            ..Default::default()
        }
    }

    /// A sender is parked and committed to the transfer.
    pub fn waiting_sender(&self) -> bool {
        self.send_here.is_some() && !self.sender_probe
    }

    /// A sender is parked on a probe.
    pub fn waiting_send_probe(&self) -> bool {
        self.send_here.is_some() && self.sender_probe
    }

    /// A receiver is parked and committed to the transfer.
    pub fn waiting_receiver(&self) -> bool {
        self.recv_here.is_some() && !self.receiver_probe
    }

    /// A receiver is parked on a probe.
    pub fn waiting_recv_probe(&self) -> bool {
        self.recv_here.is_some() && self.receiver_probe
    }

    /// Neither side is registered.
    pub fn is_idle(&self) -> bool {
        self.send_here.is_none() && self.recv_here.is_none() && self.probe.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiting_states() {
        let mut c = ChannelState::new("c", 8);
        assert!(c.is_idle());

        c.send_here = Some(Waiter {
            process: ProcessId(0),
            slot: 0,
        });
        assert!(c.waiting_sender());
        assert!(!c.waiting_send_probe());

        c.sender_probe = true;
        assert!(!c.waiting_sender());
        assert!(c.waiting_send_probe());
        assert!(!c.waiting_receiver());
        assert!(!c.is_idle());
    }
}
