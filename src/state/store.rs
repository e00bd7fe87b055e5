//! Flat global state shared by every process instance.
//!
//! Booleans, integers and channel descriptors each live in their own vector
//! and are addressed through typed offsets, so a boolean offset can never be
//! used to read an integer by accident. Every access is bounds-checked.

use std::fmt;

use super::channel::{ChannelState, ProbeWait, ProbeWaitId};
use crate::interpreter::traits::{SimError, SimResult};

/// Identifier of a registered process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub usize);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

macro_rules! offset_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl $name {
            /// Offset `n` entries further on.
            pub fn at(self, n: usize) -> Self {
                Self(self.0 + n)
            }
        }
    };
}

offset_type!(
    /// Offset into the boolean vector.
    BoolOffset
);
offset_type!(
    /// Offset into the integer vector.
    IntOffset
);
offset_type!(
    /// Offset into the channel descriptor vector.
    ChanOffset
);

/// Three-valued boolean state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Logic {
    Zero,
    One,
    /// Undefined.
    #[default]
    X,
}

impl Logic {
    pub fn from_bit(v: u64) -> Self {
        if v & 1 == 1 {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Numeric value, or `None` for X.
    pub fn bit(self) -> Option<u64> {
        match self {
            Logic::Zero => Some(0),
            Logic::One => Some(1),
            Logic::X => None,
        }
    }
}

/// The global state store.
#[derive(Debug, Default)]
pub struct StateStore {
    bools: Vec<Logic>,
    ints: Vec<u64>,
    chans: Vec<ChannelState>,
    bool_fanout: Vec<Vec<ProcessId>>,
    int_fanout: Vec<Vec<ProcessId>>,
    probe_waits: Vec<Option<ProbeWait>>,
    stalled: Vec<ProcessId>,
    processes: Vec<String>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Processes ---

    /// Register a process instance name and hand out its id.
    pub fn register_process(&mut self, name: &str) -> ProcessId {
        self.processes.push(name.to_string());
        ProcessId(self.processes.len() - 1)
    }

    /// Instance name of a process, `?` for unknown ids.
    pub fn process_name(&self, pid: ProcessId) -> &str {
        self.processes.get(pid.0).map(String::as_str).unwrap_or("?")
    }

    pub fn process_count(&self) -> usize {
        self.processes.len()
    }

    // --- Allocation ---

    /// Allocate `n` booleans, initially undefined.
    pub fn alloc_bools(&mut self, n: usize) -> BoolOffset {
        let base = self.bools.len();
        self.bools.resize(base + n, Logic::X);
        self.bool_fanout.resize_with(base + n, Vec::new);
        BoolOffset(base)
    }

    /// Allocate `n` integers, initially zero.
    pub fn alloc_ints(&mut self, n: usize) -> IntOffset {
        let base = self.ints.len();
        self.ints.resize(base + n, 0);
        self.int_fanout.resize_with(base + n, Vec::new);
        IntOffset(base)
    }

    /// Allocate one channel descriptor.
    pub fn alloc_chan(&mut self, chan: ChannelState) -> ChanOffset {
        self.chans.push(chan);
        ChanOffset(self.chans.len() - 1)
    }

    pub fn bool_count(&self) -> usize {
        self.bools.len()
    }

    pub fn int_count(&self) -> usize {
        self.ints.len()
    }

    pub fn chan_count(&self) -> usize {
        self.chans.len()
    }

    // --- Scalar access ---

    pub fn get_bool(&self, off: BoolOffset) -> SimResult<Logic> {
        self.bools
            .get(off.0)
            .copied()
            .ok_or(SimError::StateOffset { kind: "bool", offset: off.0 })
    }

    pub fn set_bool(&mut self, off: BoolOffset, v: Logic) -> SimResult<()> {
        let slot = self
            .bools
            .get_mut(off.0)
            .ok_or(SimError::StateOffset { kind: "bool", offset: off.0 })?;
        *slot = v;
        Ok(())
    }

    pub fn get_int(&self, off: IntOffset) -> SimResult<u64> {
        self.ints
            .get(off.0)
            .copied()
            .ok_or(SimError::StateOffset { kind: "int", offset: off.0 })
    }

    pub fn set_int(&mut self, off: IntOffset, v: u64) -> SimResult<()> {
        let slot = self
            .ints
            .get_mut(off.0)
            .ok_or(SimError::StateOffset { kind: "int", offset: off.0 })?;
        *slot = v;
        Ok(())
    }

    // --- Channels ---

    pub fn chan(&self, off: ChanOffset) -> SimResult<&ChannelState> {
        self.chans
            .get(off.0)
            .ok_or(SimError::StateOffset { kind: "chan", offset: off.0 })
    }

    pub fn chan_mut(&mut self, off: ChanOffset) -> SimResult<&mut ChannelState> {
        self.chans
            .get_mut(off.0)
            .ok_or(SimError::StateOffset { kind: "chan", offset: off.0 })
    }

    // --- Fan-out ---

    /// Register `pid` as a listener on a boolean. Duplicates are ignored.
    pub fn add_bool_fanout(&mut self, off: BoolOffset, pid: ProcessId) -> SimResult<()> {
        let list = self
            .bool_fanout
            .get_mut(off.0)
            .ok_or(SimError::StateOffset { kind: "bool", offset: off.0 })?;
        if !list.contains(&pid) {
            list.push(pid);
        }
        Ok(())
    }

    /// Register `pid` as a listener on an integer. Duplicates are ignored.
    pub fn add_int_fanout(&mut self, off: IntOffset, pid: ProcessId) -> SimResult<()> {
        let list = self
            .int_fanout
            .get_mut(off.0)
            .ok_or(SimError::StateOffset { kind: "int", offset: off.0 })?;
        if !list.contains(&pid) {
            list.push(pid);
        }
        Ok(())
    }

    /// Listeners of a boolean, in registration order.
    pub fn bool_fanout(&self, off: BoolOffset) -> &[ProcessId] {
        self.bool_fanout.get(off.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Listeners of an integer, in registration order.
    pub fn int_fanout(&self, off: IntOffset) -> &[ProcessId] {
        self.int_fanout.get(off.0).map(Vec::as_slice).unwrap_or(&[])
    }

    // --- Stall registry ---

    /// Record that `pid` waits for a shared-variable change.
    pub fn stall(&mut self, pid: ProcessId) {
        if !self.stalled.contains(&pid) {
            self.stalled.push(pid);
        }
    }

    /// Drop a stall registration. Returns whether one existed.
    pub fn unstall(&mut self, pid: ProcessId) -> bool {
        match self.stalled.iter().position(|p| *p == pid) {
            Some(i) => {
                self.stalled.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_stalled(&self, pid: ProcessId) -> bool {
        self.stalled.contains(&pid)
    }

    // --- Probe waits ---

    /// Create an armed probe-wait object owned by `owner`.
    pub fn alloc_probe_wait(&mut self, owner: ProcessId) -> ProbeWaitId {
        let wait = ProbeWait { owner, armed: true };
        if let Some(i) = self.probe_waits.iter().position(Option::is_none) {
            self.probe_waits[i] = Some(wait);
            ProbeWaitId(i)
        } else {
            self.probe_waits.push(Some(wait));
            ProbeWaitId(self.probe_waits.len() - 1)
        }
    }

    pub fn probe_wait_mut(&mut self, id: ProbeWaitId) -> Option<&mut ProbeWait> {
        self.probe_waits.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn free_probe_wait(&mut self, id: ProbeWaitId) {
        if let Some(slot) = self.probe_waits.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Number of live probe-wait objects.
    pub fn live_probe_waits(&self) -> usize {
        self.probe_waits.iter().filter(|w| w.is_some()).count()
    }

    /// Drop every registration held by `pid`: parked channel sides, probe
    /// waits it owns and its stall entry.
    pub fn release(&mut self, pid: ProcessId) {
        let owned: Vec<ProbeWaitId> = self
            .probe_waits
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_some_and(|w| w.owner == pid))
            .map(|(i, _)| ProbeWaitId(i))
            .collect();
        for c in &mut self.chans {
            if c.send_here.is_some_and(|w| w.process == pid) {
                c.send_here = None;
                c.sender_probe = false;
            }
            if c.recv_here.is_some_and(|w| w.process == pid) {
                c.recv_here = None;
                c.receiver_probe = false;
            }
            if c.probe.is_some_and(|id| owned.contains(&id)) {
                c.probe = None;
            }
        }
        for id in owned {
            self.free_probe_wait(id);
        }
        self.unstall(pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_access() {
        let mut store = StateStore::new();
        let b = store.alloc_bools(2);
        let i = store.alloc_ints(3);

        assert_eq!(store.get_bool(b).unwrap(), Logic::X);
        store.set_bool(b.at(1), Logic::One).unwrap();
        assert_eq!(store.get_bool(b.at(1)).unwrap(), Logic::One);

        store.set_int(i.at(2), 42).unwrap();
        assert_eq!(store.get_int(i.at(2)).unwrap(), 42);
        assert_eq!(store.get_int(i).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_offset() {
        let mut store = StateStore::new();
        store.alloc_ints(1);
        assert!(matches!(
            store.get_int(IntOffset(5)),
            Err(SimError::StateOffset { kind: "int", offset: 5 })
        ));
        assert!(store.set_bool(BoolOffset(0), Logic::One).is_err());
    }

    #[test]
    fn test_fanout_registration_order() {
        let mut store = StateStore::new();
        let b = store.alloc_bools(1);
        let p = store.register_process("p");
        let q = store.register_process("q");

        store.add_bool_fanout(b, q).unwrap();
        store.add_bool_fanout(b, p).unwrap();
        store.add_bool_fanout(b, q).unwrap();
        assert_eq!(store.bool_fanout(b), &[q, p]);
        assert_eq!(store.process_name(p), "p");
    }

    #[test]
    fn test_stall_registry() {
        let mut store = StateStore::new();
        let p = store.register_process("p");
        store.stall(p);
        store.stall(p);
        assert!(store.is_stalled(p));
        assert!(store.unstall(p));
        assert!(!store.unstall(p));
    }

    #[test]
    fn test_probe_wait_reuse() {
        let mut store = StateStore::new();
        let p = store.register_process("p");
        let a = store.alloc_probe_wait(p);
        let b = store.alloc_probe_wait(p);
        assert_ne!(a, b);
        store.free_probe_wait(a);
        assert_eq!(store.live_probe_waits(), 1);
        assert_eq!(store.alloc_probe_wait(p), a);
    }

    #[test]
    fn test_release_clears_registrations() {
        use crate::state::Waiter;

        let mut store = StateStore::new();
        let p = store.register_process("p");
        let q = store.register_process("q");
        let c = store.alloc_chan(ChannelState::new("c", 1));
        let id = store.alloc_probe_wait(p);
        {
            let ch = store.chan_mut(c).unwrap();
            ch.recv_here = Some(Waiter { process: p, slot: 0 });
            ch.receiver_probe = true;
            ch.probe = Some(id);
            ch.send_here = Some(Waiter { process: q, slot: 1 });
        }
        store.stall(p);

        store.release(p);
        let ch = store.chan(c).unwrap();
        assert!(ch.recv_here.is_none());
        assert!(ch.probe.is_none());
        assert!(ch.waiting_sender());
        assert_eq!(store.live_probe_waits(), 0);
        assert!(!store.is_stalled(p));
    }
}
