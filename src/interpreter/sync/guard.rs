//! Wait registration for blocked selections.
//!
//! A selection whose guards are all false cannot make progress until
//! something its guards read changes. Two kinds of dependency can be waited
//! on:
//!
//! - channel probes: the blocked slot parks on the probed side as a probe
//!   waiter, sharing one [`ProbeWait`](crate::state::ProbeWait) object across
//!   every channel it probes so the first one to become ready wakes it exactly
//!   once. Each blocked slot holds its own object.
//! - shared variables: the process joins the global stall registry and is
//!   woken by the next boolean write
//!
//! Registration happens when the selection blocks; the matching undo runs
//! when the process is woken, before the guards are evaluated again.

use crate::interpreter::compile::{ChanRef, ChpExpr};
use crate::interpreter::traits::{SimError, SimResult};
use crate::state::{ChanDir, ProbeWaitId, StateStore, Waiter};

/// What a set of guards can be woken by.
#[derive(Debug, Clone, Default)]
pub struct WaitSet {
    /// Distinct probed channels, in first-occurrence order.
    pub probes: Vec<ChanRef>,
    /// Some guard reads shared state.
    pub shared: bool,
}

impl WaitSet {
    /// Scan guard expressions for probes and shared-state reads.
    pub fn collect<'e>(guards: impl IntoIterator<Item = &'e ChpExpr>) -> Self {
        let mut ws = WaitSet::default();
        for g in guards {
            g.walk(&mut |e| match e {
                ChpExpr::Probe(c) => {
                    if !ws.probes.iter().any(|p| p.offset == c.offset) {
                        ws.probes.push(c.clone());
                    }
                }
                ChpExpr::Var(v) | ChpExpr::Bitfield { var: v, .. } => ws.shared |= v.shared,
                ChpExpr::Struct(s) => ws.shared |= s.shared,
                _ => {}
            });
        }
        ws
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty() && !self.shared
    }
}

/// Park `me` as a probe waiter on every probed channel that is not already
/// ready. The probe-wait object is created on first use and kept in `held`,
/// which belongs to the blocked slot.
///
/// Returns whether any registration was made.
pub fn register_probes(
    store: &mut StateStore,
    ws: &WaitSet,
    me: Waiter,
    held: &mut Option<ProbeWaitId>,
) -> SimResult<bool> {
    let mut registered = false;
    for c in &ws.probes {
        let ready = {
            let ch = store.chan(c.offset)?;
            match c.dir {
                ChanDir::Input => ch.waiting_sender(),
                ChanDir::Output => ch.waiting_receiver(),
            }
        };
        if ready {
            continue;
        }

        let id = match *held {
            Some(id) => id,
            None => {
                let id = store.alloc_probe_wait(me.process);
                *held = Some(id);
                id
            }
        };
        let process = store.process_name(me.process).to_string();
        let ch = store.chan_mut(c.offset)?;
        if ch.probe.is_some_and(|other| other != id) {
            return Err(SimError::MultipleProbers {
                channel: ch.name.clone(),
            });
        }
        let (here, probe) = match c.dir {
            ChanDir::Input => (&mut ch.recv_here, &mut ch.receiver_probe),
            ChanDir::Output => (&mut ch.send_here, &mut ch.sender_probe),
        };
        if here.is_some() && !*probe {
            return Err(SimError::ProtocolViolation {
                channel: ch.name.clone(),
                process,
                detail: "probe registered on a side with a committed waiter".to_string(),
            });
        }
        *here = Some(me);
        *probe = true;
        ch.probe = Some(id);
        registered = true;
        log::trace!("{}: probe wait on {} at slot {}", process, ch.name, me.slot);
    }
    Ok(registered)
}

/// Remove the probe registrations made by [`register_probes`] and release
/// the probe-wait object.
pub fn undo_probes(
    store: &mut StateStore,
    ws: &WaitSet,
    me: Waiter,
    held: &mut Option<ProbeWaitId>,
) -> SimResult<()> {
    let Some(id) = held.take() else {
        return Ok(());
    };
    for c in &ws.probes {
        let ch = store.chan_mut(c.offset)?;
        let (here, probe) = match c.dir {
            ChanDir::Input => (&mut ch.recv_here, &mut ch.receiver_probe),
            ChanDir::Output => (&mut ch.send_here, &mut ch.sender_probe),
        };
        if *probe && *here == Some(me) {
            *here = None;
            *probe = false;
        }
        if ch.probe == Some(id) {
            ch.probe = None;
        }
    }
    store.free_probe_wait(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::Scalar;
    use crate::lang::{BinOp, DataType};
    use crate::state::{ChanOffset, ChannelState, ProcessId, ScalarSlot};

    fn chan_ref(name: &str, offset: ChanOffset, dir: ChanDir) -> ChanRef {
        ChanRef {
            name: name.to_string(),
            offset,
            dir,
            data: DataType::Int(8),
        }
    }

    fn setup() -> (StateStore, ChanOffset, ChanOffset, ProcessId) {
        let mut store = StateStore::new();
        let q = store.register_process("top.q");
        store.register_process("top.r");
        let a = store.alloc_chan(ChannelState::new("top.a", 8));
        let b = store.alloc_chan(ChannelState::new("top.b", 8));
        (store, a, b, q)
    }

    #[test]
    fn test_collect() {
        let (mut store, a, _, _) = setup();
        let flag = store.alloc_bools(1);
        let shared = ChpExpr::Var(crate::interpreter::compile::VarRef {
            name: "top.go".to_string(),
            slot: ScalarSlot::Bool(flag),
            index: None,
            shared: true,
        });
        let probe = ChpExpr::Probe(chan_ref("top.a", a, ChanDir::Input));
        let g1 = ChpExpr::Binary(BinOp::And, Box::new(probe.clone()), Box::new(shared));
        let g2 = probe;
        let ws = WaitSet::collect([&g1, &g2]);
        assert_eq!(ws.probes.len(), 1);
        assert!(ws.shared);

        let ws = WaitSet::collect([&ChpExpr::Const(Scalar::bit(false))]);
        assert!(ws.is_empty());
    }

    #[test]
    fn test_register_and_undo_restores_channels() {
        let (mut store, a, b, q) = setup();
        let ws = WaitSet {
            probes: vec![
                chan_ref("top.a", a, ChanDir::Input),
                chan_ref("top.b", b, ChanDir::Output),
            ],
            shared: false,
        };
        let me = Waiter { process: q, slot: 1 };
        let mut held = None;

        assert!(register_probes(&mut store, &ws, me, &mut held).unwrap());
        assert!(store.chan(a).unwrap().waiting_recv_probe());
        assert!(store.chan(b).unwrap().waiting_send_probe());
        assert_eq!(store.live_probe_waits(), 1);
        assert_eq!(store.chan(a).unwrap().probe, held);

        undo_probes(&mut store, &ws, me, &mut held).unwrap();
        assert!(store.chan(a).unwrap().is_idle());
        assert!(store.chan(b).unwrap().is_idle());
        assert_eq!(store.live_probe_waits(), 0);
        assert!(held.is_none());
    }

    #[test]
    fn test_slots_hold_separate_waits() {
        let (mut store, a, b, q) = setup();
        let on_a = WaitSet {
            probes: vec![chan_ref("top.a", a, ChanDir::Input)],
            shared: false,
        };
        let on_b = WaitSet {
            probes: vec![chan_ref("top.b", b, ChanDir::Input)],
            shared: false,
        };
        let first = Waiter { process: q, slot: 0 };
        let second = Waiter { process: q, slot: 1 };
        let (mut held0, mut held1) = (None, None);
        register_probes(&mut store, &on_a, first, &mut held0).unwrap();
        register_probes(&mut store, &on_b, second, &mut held1).unwrap();
        assert_ne!(held0, held1);
        assert_eq!(store.live_probe_waits(), 2);

        undo_probes(&mut store, &on_a, first, &mut held0).unwrap();
        assert!(store.chan(a).unwrap().is_idle());
        assert_eq!(store.chan(b).unwrap().probe, held1);
        assert_eq!(store.chan(b).unwrap().recv_here, Some(second));
        assert_eq!(store.live_probe_waits(), 1);
    }

    #[test]
    fn test_ready_channel_not_registered() {
        let (mut store, a, _, q) = setup();
        let r = ProcessId(1);
        store.chan_mut(a).unwrap().send_here = Some(Waiter { process: r, slot: 0 });
        let ws = WaitSet {
            probes: vec![chan_ref("top.a", a, ChanDir::Input)],
            shared: false,
        };
        let mut held = None;
        assert!(!register_probes(&mut store, &ws, Waiter { process: q, slot: 0 }, &mut held).unwrap());
        assert!(held.is_none());
        assert!(store.chan(a).unwrap().recv_here.is_none());
    }

    #[test]
    fn test_multiple_probers() {
        let (mut store, a, _, q) = setup();
        let r = ProcessId(1);
        let ws = WaitSet {
            probes: vec![chan_ref("top.a", a, ChanDir::Input)],
            shared: false,
        };
        let mut held_q = None;
        register_probes(&mut store, &ws, Waiter { process: q, slot: 0 }, &mut held_q).unwrap();

        let mut held_r = None;
        let err = register_probes(&mut store, &ws, Waiter { process: r, slot: 0 }, &mut held_r);
        assert_eq!(
            err.unwrap_err(),
            SimError::MultipleProbers {
                channel: "top.a".to_string()
            }
        );
    }

    #[test]
    fn test_probe_on_committed_side() {
        let (mut store, a, _, q) = setup();
        let r = ProcessId(1);
        store.chan_mut(a).unwrap().recv_here = Some(Waiter { process: r, slot: 0 });
        let ws = WaitSet {
            probes: vec![chan_ref("top.a", a, ChanDir::Input)],
            shared: false,
        };
        let mut held = None;
        let err = register_probes(&mut store, &ws, Waiter { process: q, slot: 0 }, &mut held);
        assert!(matches!(err, Err(SimError::ProtocolViolation { .. })));
    }
}
