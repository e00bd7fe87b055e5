//! Two-sided channel rendezvous.
//!
//! Each channel side is either idle or holds one parked process. A parked
//! process is either committed (a blocked send/receive) or only probing (a
//! selection waiting for the channel to become ready). The first side to
//! arrive parks; the second completes the transfer in the same step and
//! wakes the first.
//!
//! | Arrival | Opposite side | Result |
//! |---------|---------------|--------|
//! | send | receiver parked | value handed over, receiver woken |
//! | send | receiver probing | probe woken, sender parks |
//! | send | idle | sender parks with the value stashed |
//! | recv | sender parked | value taken, sender woken |
//! | recv | sender probing | probe woken, receiver parks |
//! | recv | idle | receiver parks |

use crate::interpreter::diagnostics::{Diagnostics, Warning};
use crate::interpreter::traits::{Event, Scheduler, SimResult};
use crate::interpreter::value::Value;
use crate::state::{ChanOffset, ProbeWaitId, StateStore, Waiter};

/// Result of a channel action.
#[derive(Debug, Clone, PartialEq)]
pub enum Transfer<T> {
    /// The action completed in this step.
    Done(T),
    /// The process is parked on the channel.
    Blocked,
}

impl<T> Transfer<T> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Transfer::Blocked)
    }
}

/// Drives the rendezvous protocol for one process step.
pub struct Rendezvous<'a> {
    pub store: &'a mut StateStore,
    pub sched: &'a mut dyn Scheduler,
    pub diag: &'a mut Diagnostics,
}

impl<'a> Rendezvous<'a> {
    pub fn new(store: &'a mut StateStore, sched: &'a mut dyn Scheduler, diag: &'a mut Diagnostics) -> Self {
        Self { store, sched, diag }
    }

    /// Offer `value` on `chan` as `me`.
    pub fn send(&mut self, chan: ChanOffset, me: Waiter, value: Value) -> SimResult<Transfer<()>> {
        self.check_fragmented(chan)?;
        let c = self.store.chan_mut(chan)?;

        if c.waiting_receiver() {
            let clash = c.send_here.take();
            c.sender_probe = false;
            c.data = value;
            let peer = c.recv_here.take();
            let name = c.name.clone();
            if let Some(prev) = clash {
                self.concurrent(name, prev, me);
            }
            if let Some(peer) = peer {
                log::trace!("send {}: receiver {} waiting", chan.0, peer.process);
                self.notify(peer);
            }
            return Ok(Transfer::Done(()));
        }

        if c.waiting_recv_probe() {
            let peer = c.recv_here.take();
            c.receiver_probe = false;
            let probe = c.probe;
            if let (Some(peer), Some(id)) = (peer, probe) {
                notify_probe(self.store, self.sched, id, peer.slot);
            }
        }

        let c = self.store.chan_mut(chan)?;
        c.data2 = value;
        let clash = c.send_here.replace(me);
        c.sender_probe = false;
        let name = c.name.clone();
        if let Some(prev) = clash {
            self.concurrent(name, prev, me);
        }
        log::trace!("send {}: {} parks at slot {}", chan.0, me.process, me.slot);
        Ok(Transfer::Blocked)
    }

    /// Finish a send that was parked. The receiver already took the value.
    pub fn send_resume(&mut self, chan: ChanOffset, me: Waiter) -> SimResult<()> {
        let c = self.store.chan_mut(chan)?;
        if c.send_here.is_some_and(|w| w.process == me.process) {
            c.send_here = None;
            c.sender_probe = false;
        }
        Ok(())
    }

    /// Take a value from `chan` as `me`.
    pub fn recv(&mut self, chan: ChanOffset, me: Waiter) -> SimResult<Transfer<Value>> {
        self.check_fragmented(chan)?;
        let c = self.store.chan_mut(chan)?;

        if c.waiting_sender() {
            let v = std::mem::take(&mut c.data2);
            let peer = c.send_here.take();
            if let Some(peer) = peer {
                log::trace!("recv {}: sender {} waiting", chan.0, peer.process);
                self.notify(peer);
            }
            return Ok(Transfer::Done(v));
        }

        if c.waiting_send_probe() {
            let peer = c.send_here.take();
            c.sender_probe = false;
            let probe = c.probe;
            if let (Some(peer), Some(id)) = (peer, probe) {
                notify_probe(self.store, self.sched, id, peer.slot);
            }
        }

        let c = self.store.chan_mut(chan)?;
        let clash = c.recv_here.replace(me);
        c.receiver_probe = false;
        let name = c.name.clone();
        if let Some(prev) = clash {
            self.concurrent(name, prev, me);
        }
        log::trace!("recv {}: {} parks at slot {}", chan.0, me.process, me.slot);
        Ok(Transfer::Blocked)
    }

    /// Finish a receive that was parked, returning the value the sender
    /// handed over.
    pub fn recv_resume(&mut self, chan: ChanOffset, me: Waiter) -> SimResult<Value> {
        let c = self.store.chan_mut(chan)?;
        let v = std::mem::take(&mut c.data);
        let stale = c.recv_here.filter(|_| !c.receiver_probe);
        let name = c.name.clone();
        if let Some(prev) = stale {
            self.concurrent(name, prev, me);
        }
        Ok(v)
    }

    fn notify(&mut self, w: Waiter) {
        self.sched.schedule(Event::wake(w.process, w.slot), 0);
    }

    fn concurrent(&mut self, channel: String, first: Waiter, second: Waiter) {
        let first = self.store.process_name(first.process).to_string();
        let second = self.store.process_name(second.process).to_string();
        self.diag.warn(Warning::ConcurrentAccess {
            channel,
            first,
            second,
        });
    }

    fn check_fragmented(&mut self, chan: ChanOffset) -> SimResult<()> {
        let c = self.store.chan(chan)?;
        if c.fragmented {
            let channel = c.name.clone();
            self.diag.warn(Warning::FragmentedChannel { channel });
        }
        Ok(())
    }
}

/// Wake the owner of probe wait `id` at `slot`, once.
pub fn notify_probe(store: &mut StateStore, sched: &mut dyn Scheduler, id: ProbeWaitId, slot: usize) {
    if let Some(pw) = store.probe_wait_mut(id) {
        if pw.armed {
            pw.armed = false;
            sched.schedule(Event::wake(pw.owner, slot), 0);
        }
    }
}
