//! Simulated replication of the operator variables and busy broadcasts.
//!
//! Writes land in the writer's replica at once and are queued. Delivering
//! the queue applies each write, in send order, to every replica and then
//! notifies every participant, so replicas always converge on the last
//! write even when two participants raced.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bookshelf::{ParticipantId, ReplicatedVars, SharedVar, NO_HOLDER};
use tracing::trace;

use crate::lock;

/// One message in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Broadcast {
    Var { var: SharedVar, value: i32 },
    Busy { from: ParticipantId, busy: bool },
}

#[derive(Default)]
pub struct Network {
    queue: Mutex<VecDeque<Broadcast>>,
    replicas: Mutex<Vec<Arc<ReplicaVars>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A replica for a new participant, seeded from the first existing one.
    pub fn join(self: &Arc<Self>) -> Arc<ReplicaVars> {
        let mut replicas = lock(&self.replicas);
        let values = replicas
            .first()
            .map(|first| *lock(&first.values))
            .unwrap_or([0, NO_HOLDER]);
        let replica = Arc::new(ReplicaVars {
            values: Mutex::new(values),
            net: Arc::clone(self),
        });
        replicas.push(replica.clone());
        replica
    }

    pub fn send(&self, broadcast: Broadcast) {
        trace!(?broadcast, "queued");
        lock(&self.queue).push_back(broadcast);
    }

    /// Pop the oldest message, applying it to every replica if it is a write.
    pub fn deliver_next(&self) -> Option<Broadcast> {
        let broadcast = lock(&self.queue).pop_front()?;
        if let Broadcast::Var { var, value } = broadcast {
            for replica in lock(&self.replicas).iter() {
                lock(&replica.values)[slot(var)] = value;
            }
        }
        Some(broadcast)
    }

    pub fn is_idle(&self) -> bool {
        lock(&self.queue).is_empty()
    }
}

fn slot(var: SharedVar) -> usize {
    match var {
        SharedVar::Operated => 0,
        SharedVar::HolderId => 1,
    }
}

/// One participant's copy of the replicated variables.
pub struct ReplicaVars {
    values: Mutex<[i32; 2]>,
    net: Arc<Network>,
}

impl ReplicatedVars for ReplicaVars {
    fn get(&self, var: SharedVar) -> i32 {
        lock(&self.values)[slot(var)]
    }

    fn set(&self, var: SharedVar, value: i32) {
        lock(&self.values)[slot(var)] = value;
        self.net.send(Broadcast::Var { var, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn racing_writes_converge_on_last_sender() {
        let net = Network::new();
        let a = net.join();
        let b = net.join();

        a.set(SharedVar::HolderId, 1);
        b.set(SharedVar::HolderId, 2);
        assert_eq!(a.get(SharedVar::HolderId), 1);
        assert_eq!(b.get(SharedVar::HolderId), 2);

        while net.deliver_next().is_some() {}
        assert_eq!(a.get(SharedVar::HolderId), 2);
        assert_eq!(b.get(SharedVar::HolderId), 2);
    }

    #[test]
    fn late_joiner_sees_current_values() {
        let net = Network::new();
        let a = net.join();
        a.set(SharedVar::Operated, 1);
        while net.deliver_next().is_some() {}

        let b = net.join();
        assert_eq!(b.get(SharedVar::Operated), 1);
        assert_eq!(b.get(SharedVar::HolderId), NO_HOLDER);
    }
}
