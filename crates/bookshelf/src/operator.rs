//! Single-operator arbitration.
//!
//! The operator token lives in two replicated integers: `operated` (0 or 1)
//! and `holder_id`. Those integers are the source of truth. The [`Arbiter`]
//! only caches a projection of them and rebuilds it on every change
//! notification, so a missed broadcast is healed by the next one.
//!
//! ```text
//! participant A                 replicated vars                participant B
//!     │ try_claim ── set(1, A) ──────►│                              │
//!     │                               ├── changed ─► observe ──► holder = A
//!     │◄── changed ── observe ◄───────┤                              │
//!     │ is_operator() == true         │                    is_operator() == false
//! ```
//!
//! A solo participant skips the contention checks entirely. That shortcut
//! races with a participant joining between the check and the write; the
//! next broadcast decides the holder in that case.
//!
//! Writes are delivered in order, so a holder value seen before the local
//! claim has echoed back is older than that claim and will be overwritten by
//! it. Only the local participant ever writes its own id, which makes the
//! echo count exact: the token is [settled](Arbiter::settled) once every
//! local claim has come back through a holder notification.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Participant identity as carried on the wire. Only positive ids are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(i32);

impl ParticipantId {
    /// `None` for the non-positive ids that mean "nobody".
    pub fn new(id: i32) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn as_wire(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two replicated variables that carry the operator token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SharedVar {
    Operated,
    HolderId,
}

impl SharedVar {
    pub const ALL: [SharedVar; 2] = [SharedVar::Operated, SharedVar::HolderId];

    pub fn name(self) -> &'static str {
        match self {
            SharedVar::Operated => "ShelfABoolOperated",
            SharedVar::HolderId => "ShelfAUserID",
        }
    }
}

/// Value written to `holder_id` when nobody holds the token.
pub const NO_HOLDER: i32 = -1;

/// Broadcast integer variables shared by every participant of one shelf.
///
/// `set` updates the local replica immediately and broadcasts; every
/// participant, the writer included, later receives a
/// [`ShelfEvent::ReplicatedChanged`](crate::event::ShelfEvent::ReplicatedChanged).
pub trait ReplicatedVars: Send + Sync {
    fn get(&self, var: SharedVar) -> i32;
    fn set(&self, var: SharedVar, value: i32);
}

/// What a change notification did to the cached holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChange {
    Held(ParticipantId),
    Released,
}

/// Local projection of the operator token.
#[derive(Debug, Clone)]
pub struct Arbiter {
    local: ParticipantId,
    holder: Option<ParticipantId>,
    operator: bool,
    claims_in_flight: u32,
}

impl Arbiter {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            holder: None,
            operator: false,
            claims_in_flight: 0,
        }
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.holder
    }

    /// True when the cached holder is the local participant.
    pub fn is_operator(&self) -> bool {
        self.operator
    }

    /// Try to take the token for `participant`.
    ///
    /// With other participants present this fails when the cached holder is
    /// someone else, or when the replicated vars already name a holder. A
    /// solo participant always succeeds.
    pub fn try_claim(
        &mut self,
        participant: ParticipantId,
        vars: &dyn ReplicatedVars,
        others_present: bool,
    ) -> bool {
        if others_present {
            if let Some(holder) = self.holder {
                if holder != participant {
                    debug!(%holder, %participant, "claim refused, shelf is operated");
                    return false;
                }
            } else {
                let holder_id = vars.get(SharedVar::HolderId);
                if holder_id > 0 || vars.get(SharedVar::Operated) != 0 {
                    debug!(holder_id, %participant, "claim refused, replicated holder is set");
                    return false;
                }
            }
        }

        vars.set(SharedVar::Operated, 1);
        vars.set(SharedVar::HolderId, participant.as_wire());
        if participant == self.local {
            self.claims_in_flight += 1;
        }
        info!(%participant, "claimed shelf");
        self.change(participant.as_wire());
        true
    }

    /// Reset the replicated vars and drop the cached holder.
    pub fn release(&mut self, vars: &dyn ReplicatedVars) {
        vars.set(SharedVar::Operated, 0);
        vars.set(SharedVar::HolderId, NO_HOLDER);
        info!(participant = %self.local, "released shelf");
        self.clear();
    }

    /// Holder named by the replicated vars. The cache is left alone.
    pub fn replicated_holder(vars: &dyn ReplicatedVars) -> Option<ParticipantId> {
        let holder_id = vars.get(SharedVar::HolderId);
        if holder_id > 0 || vars.get(SharedVar::Operated) != 0 {
            ParticipantId::new(holder_id)
        } else {
            None
        }
    }

    /// Count a holder notification. Call once per `HolderId` change, before
    /// acting on it.
    pub fn note_holder_change(&mut self, vars: &dyn ReplicatedVars) {
        if vars.get(SharedVar::HolderId) == self.local.as_wire() && self.claims_in_flight > 0 {
            self.claims_in_flight -= 1;
            debug!(remaining = self.claims_in_flight, "own claim echoed");
        }
    }

    /// True when no local claim is still on its way through the replicas.
    pub fn settled(&self) -> bool {
        self.claims_in_flight == 0
    }

    /// Rebuild the cached holder from the replicated vars.
    pub fn observe(&mut self, vars: &dyn ReplicatedVars) -> TokenChange {
        let holder_id = vars.get(SharedVar::HolderId);
        if holder_id > 0 || vars.get(SharedVar::Operated) != 0 {
            self.change(holder_id)
        } else {
            self.clear();
            TokenChange::Released
        }
    }

    /// Adopt `holder_id` as the holder. Non-positive ids clear the token.
    pub fn change(&mut self, holder_id: i32) -> TokenChange {
        let Some(observed) = ParticipantId::new(holder_id) else {
            self.clear();
            return TokenChange::Released;
        };

        if let Some(cached) = self.holder {
            if cached != observed {
                // Two claims crossed on the wire; the broadcast value wins.
                debug!(%cached, %observed, "operator changed under a held token");
            }
        }

        self.holder = Some(observed);
        self.operator = observed == self.local;
        TokenChange::Held(observed)
    }

    pub fn clear(&mut self) {
        self.holder = None;
        self.operator = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Vars {
        values: Mutex<(i32, i32)>,
        writes: Mutex<Vec<(SharedVar, i32)>>,
    }

    impl Vars {
        fn held_by(id: i32) -> Self {
            let vars = Vars::default();
            *vars.values.lock().unwrap() = (1, id);
            vars
        }
    }

    impl ReplicatedVars for Vars {
        fn get(&self, var: SharedVar) -> i32 {
            let values = self.values.lock().unwrap();
            match var {
                SharedVar::Operated => values.0,
                SharedVar::HolderId => values.1,
            }
        }

        fn set(&self, var: SharedVar, value: i32) {
            let mut values = self.values.lock().unwrap();
            match var {
                SharedVar::Operated => values.0 = value,
                SharedVar::HolderId => values.1 = value,
            }
            self.writes.lock().unwrap().push((var, value));
        }
    }

    fn pid(id: i32) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    #[test]
    fn non_positive_ids_are_nobody() {
        assert_eq!(ParticipantId::new(0), None);
        assert_eq!(ParticipantId::new(NO_HOLDER), None);
        assert_eq!(pid(7).as_wire(), 7);
    }

    #[test]
    fn solo_claim_ignores_replicated_holder() {
        let vars = Vars::held_by(9);
        let mut arbiter = Arbiter::new(pid(1));

        assert!(arbiter.try_claim(pid(1), &vars, false));
        assert!(arbiter.is_operator());
        assert_eq!(vars.get(SharedVar::HolderId), 1);
        assert_eq!(
            *vars.writes.lock().unwrap(),
            vec![(SharedVar::Operated, 1), (SharedVar::HolderId, 1)]
        );
    }

    #[test]
    fn contended_claim_fails_when_replicated_holder_is_set() {
        let vars = Vars::held_by(9);
        let mut arbiter = Arbiter::new(pid(1));

        assert!(!arbiter.try_claim(pid(1), &vars, true));
        assert!(!arbiter.is_operator());
        assert!(vars.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn contended_claim_fails_when_cached_holder_differs() {
        let vars = Vars::default();
        let mut arbiter = Arbiter::new(pid(1));
        arbiter.change(9);

        assert!(!arbiter.try_claim(pid(1), &vars, true));
        assert_eq!(arbiter.holder(), Some(pid(9)));
    }

    #[test]
    fn current_holder_may_reclaim() {
        let vars = Vars::default();
        let mut arbiter = Arbiter::new(pid(1));
        assert!(arbiter.try_claim(pid(1), &vars, true));
        assert!(arbiter.try_claim(pid(1), &vars, true));
        assert!(arbiter.is_operator());
    }

    #[test]
    fn observe_trusts_latest_broadcast() {
        let vars = Vars::held_by(1);
        let mut arbiter = Arbiter::new(pid(1));
        assert_eq!(arbiter.observe(&vars), TokenChange::Held(pid(1)));
        assert!(arbiter.is_operator());

        vars.set(SharedVar::HolderId, 2);
        assert_eq!(arbiter.observe(&vars), TokenChange::Held(pid(2)));
        assert!(!arbiter.is_operator());
        assert_eq!(arbiter.holder(), Some(pid(2)));
    }

    #[test]
    fn operated_without_positive_holder_clears() {
        let vars = Vars::held_by(0);
        let mut arbiter = Arbiter::new(pid(1));
        arbiter.change(1);

        assert_eq!(arbiter.observe(&vars), TokenChange::Released);
        assert_eq!(arbiter.holder(), None);
        assert!(!arbiter.is_operator());
    }

    #[test]
    fn older_holders_seen_before_the_echo_are_unsettled() {
        let vars = Vars::default();
        let mut arbiter = Arbiter::new(pid(1));
        assert!(arbiter.try_claim(pid(1), &vars, true));
        assert!(!arbiter.settled());

        // A racing claim delivered ahead of ours.
        vars.set(SharedVar::HolderId, 2);
        arbiter.note_holder_change(&vars);
        assert!(!arbiter.settled());
        assert_eq!(Arbiter::replicated_holder(&vars), Some(pid(2)));
        assert!(arbiter.is_operator());

        vars.set(SharedVar::HolderId, 1);
        arbiter.note_holder_change(&vars);
        assert!(arbiter.settled());
    }

    #[test]
    fn replicated_holder_reads_without_caching() {
        let vars = Vars::held_by(4);
        let arbiter = Arbiter::new(pid(1));
        assert_eq!(Arbiter::replicated_holder(&vars), Some(pid(4)));
        assert_eq!(arbiter.holder(), None);
        assert_eq!(Arbiter::replicated_holder(&Vars::default()), None);
    }

    #[test]
    fn release_resets_vars() {
        let vars = Vars::default();
        let mut arbiter = Arbiter::new(pid(3));
        assert!(arbiter.try_claim(pid(3), &vars, false));

        arbiter.release(&vars);
        assert_eq!(vars.get(SharedVar::Operated), 0);
        assert_eq!(vars.get(SharedVar::HolderId), NO_HOLDER);
        assert!(!arbiter.is_operator());
        assert_eq!(arbiter.observe(&vars), TokenChange::Released);
    }
}
