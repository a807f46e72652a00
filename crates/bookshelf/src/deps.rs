//! Collaborators the controller reads from and writes through.

use std::sync::Arc;

use crate::operator::{ParticipantId, ReplicatedVars};
use crate::store::{DestinationInfo, PersistentStore};

/// What the local client knows about the world the shelf stands in.
pub trait WorldView: Send + Sync {
    /// The participant this client acts for.
    fn local_participant(&self) -> ParticipantId;

    /// True when the local participant owns the world (their private world).
    fn in_own_world(&self) -> bool;

    /// True when any other participant is present.
    fn others_present(&self) -> bool;

    /// One-shot world flag such as "hub book received" or "cleft visited".
    fn flag(&self, name: &str) -> bool;

    /// The world the shelf stands in.
    fn current_world(&self) -> DestinationInfo;
}

/// Shared handles passed to the controller at construction.
#[derive(Clone)]
pub struct ShelfDeps {
    pub store: Arc<dyn PersistentStore>,
    pub vars: Arc<dyn ReplicatedVars>,
    pub world: Arc<dyn WorldView>,
}

impl ShelfDeps {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        vars: Arc<dyn ReplicatedVars>,
        world: Arc<dyn WorldView>,
    ) -> Self {
        Self { store, vars, world }
    }
}
