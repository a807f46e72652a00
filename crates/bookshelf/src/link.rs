//! Link handoff types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{DestinationInfo, SpawnPoint};

/// Policy the linking collaborator applies when admitting the participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkingRule {
    /// Plain visit, nothing recorded.
    BasicLink,
    /// Visit that may also restore the participant's own copy of the book.
    OriginalBook,
    /// Link through a book the participant owns; records the spawn point.
    OwnedBook,
    /// Creates a child destination under `parent_destination`.
    ChildAgeBook,
}

/// Structured request handed to the network-linking collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub destination: String,
    pub instance_name: Option<String>,
    pub instance_guid: Option<Uuid>,
    pub spawn_title: String,
    pub spawn_name: String,
    pub linking_rule: LinkingRule,
    pub parent_destination: Option<String>,
}

impl LinkRequest {
    pub fn new(destination: &DestinationInfo, spawn: &SpawnPoint, linking_rule: LinkingRule) -> Self {
        Self {
            destination: destination.filename.clone(),
            instance_name: destination.instance_name.clone(),
            instance_guid: destination.instance_guid,
            spawn_title: spawn.title.clone(),
            spawn_name: spawn.name.clone(),
            linking_rule,
            parent_destination: None,
        }
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_destination = Some(parent.into());
        self
    }

    pub fn spawn_point(&self) -> SpawnPoint {
        SpawnPoint::new(self.spawn_title.clone(), self.spawn_name.clone())
    }
}
