//! Accessor contract for the persistent tree store.
//!
//! The store itself lives outside this crate. The shelf only needs named
//! folders, scalar entries inside them, and link records with a lock flag, an
//! archive flag and a list of spawn points.
//!
//! Absence is always reported as `None`. Callers decide what a missing node
//! means (usually "locked" or "not archived").

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Handle to a folder node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub u64);

/// Handle to a scalar (chronicle) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarId(pub u64);

/// Handle to a link record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecordId(pub u64);

/// Named entry coordinate within a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub title: String,
    pub name: String,
}

impl SpawnPoint {
    pub fn new(title: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            name: name.into(),
        }
    }
}

/// Which world a link record points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationInfo {
    pub filename: String,
    pub instance_name: Option<String>,
    pub instance_guid: Option<Uuid>,
}

impl DestinationInfo {
    pub fn named(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            instance_name: None,
            instance_guid: None,
        }
    }

    /// Name of the folder holding this destination's child destinations.
    pub fn child_folder(&self) -> String {
        match self.instance_guid {
            Some(guid) => format!("{}/{}/ChildAges", self.filename, guid),
            None => format!("{}/ChildAges", self.filename),
        }
    }
}

/// Snapshot of a persisted link record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub destination: DestinationInfo,
    pub locked: bool,
    pub volatile: bool,
    pub spawn_points: Vec<SpawnPoint>,
}

/// Narrow view of the persistent tree store used by the shelf.
///
/// Writes are synchronous: once a setter returns `Ok`, every later read from
/// any participant observes the new value.
pub trait PersistentStore: Send + Sync {
    /// Find the named folder, creating it if missing.
    fn folder(&self, name: &str) -> FolderId;

    /// Find a scalar entry in `folder`. With `default = Some(v)` a missing
    /// entry is created holding `v`; with `None` a missing entry yields `None`.
    fn scalar(&self, folder: FolderId, name: &str, default: Option<&str>) -> Option<ScalarId>;

    fn read_scalar(&self, scalar: ScalarId) -> Option<String>;

    fn write_scalar(&self, scalar: ScalarId, value: &str) -> Result<(), StoreError>;

    /// Link records directly inside `folder`, in storage order.
    fn link_records(&self, folder: FolderId) -> Vec<LinkRecordId>;

    fn link_record(&self, record: LinkRecordId) -> Option<LinkRecord>;

    /// Update the flags that are `Some`, leaving the others untouched.
    fn set_link_record(
        &self,
        record: LinkRecordId,
        locked: Option<bool>,
        volatile: Option<bool>,
    ) -> Result<(), StoreError>;
}

/// Scalar entries hold integers as decimal text; anything non-zero is true.
pub fn scalar_flag(value: &str) -> Option<bool> {
    value.trim().parse::<i64>().ok().map(|v| v != 0)
}

pub fn flag_scalar(flag: bool) -> &'static str {
    if flag {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_flags_parse_like_integers() {
        assert_eq!(scalar_flag("1"), Some(true));
        assert_eq!(scalar_flag(" 0 "), Some(false));
        assert_eq!(scalar_flag("7"), Some(true));
        assert_eq!(scalar_flag("yes"), None);
        assert_eq!(flag_scalar(true), "1");
    }

    #[test]
    fn child_folder_is_scoped_by_instance() {
        let guid = Uuid::nil();
        let hood = DestinationInfo {
            filename: "Neighborhood".into(),
            instance_name: None,
            instance_guid: Some(guid),
        };
        assert_eq!(hood.child_folder(), format!("Neighborhood/{guid}/ChildAges"));
        assert_eq!(DestinationInfo::named("Personal").child_folder(), "Personal/ChildAges");
    }
}
