//! In-memory [`PersistentStore`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use bookshelf::{
    DestinationInfo, FolderId, LinkRecord, LinkRecordId, PersistentStore, ScalarId, SpawnPoint,
    StoreError,
};
use dashmap::DashMap;
use tracing::trace;

/// Link record with the given flags and no spawn points.
pub fn record(filename: &str, locked: bool, volatile: bool) -> LinkRecord {
    LinkRecord {
        destination: DestinationInfo::named(filename),
        locked,
        volatile,
        spawn_points: Vec::new(),
    }
}

/// Same as [`record`] with spawn points given as `(title, name)` pairs.
pub fn record_with_spawns(
    filename: &str,
    locked: bool,
    volatile: bool,
    spawns: &[(&str, &str)],
) -> LinkRecord {
    LinkRecord {
        spawn_points: spawns
            .iter()
            .map(|(title, name)| SpawnPoint::new(*title, *name))
            .collect(),
        ..record(filename, locked, volatile)
    }
}

/// Thread-safe tree store shared by every participant of a test.
///
/// Writes are visible to all readers immediately, which is the guarantee
/// the shelf relies on.
#[derive(Default)]
pub struct MemoryVault {
    next_id: AtomicU64,
    folders: DashMap<String, FolderId>,
    scalar_names: DashMap<(FolderId, String), ScalarId>,
    scalars: DashMap<ScalarId, String>,
    folder_links: DashMap<FolderId, Vec<LinkRecordId>>,
    links: DashMap<LinkRecordId, LinkRecord>,
    reject_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Append a link record to the named folder.
    pub fn add_link(&self, folder: &str, record: LinkRecord) -> LinkRecordId {
        let folder = self.folder(folder);
        let id = LinkRecordId(self.fresh());
        self.links.insert(id, record);
        self.folder_links.entry(folder).or_default().push(id);
        id
    }

    /// Create or overwrite a scalar entry in the named folder.
    pub fn put_scalar(&self, folder: &str, name: &str, value: &str) -> ScalarId {
        let folder = self.folder(folder);
        let id = *self
            .scalar_names
            .entry((folder, name.to_string()))
            .or_insert_with(|| ScalarId(self.fresh()));
        self.scalars.insert(id, value.to_string());
        id
    }

    pub fn scalar_value(&self, folder: &str, name: &str) -> Option<String> {
        let folder = *self.folders.get(folder)?;
        let id = *self.scalar_names.get(&(folder, name.to_string()))?;
        self.scalars.get(&id).map(|value| value.value().clone())
    }

    pub fn link(&self, id: LinkRecordId) -> Option<LinkRecord> {
        self.links.get(&id).map(|record| record.value().clone())
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write fail with [`StoreError::Rejected`].
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("vault is read-only".into()));
        }
        Ok(())
    }
}

impl PersistentStore for MemoryVault {
    fn folder(&self, name: &str) -> FolderId {
        *self
            .folders
            .entry(name.to_string())
            .or_insert_with(|| FolderId(self.fresh()))
    }

    fn scalar(&self, folder: FolderId, name: &str, default: Option<&str>) -> Option<ScalarId> {
        let key = (folder, name.to_string());
        if let Some(id) = self.scalar_names.get(&key) {
            return Some(*id);
        }
        let default = default?;
        let id = *self
            .scalar_names
            .entry(key)
            .or_insert_with(|| ScalarId(self.fresh()));
        self.scalars.entry(id).or_insert_with(|| default.to_string());
        trace!(name, default, "scalar created");
        Some(id)
    }

    fn read_scalar(&self, scalar: ScalarId) -> Option<String> {
        self.scalars.get(&scalar).map(|value| value.value().clone())
    }

    fn write_scalar(&self, scalar: ScalarId, value: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut entry = self
            .scalars
            .get_mut(&scalar)
            .ok_or_else(|| StoreError::MissingNode(format!("scalar {}", scalar.0)))?;
        *entry = value.to_string();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn link_records(&self, folder: FolderId) -> Vec<LinkRecordId> {
        self.folder_links
            .get(&folder)
            .map(|links| links.value().clone())
            .unwrap_or_default()
    }

    fn link_record(&self, record: LinkRecordId) -> Option<LinkRecord> {
        self.link(record)
    }

    fn set_link_record(
        &self,
        record: LinkRecordId,
        locked: Option<bool>,
        volatile: Option<bool>,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut entry = self
            .links
            .get_mut(&record)
            .ok_or_else(|| StoreError::MissingNode(format!("link {}", record.0)))?;
        if let Some(locked) = locked {
            entry.locked = locked;
        }
        if let Some(volatile) = volatile {
            entry.volatile = volatile;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
