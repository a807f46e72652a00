//! The book model.
//!
//! One [`Book`] stands in each non-empty, visible slot. Every variant stores
//! its lock flag, archive ("volatile") flag and link target differently, but
//! the [`BookTable`] presents them uniformly:
//!
//! | variant               | lock                 | archive                       | link target              |
//! |-----------------------|----------------------|-------------------------------|--------------------------|
//! | Plain                 | link record          | link record                   | link record              |
//! | AltLinkingRule        | link record          | link record                   | link record, alt rule    |
//! | ConditionalVisibility | never locked         | link record                   | link record              |
//! | Fixed                 | never locked         | link record                   | link record              |
//! | MirroredCompanion     | link record          | twin's scalar once paired     | link record              |
//! | TwinChronicle         | scalar entry         | scalar entry, mirrored        | scalar instance guid     |
//! | Hub                   | scalar + every child | every child                   | child search / creation  |
//!
//! Books are rebuilt from storage on every load and never carried across
//! loads. The companion/twin pairing is a pair of slot indices into the
//! table, not an owning reference.

mod load;
mod resolve;

use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use crate::deps::WorldView;
use crate::error::{Denial, Result, ShelfError};
use crate::event::EventKind;
use crate::layout::{ShelfLayout, SlotIndex};
use crate::store::{flag_scalar, scalar_flag, LinkRecord, LinkRecordId, PersistentStore, ScalarId};

/// Slots whose visual state must follow a lock or tray change, with the new state.
pub type SlotUpdates = SmallVec<[(SlotIndex, bool); 2]>;

/// Storage shape behind one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookKind {
    Plain { record: LinkRecordId },
    AltLinkingRule { record: LinkRecordId },
    ConditionalVisibility { record: LinkRecordId },
    Fixed { record: LinkRecordId },
    MirroredCompanion {
        record: LinkRecordId,
        twin: Option<SlotIndex>,
    },
    TwinChronicle {
        locked: Option<ScalarId>,
        volatile: Option<ScalarId>,
        link: Option<ScalarId>,
        companion: Option<SlotIndex>,
    },
    Hub {
        locked: Option<ScalarId>,
        parent_link: Option<LinkRecordId>,
    },
}

impl BookKind {
    /// The link record directly backing this book, if any.
    pub fn record(&self) -> Option<LinkRecordId> {
        match self {
            BookKind::Plain { record }
            | BookKind::AltLinkingRule { record }
            | BookKind::ConditionalVisibility { record }
            | BookKind::Fixed { record }
            | BookKind::MirroredCompanion { record, .. } => Some(*record),
            BookKind::TwinChronicle { .. } | BookKind::Hub { .. } => None,
        }
    }
}

/// One book on the shelf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    index: SlotIndex,
    unlockable: bool,
    deletable: bool,
    visible: bool,
    destination: String,
    kind: BookKind,
}

impl Book {
    fn new(index: SlotIndex, destination: impl Into<String>, kind: BookKind) -> Self {
        let (unlockable, deletable) = match kind {
            BookKind::ConditionalVisibility { .. } | BookKind::Fixed { .. } => (false, false),
            BookKind::Hub { .. } => (true, false),
            _ => (true, true),
        };
        Self {
            index,
            unlockable,
            deletable,
            visible: true,
            destination: destination.into(),
            kind,
        }
    }

    fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn index(&self) -> SlotIndex {
        self.index
    }

    pub fn unlockable(&self) -> bool {
        self.unlockable
    }

    pub fn deletable(&self) -> bool {
        self.deletable
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Filename of the destination this book links to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn kind(&self) -> &BookKind {
        &self.kind
    }

    /// Message key for the archive confirmation prompt.
    pub fn delete_message_key<'a>(&self, layout: &'a ShelfLayout) -> &'a str {
        match self.kind {
            BookKind::AltLinkingRule { .. } => &layout.messages.delete_alt_book,
            _ => &layout.messages.delete_book,
        }
    }
}

/// All books of one load, indexed by slot.
pub struct BookTable {
    books: Vec<Option<Book>>,
    store: Arc<dyn PersistentStore>,
    world: Arc<dyn WorldView>,
    layout: Arc<ShelfLayout>,
}

impl std::fmt::Debug for BookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookTable").field("books", &self.books).finish()
    }
}

impl BookTable {
    /// A table with every slot empty.
    pub fn empty(
        store: Arc<dyn PersistentStore>,
        world: Arc<dyn WorldView>,
        layout: Arc<ShelfLayout>,
    ) -> Self {
        Self {
            books: vec![None; layout.len()],
            store,
            world,
            layout,
        }
    }

    pub fn get(&self, index: SlotIndex) -> Option<&Book> {
        self.books.get(index.0).and_then(Option::as_ref)
    }

    /// The book in `index`, or [`ShelfError::EmptySlot`].
    pub fn book(&self, index: SlotIndex) -> Result<&Book> {
        self.get(index).ok_or(ShelfError::EmptySlot(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.books.iter().flatten()
    }

    pub fn layout(&self) -> &ShelfLayout {
        &self.layout
    }

    /// Whether the book must be unlocked before its link can be read.
    /// Books that cannot be unlocked always read as unlocked; a missing
    /// backing node reads as locked.
    pub fn locked(&self, index: SlotIndex) -> Result<bool> {
        let book = self.book(index)?;
        if !book.unlockable {
            return Ok(false);
        }
        let locked = match &book.kind {
            BookKind::TwinChronicle { locked, .. } | BookKind::Hub { locked, .. } => {
                self.read_flag(*locked).unwrap_or(true)
            }
            kind => kind
                .record()
                .and_then(|record| self.store.link_record(record))
                .map_or(true, |record| record.locked),
        };
        Ok(locked)
    }

    /// Whether the book is archived. A missing backing node reads as not archived.
    /// A hub has no tray of its own to bring it back, so it never reads archived
    /// even when every child is.
    pub fn volatile(&self, index: SlotIndex) -> Result<bool> {
        let book = self.book(index)?;
        let volatile = match &book.kind {
            BookKind::MirroredCompanion {
                twin: Some(twin), ..
            } if self.get(*twin).is_some() => return self.volatile(*twin),
            BookKind::TwinChronicle { volatile, .. } => self.read_flag(*volatile).unwrap_or(false),
            BookKind::Hub { .. } => false,
            kind => kind
                .record()
                .and_then(|record| self.store.link_record(record))
                .is_some_and(|record| record.volatile),
        };
        Ok(volatile)
    }

    /// Persist the lock flag. A hub writes its own entry and then every child.
    pub fn set_locked(&self, index: SlotIndex, locked: bool) -> Result<()> {
        let book = self.book(index)?;
        if !book.unlockable {
            return Err(ShelfError::PreconditionDenied {
                event: EventKind::LockPicked,
                reason: Denial::Capability("unlockable"),
            });
        }
        match &book.kind {
            BookKind::TwinChronicle { locked: entry, .. } => {
                let entry = entry
                    .ok_or_else(|| ShelfError::not_found(format!("lock entry for {}", book.destination)))?;
                self.store.write_scalar(entry, flag_scalar(locked))?;
            }
            BookKind::Hub { locked: entry, .. } => {
                let Some(entry) = *entry else {
                    warn!(slot = %index, "hub lock entry does not exist, refusing write");
                    return Err(ShelfError::not_found(format!(
                        "lock entry {}",
                        self.layout.hub.locked_entry
                    )));
                };
                self.store.write_scalar(entry, flag_scalar(locked))?;
                for (child, _) in self.hub_children(&book.kind) {
                    self.store.set_link_record(child, Some(locked), None)?;
                }
            }
            kind => {
                if let Some(record) = kind.record() {
                    self.store.set_link_record(record, Some(locked), None)?;
                }
            }
        }
        debug!(slot = %index, locked, "lock flag written");
        Ok(())
    }

    /// Persist the archive flag, keeping a paired twin and companion equal.
    /// Returns every slot whose archive state changed.
    pub fn set_volatile(&self, index: SlotIndex, volatile: bool) -> Result<SlotUpdates> {
        let book = self.book(index)?;
        let mut touched: SlotUpdates = smallvec![(index, volatile)];
        match &book.kind {
            BookKind::TwinChronicle {
                volatile: entry,
                companion,
                ..
            } => {
                let entry = entry.ok_or_else(|| {
                    ShelfError::not_found(format!("archive entry {}", self.layout.twin.volatile_entry))
                })?;
                self.store.write_scalar(entry, flag_scalar(volatile))?;
                if let Some(record) = companion
                    .and_then(|slot| self.get(slot))
                    .and_then(|companion| companion.kind.record())
                {
                    self.store.set_link_record(record, None, Some(volatile))?;
                    touched.extend(companion.map(|slot| (slot, volatile)));
                }
            }
            BookKind::MirroredCompanion { record, twin } => {
                if let Some(twin_book) = twin.and_then(|slot| self.get(slot)) {
                    if let BookKind::TwinChronicle {
                        volatile: Some(entry),
                        ..
                    } = twin_book.kind
                    {
                        self.store.write_scalar(entry, flag_scalar(volatile))?;
                    }
                    touched.push((twin_book.index, volatile));
                }
                self.store.set_link_record(*record, None, Some(volatile))?;
            }
            BookKind::Hub { .. } => {
                for (child, _) in self.hub_children(&book.kind) {
                    self.store.set_link_record(child, None, Some(volatile))?;
                }
            }
            kind => {
                if let Some(record) = kind.record() {
                    self.store.set_link_record(record, None, Some(volatile))?;
                }
            }
        }
        debug!(slot = %index, volatile, "archive flag written");
        Ok(touched)
    }

    /// Lock interaction: `unlocked` is the new state of the lock aspect.
    pub fn on_lock(&self, index: SlotIndex, unlocked: bool) -> Result<SlotUpdates> {
        self.set_locked(index, !unlocked)?;
        Ok(smallvec![(index, unlocked)])
    }

    /// Tray interaction: `archived` is the new state of the tray aspect.
    pub fn on_tray(&self, index: SlotIndex, archived: bool) -> Result<SlotUpdates> {
        if !self.book(index)?.deletable {
            return Err(ShelfError::PreconditionDenied {
                event: EventKind::TrayPicked,
                reason: Denial::Capability("deletable"),
            });
        }
        self.set_volatile(index, archived)
    }

    fn read_flag(&self, entry: Option<ScalarId>) -> Option<bool> {
        entry
            .and_then(|entry| self.store.read_scalar(entry))
            .and_then(|value| scalar_flag(&value))
    }

    /// The hub's child destination records, read fresh from storage.
    fn hub_children(&self, kind: &BookKind) -> Vec<(LinkRecordId, LinkRecord)> {
        let BookKind::Hub { parent_link, .. } = kind else {
            return Vec::new();
        };
        let parent = self.hub_parent(*parent_link);
        let folder = self.store.folder(&parent.child_folder());
        self.store
            .link_records(folder)
            .into_iter()
            .filter_map(|id| self.store.link_record(id).map(|record| (id, record)))
            .filter(|(_, record)| self.layout.is_hub_child(&record.destination.filename))
            .collect()
    }

    /// The parent link's destination when it exists and is not archived,
    /// otherwise the current world.
    fn hub_parent(&self, parent_link: Option<LinkRecordId>) -> crate::store::DestinationInfo {
        parent_link
            .and_then(|id| self.store.link_record(id))
            .filter(|record| !record.volatile)
            .map(|record| record.destination)
            .unwrap_or_else(|| self.world.current_world())
    }
}
