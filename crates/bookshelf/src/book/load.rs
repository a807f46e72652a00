//! Rebuilding the book table from storage.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Book, BookKind, BookTable};
use crate::deps::WorldView;
use crate::layout::{ShelfLayout, SlotIndex, Variant};
use crate::store::PersistentStore;

impl BookTable {
    /// Build a fresh table from the bookshelf folder and the data folder.
    ///
    /// Link records fill the ordinary slots. The twin is built from its
    /// scalar entries and the hub from its lock entry; both are placed last so
    /// the companion pairing and the hub's parent link are already known.
    pub fn load(
        store: Arc<dyn PersistentStore>,
        world: Arc<dyn WorldView>,
        layout: Arc<ShelfLayout>,
    ) -> Self {
        let mut table = BookTable::empty(store.clone(), world.clone(), layout.clone());
        let own_world = world.in_own_world();
        let data = store.folder(&layout.data_folder);

        let mut twin = layout.slot_of(&layout.twin.destination).map(|index| {
            let entry = |name: &str| store.scalar(data, name, None);
            let link = entry(&layout.twin.link_entry);
            Book::new(
                index,
                layout.twin.destination.clone(),
                BookKind::TwinChronicle {
                    locked: entry(&layout.twin.locked_entry),
                    volatile: entry(&layout.twin.volatile_entry),
                    link,
                    companion: None,
                },
            )
            .with_visible(link.is_some())
        });

        let mut hub = layout.slot_of(&layout.hub.destination).map(|index| {
            let default = own_world.then_some("1");
            Book::new(
                index,
                layout.hub.destination.clone(),
                BookKind::Hub {
                    locked: store.scalar(data, &layout.hub.locked_entry, default),
                    parent_link: None,
                },
            )
            .with_visible(world.flag(&layout.hub.visibility_flag))
        });

        let shelf = store.folder(&layout.bookshelf_folder);
        for id in store.link_records(shelf) {
            let Some(record) = store.link_record(id) else {
                continue;
            };
            let name = record.destination.filename.as_str();

            if layout.is_hub_child(name) {
                continue;
            }
            if name == layout.hub.parent_link {
                if let Some(Book {
                    kind: BookKind::Hub { parent_link, .. },
                    ..
                }) = hub.as_mut()
                {
                    *parent_link = Some(id);
                }
            }
            let Some(index) = layout.slot_of(name) else {
                debug!(destination = name, "link has no slot on this shelf");
                continue;
            };

            let book = match layout.variant_of(name) {
                Variant::Plain => Book::new(index, name, BookKind::Plain { record: id }),
                Variant::AltLinkingRule => {
                    Book::new(index, name, BookKind::AltLinkingRule { record: id })
                }
                Variant::Fixed => Book::new(index, name, BookKind::Fixed { record: id }),
                Variant::ConditionalVisibility { flag } => {
                    Book::new(index, name, BookKind::ConditionalVisibility { record: id })
                        .with_visible(world.flag(flag))
                }
                Variant::MirroredCompanion => {
                    let paired = twin.as_mut().filter(|twin| twin.visible).map(|twin| {
                        if let BookKind::TwinChronicle { companion, .. } = &mut twin.kind {
                            *companion = Some(index);
                        }
                        twin.index
                    });
                    Book::new(
                        index,
                        name,
                        BookKind::MirroredCompanion {
                            record: id,
                            twin: paired,
                        },
                    )
                }
                Variant::Hub | Variant::TwinChronicle => {
                    debug!(destination = name, "link ignored, book is not link-backed");
                    continue;
                }
            };
            table.place(book);
        }

        if let Some(twin) = twin.take() {
            table.place(twin);
        }
        if let Some(hub) = hub.take() {
            table.place(hub);
        }
        table.unpair_missing();
        table
    }

    fn place(&mut self, book: Book) {
        if !book.visible {
            debug!(slot = %book.index, destination = %book.destination, "book not visible");
            return;
        }
        let Some(slot) = self.books.get_mut(book.index.0) else {
            warn!(slot = %book.index, "book outside shelf");
            return;
        };
        if let Some(existing) = slot {
            warn!(
                slot = %book.index,
                kept = %existing.destination,
                dropped = %book.destination,
                "two links claim one slot"
            );
            return;
        }
        *slot = Some(book);
    }

    /// Drop pairings whose other half did not make it into the table.
    fn unpair_missing(&mut self) {
        let present: Vec<bool> = self.books.iter().map(Option::is_some).collect();
        let is_present = |slot: SlotIndex| present.get(slot.0).copied().unwrap_or(false);

        for book in self.books.iter_mut().flatten() {
            match &mut book.kind {
                BookKind::MirroredCompanion { twin, .. } => {
                    if twin.is_some_and(|slot| !is_present(slot)) {
                        *twin = None;
                    }
                }
                BookKind::TwinChronicle { companion, .. } => {
                    if companion.is_some_and(|slot| !is_present(slot)) {
                        *companion = None;
                    }
                }
                _ => {}
            }
        }
    }
}
