//! Scene object names and trigger handles, wired once at startup.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::item_state::{Aspect, Edge, ItemState, TriggerKey};
use crate::layout::SlotIndex;

/// Clickable objects belonging to one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotObjects {
    pub book: String,
    pub lock: String,
    pub tray: String,
}

/// Scene wiring for one shelf. Slot objects are listed in slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneBindings {
    pub slots: Vec<SlotObjects>,
    /// Triggers the scene does not provide; transitions on them change
    /// state without running anything.
    #[serde(default)]
    pub unbound: BTreeSet<TriggerKey>,
}

impl SceneBindings {
    /// `Book00`/`Lock00`/`Tray00` style names for `count` slots, all triggers bound.
    pub fn uniform(count: usize) -> Self {
        let slots = (0..count)
            .map(|i| SlotObjects {
                book: format!("Book{i:02}"),
                lock: format!("Lock{i:02}"),
                tray: format!("Tray{i:02}"),
            })
            .collect();
        Self {
            slots,
            unbound: BTreeSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn object_name(&self, slot: SlotIndex, aspect: Aspect) -> Option<&str> {
        let objects = self.slots.get(slot.0)?;
        Some(match aspect {
            Aspect::Shown => &objects.book,
            Aspect::Locked => &objects.lock,
            Aspect::Tray => &objects.tray,
        })
    }

    /// Name → slot table for resolving picked objects.
    pub fn name_table(&self) -> HashMap<String, SlotIndex> {
        self.slots
            .iter()
            .enumerate()
            .flat_map(|(i, objects)| {
                [&objects.book, &objects.lock, &objects.tray]
                    .into_iter()
                    .map(move |name| (name.clone(), SlotIndex(i)))
            })
            .collect()
    }

    /// One state machine per slot for `aspect`.
    pub fn item_states(&self, aspect: Aspect) -> Vec<ItemState> {
        (0..self.slots.len())
            .map(SlotIndex)
            .map(|slot| {
                let bound = |edge| !self.unbound.contains(&TriggerKey::new(slot, aspect, edge));
                ItemState::new(slot, aspect).with_triggers(bound(Edge::On), bound(Edge::Off))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item_state::Playback;

    #[test]
    fn every_object_resolves_to_its_slot() {
        let scene = SceneBindings::uniform(12);
        let names = scene.name_table();

        assert_eq!(names.len(), 36);
        assert_eq!(names.get("Book00"), Some(&SlotIndex(0)));
        assert_eq!(names.get("Lock07"), Some(&SlotIndex(7)));
        assert_eq!(names.get("Tray11"), Some(&SlotIndex(11)));
        assert_eq!(names.get("Shelf"), None);
        assert_eq!(scene.object_name(SlotIndex(7), Aspect::Tray), Some("Tray07"));
    }

    #[test]
    fn unbound_triggers_are_skipped() {
        let mut scene = SceneBindings::uniform(2);
        scene
            .unbound
            .insert(TriggerKey::new(SlotIndex(1), Aspect::Locked, Edge::On));

        let mut locks = scene.item_states(Aspect::Locked);
        assert!(locks[1].set_state(true, Playback::LIVE).is_none());
        assert!(locks[0].set_state(true, Playback::LIVE).is_some());
    }
}
