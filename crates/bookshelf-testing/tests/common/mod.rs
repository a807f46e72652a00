#![allow(dead_code)]

use std::sync::Arc;

use bookshelf::{LinkRecordId, ParticipantId, ShelfDeps, ShelfLayout, SlotIndex};
use bookshelf_testing::{participant, record, record_with_spawns, MemoryVault, Network, TestWorld};

pub const NEIGHBORHOOD: SlotIndex = SlotIndex(0);
pub const NEXUS: SlotIndex = SlotIndex(1);
pub const CITY: SlotIndex = SlotIndex(2);
pub const CLEFT: SlotIndex = SlotIndex(5);
pub const TELEDAHN: SlotIndex = SlotIndex(7);
pub const GIRA: SlotIndex = SlotIndex(9);
pub const CATHEDRAL: SlotIndex = SlotIndex(16);
pub const AHNONAY: SlotIndex = SlotIndex(17);

pub const AHNONAY_GUID: &str = "4f2c9d1e-8a3b-4c5d-9e6f-0a1b2c3d4e5f";

pub fn owner() -> ParticipantId {
    participant(1)
}

pub fn visitor() -> ParticipantId {
    participant(2)
}

/// A personal shelf with one book of every kind.
pub struct Fixture {
    pub vault: Arc<MemoryVault>,
    pub teledahn: LinkRecordId,
    pub gira: LinkRecordId,
    pub neighborhood: LinkRecordId,
    pub nexus: LinkRecordId,
    pub cleft: LinkRecordId,
    pub cathedral: LinkRecordId,
    pub city_child: LinkRecordId,
    pub office_child: LinkRecordId,
}

impl Fixture {
    pub fn new() -> Self {
        let vault = Arc::new(MemoryVault::new());
        let teledahn = vault.add_link("Bookshelf", record("Teledahn", true, false));
        let gira = vault.add_link("Bookshelf", record("Gira", false, false));
        let neighborhood = vault.add_link("Bookshelf", record("Neighborhood", false, false));
        let nexus = vault.add_link("Bookshelf", record("Nexus", false, false));
        let cleft = vault.add_link("Bookshelf", record("Cleft", false, false));
        let cathedral = vault.add_link("Bookshelf", record("AhnonayCathedral", false, false));

        vault.put_scalar("AgeData", "AhnonayLink", AHNONAY_GUID);
        vault.put_scalar("AgeData", "AhnonayLocked", "0");
        vault.put_scalar("AgeData", "AhnonayVolatile", "0");

        let city_child = vault.add_link(
            "Neighborhood/ChildAges",
            record_with_spawns("city", true, false, &[("islmGreatTree", "LinkInPointGreatTree")]),
        );
        let office_child = vault.add_link(
            "Neighborhood/ChildAges",
            record_with_spawns(
                "BaronCityOffice",
                true,
                false,
                &[("BaronCityOffice", "LinkInPointDefault")],
            ),
        );

        Self {
            vault,
            teledahn,
            gira,
            neighborhood,
            nexus,
            cleft,
            cathedral,
            city_child,
            office_child,
        }
    }

    /// World flags that make every conditional book visible.
    pub fn flags() -> [(&'static str, bool); 2] {
        [("psnlGotCityBook", true), ("CleftVisited", true)]
    }

    /// Standalone collaborators for driving a `BookTable` or controller directly.
    pub fn deps(&self, world: TestWorld) -> (ShelfDeps, Arc<TestWorld>) {
        for (name, value) in Self::flags() {
            world.set_flag(name, value);
        }
        let world = Arc::new(world);
        let vars = Network::new().join();
        (
            ShelfDeps::new(self.vault.clone(), vars, world.clone()),
            world,
        )
    }

    pub fn layout() -> Arc<ShelfLayout> {
        Arc::new(ShelfLayout::default())
    }
}
