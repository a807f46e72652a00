//! Static shelf configuration.
//!
//! A [`ShelfLayout`] says which destination sits in which slot and which book
//! variant backs it. The default layout is the standard personal shelf; a
//! layout can also be loaded from JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stable position on the shelf, `0 <= index < layout.len()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotIndex(pub usize);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which storage shape and behaviour a slot's book has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Variant {
    /// One link record backs lock, archive and link target.
    Plain,
    /// One book standing for a set of child destinations.
    Hub,
    /// Backed by three scalar entries in the data folder instead of a link record.
    TwinChronicle,
    /// Plain storage, but mirrors its archive state from the twin once paired.
    MirroredCompanion,
    /// Plain storage with a different visiting rule and delete prompt.
    AltLinkingRule,
    /// Visible only when the named world flag is set.
    ConditionalVisibility { flag: String },
    /// Always visible, never lockable or deletable.
    Fixed,
}

/// Settings for the hub book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Destination id shown on the shelf.
    pub destination: String,
    /// Bookshelf link whose child folder holds the hub's children, when usable.
    pub parent_link: String,
    /// Destinations that belong to the hub.
    pub children: Vec<String>,
    /// Spawn point title → child destination, used when no child lists the spawn point.
    pub spawn_points: BTreeMap<String, String>,
    /// Instance name stamped on every hub link request.
    pub instance_name: String,
    /// Scalar entry holding the hub's lock flag.
    pub locked_entry: String,
    /// World flag that makes the hub visible.
    pub visibility_flag: String,
}

/// Settings for the scalar-backed twin book and its companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwinConfig {
    pub destination: String,
    pub companion: String,
    pub locked_entry: String,
    pub volatile_entry: String,
    pub link_entry: String,
}

/// Localized message identifiers for the archive confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    pub delete_book: String,
    pub delete_alt_book: String,
}

/// Complete static description of a shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfLayout {
    /// Slot table; `None` is an empty position.
    pub slots: Vec<Option<String>>,
    /// Destinations that are not [`Variant::Plain`].
    pub variants: BTreeMap<String, Variant>,
    pub hub: HubConfig,
    pub twin: TwinConfig,
    pub messages: MessageKeys,
    /// Folder holding scalar entries for the current world.
    pub data_folder: String,
    /// Folder holding the shelf's link records.
    pub bookshelf_folder: String,
}

impl Default for ShelfLayout {
    fn default() -> Self {
        let slots = [
            "Neighborhood", "Nexus", "city", "", "", "Cleft", "Garrison", "Teledahn", "Kadish",
            "Gira", "Garden", "Negilahn", "Dereno", "Payiferen", "Tetsonot", "Ercana",
            "AhnonayCathedral", "Ahnonay", "Minkata", "Jalak", "", "", "", "", "", "", "", "",
            "", "", "", "", "", "", "", "Myst",
        ]
        .into_iter()
        .map(|name| (!name.is_empty()).then(|| name.to_string()))
        .collect();

        let variants = [
            ("city", Variant::Hub),
            ("Ahnonay", Variant::TwinChronicle),
            ("AhnonayCathedral", Variant::MirroredCompanion),
            ("Neighborhood", Variant::AltLinkingRule),
            (
                "Cleft",
                Variant::ConditionalVisibility {
                    flag: "CleftVisited".into(),
                },
            ),
            ("Nexus", Variant::Fixed),
        ]
        .into_iter()
        .map(|(name, variant)| (name.to_string(), variant))
        .collect();

        let hub_spawns = [
            ("BaronCityOffice", "BaronCityOffice"),
            ("dsntShaftFall", "Descent"),
            ("grtzGrtZeroLinkRm", "GreatZero"),
            ("Spyroom", "spyroom"),
            ("Kveer", "Kveer"),
            ("islmGreatTree", "city"),
            ("islmDakotahRoof", "city"),
            ("islmPalaceBalcony03", "city"),
            ("islmPalaceBalcony02", "city"),
        ]
        .into_iter()
        .map(|(title, child)| (title.to_string(), child.to_string()))
        .collect();

        Self {
            slots,
            variants,
            hub: HubConfig {
                destination: "city".into(),
                parent_link: "Neighborhood".into(),
                children: ["city", "BaronCityOffice", "Descent", "GreatZero", "spyroom", "Kveer"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                spawn_points: hub_spawns,
                instance_name: "Ae'gura".into(),
                locked_entry: "CityBookLocked".into(),
                visibility_flag: "psnlGotCityBook".into(),
            },
            twin: TwinConfig {
                destination: "Ahnonay".into(),
                companion: "AhnonayCathedral".into(),
                locked_entry: "AhnonayLocked".into(),
                volatile_entry: "AhnonayVolatile".into(),
                link_entry: "AhnonayLink".into(),
            },
            messages: MessageKeys {
                delete_book: "Personal.Bookshelf.DeleteBook".into(),
                delete_alt_book: "Personal.Bookshelf.DeleteNeighborhoodBook".into(),
            },
            data_folder: "AgeData".into(),
            bookshelf_folder: "Bookshelf".into(),
        }
    }
}

impl ShelfLayout {
    /// Parse and validate a layout from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let layout: ShelfLayout = serde_json::from_str(json)?;
        layout.validate()?;
        Ok(layout)
    }

    /// Check that destinations are unique and every special book has a slot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for name in self.slots.iter().flatten() {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateDestination(name.clone()));
            }
        }

        let special = self
            .variants
            .keys()
            .map(String::as_str)
            .chain([self.hub.destination.as_str(), self.twin.destination.as_str()]);
        for name in special {
            if !seen.contains(name) {
                return Err(ConfigError::Unplaced(name.to_string()));
            }
        }
        Ok(())
    }

    /// Number of shelf positions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_of(&self, destination: &str) -> Option<SlotIndex> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(destination))
            .map(SlotIndex)
    }

    pub fn destination_at(&self, index: SlotIndex) -> Option<&str> {
        self.slots.get(index.0).and_then(|slot| slot.as_deref())
    }

    pub fn variant_of(&self, destination: &str) -> &Variant {
        self.variants.get(destination).unwrap_or(&Variant::Plain)
    }

    /// Whether a bookshelf link belongs to the hub rather than its own slot.
    pub fn is_hub_child(&self, destination: &str) -> bool {
        self.hub.children.iter().any(|child| child == destination)
    }

    pub fn slots(&self) -> impl Iterator<Item = SlotIndex> {
        (0..self.slots.len()).map(SlotIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_places_special_books() {
        let layout = ShelfLayout::default();
        layout.validate().unwrap();

        assert_eq!(layout.len(), 36);
        assert_eq!(layout.slot_of("Neighborhood"), Some(SlotIndex(0)));
        assert_eq!(layout.slot_of("city"), Some(SlotIndex(2)));
        assert_eq!(layout.slot_of("Myst"), Some(SlotIndex(35)));
        assert_eq!(layout.destination_at(SlotIndex(3)), None);
        assert_eq!(layout.variant_of("Teledahn"), &Variant::Plain);
        assert_eq!(layout.variant_of("Nexus"), &Variant::Fixed);
    }

    #[test]
    fn json_fills_missing_fields_from_default() {
        let layout = ShelfLayout::from_json(r#"{ "data_folder": "Chronicles" }"#).unwrap();
        assert_eq!(layout.data_folder, "Chronicles");
        assert_eq!(layout.slots, ShelfLayout::default().slots);
    }

    #[test]
    fn duplicate_destination_is_rejected() {
        let mut layout = ShelfLayout::default();
        layout.slots[3] = Some("Teledahn".into());

        let err = layout.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDestination(name) if name == "Teledahn"));
    }

    #[test]
    fn unplaced_variant_is_rejected() {
        let mut layout = ShelfLayout::default();
        layout.slots[5] = None;

        let err = layout.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Unplaced(name) if name == "Cleft"));
    }

    #[test]
    fn conditional_variant_round_trips_through_json() {
        let json = serde_json::to_string(&ShelfLayout::default()).unwrap();
        let parsed = ShelfLayout::from_json(&json).unwrap();
        assert_eq!(
            parsed.variant_of("Cleft"),
            &Variant::ConditionalVisibility {
                flag: "CleftVisited".into()
            }
        );
    }
}
