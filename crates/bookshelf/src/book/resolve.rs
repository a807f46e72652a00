//! Turning "link me to this spawn point" into a [`LinkRequest`].

use tracing::{debug, warn};
use uuid::Uuid;

use super::{BookKind, BookTable};
use crate::error::{Result, ShelfError};
use crate::layout::SlotIndex;
use crate::link::{LinkRequest, LinkingRule};
use crate::store::{DestinationInfo, LinkRecordId, SpawnPoint};

impl BookTable {
    /// Build the link request for the book in `index`.
    ///
    /// Nothing is written to storage. When no request can be built the error
    /// says why and the caller abandons the link.
    pub fn resolve_link(
        &self,
        index: SlotIndex,
        spawn_title: &str,
        spawn_name: &str,
    ) -> Result<LinkRequest> {
        let book = self.book(index)?;
        let spawn = SpawnPoint::new(spawn_title, spawn_name);
        let own_world = self.world.in_own_world();

        match &book.kind {
            BookKind::Plain { record }
            | BookKind::ConditionalVisibility { record }
            | BookKind::Fixed { record }
            | BookKind::MirroredCompanion { record, .. } => {
                let rule = if own_world {
                    LinkingRule::OwnedBook
                } else {
                    LinkingRule::BasicLink
                };
                self.record_request(*record, &spawn, rule)
            }
            BookKind::AltLinkingRule { record } => {
                let rule = if own_world {
                    LinkingRule::OwnedBook
                } else {
                    LinkingRule::OriginalBook
                };
                self.record_request(*record, &spawn, rule)
            }
            BookKind::TwinChronicle { link, .. } => {
                let guid = link
                    .and_then(|entry| self.store.read_scalar(entry))
                    .ok_or_else(|| {
                        ShelfError::not_found(format!("instance entry {}", self.layout.twin.link_entry))
                    })?;
                let guid = Uuid::parse_str(guid.trim()).map_err(|err| {
                    ShelfError::not_found(format!("instance guid {guid:?}: {err}"))
                })?;
                let destination = DestinationInfo {
                    filename: book.destination.clone(),
                    instance_name: Some(book.destination.clone()),
                    instance_guid: Some(guid),
                };
                Ok(LinkRequest::new(&destination, &spawn, LinkingRule::BasicLink))
            }
            BookKind::Hub { parent_link, .. } => {
                self.resolve_hub_link(&book.kind, *parent_link, spawn, own_world)
            }
        }
    }

    fn record_request(
        &self,
        record: LinkRecordId,
        spawn: &SpawnPoint,
        rule: LinkingRule,
    ) -> Result<LinkRequest> {
        let record = self
            .store
            .link_record(record)
            .ok_or_else(|| ShelfError::not_found(format!("link record {record:?}")))?;
        Ok(LinkRequest::new(&record.destination, spawn, rule))
    }

    /// Search every child for the spawn point, then fall back to the static
    /// spawn table. A missing child is only synthesized in the participant's
    /// own world.
    fn resolve_hub_link(
        &self,
        kind: &BookKind,
        parent_link: Option<LinkRecordId>,
        spawn: SpawnPoint,
        own_world: bool,
    ) -> Result<LinkRequest> {
        let hub = &self.layout.hub;
        let children = self.hub_children(kind);

        if let Some((_, child)) = children
            .iter()
            .find(|(_, child)| child.spawn_points.contains(&spawn))
        {
            return Ok(LinkRequest::new(&child.destination, &spawn, LinkingRule::BasicLink)
                .with_instance_name(hub.instance_name.clone()));
        }

        debug!(title = %spawn.title, name = %spawn.name, "spawn point not listed by any child");
        let child_name = hub.spawn_points.get(&spawn.title).ok_or_else(|| {
            warn!(title = %spawn.title, "no child destination for spawn point");
            ShelfError::not_found(format!("child destination for spawn point {}", spawn.title))
        })?;

        if let Some((_, child)) = children
            .iter()
            .find(|(_, child)| &child.destination.filename == child_name)
        {
            return Ok(LinkRequest::new(&child.destination, &spawn, LinkingRule::BasicLink)
                .with_instance_name(hub.instance_name.clone()));
        }

        if !own_world {
            warn!(child = %child_name, "cannot create a child destination while visiting");
            return Err(ShelfError::not_found(format!(
                "child destination {child_name} while visiting"
            )));
        }

        let parent = self.hub_parent(parent_link);
        debug!(child = %child_name, parent = %parent.filename, "creating child destination");
        Ok(LinkRequest::new(
            &DestinationInfo::named(child_name.clone()),
            &spawn,
            LinkingRule::ChildAgeBook,
        )
        .with_instance_name(hub.instance_name.clone())
        .with_parent(parent.filename))
    }
}
