//! Several participants sharing one shelf, driven step by step.
//!
//! ```text
//!   Room::act(p, event)
//!        │
//!        ▼
//!   member p ── controller.handle ──► commands ──► log
//!        │                              │
//!        │                    BroadcastBusy / vars.set
//!        ▼                              ▼
//!   Room::pump() ◄────────────────── Network queue
//!        │
//!        └─► ReplicatedChanged / BusyChanged to every member
//! ```
//!
//! Triggers a member runs live are queued on that member and only complete
//! when the test says so, which is how animation ordering is exercised.

use std::collections::VecDeque;
use std::sync::Arc;

use bookshelf::{
    Aspect, ConfigError, Edge, ParticipantId, Result, SceneBindings, ShelfCommand,
    ShelfController, ShelfDeps, ShelfError, ShelfEvent, ShelfLayout, SlotIndex, TriggerKey,
};
use dashmap::DashMap;
use tracing::debug;

use crate::network::{Broadcast, Network, ReplicaVars};
use crate::vault::MemoryVault;
use crate::world::{Presence, TestWorld};

/// Participant id for tests.
///
/// # Panics
///
/// When `id` is not positive.
pub fn participant(id: i32) -> ParticipantId {
    ParticipantId::new(id).unwrap_or_else(|| panic!("participant ids are positive, got {id}"))
}

pub struct Member {
    pub id: ParticipantId,
    pub world: Arc<TestWorld>,
    pub vars: Arc<ReplicaVars>,
    pub controller: ShelfController,
    log: Vec<ShelfCommand>,
    triggers: VecDeque<TriggerKey>,
}

impl Member {
    /// Every command this member's controller emitted, oldest first.
    pub fn log(&self) -> &[ShelfCommand] {
        &self.log
    }

    pub fn pending_triggers(&self) -> impl Iterator<Item = &TriggerKey> {
        self.triggers.iter()
    }

    fn record(&mut self, net: &Network, commands: Vec<ShelfCommand>) {
        for cmd in commands {
            match &cmd {
                ShelfCommand::RunTrigger {
                    key,
                    fast_forward: false,
                    ..
                } => self.triggers.push_back(*key),
                ShelfCommand::BroadcastBusy(busy) => net.send(Broadcast::Busy {
                    from: self.id,
                    busy: *busy,
                }),
                _ => {}
            }
            self.log.push(cmd);
        }
    }

    fn handle(&mut self, net: &Network, event: &ShelfEvent) -> Result<()> {
        let decision = self.controller.handle(event);
        self.record(net, decision.commands);
        decision.outcome
    }
}

pub struct Room {
    vault: Arc<MemoryVault>,
    net: Arc<Network>,
    presence: Arc<Presence>,
    flags: Arc<DashMap<String, bool>>,
    layout: ShelfLayout,
    scene: SceneBindings,
    owner: Option<ParticipantId>,
    members: Vec<Member>,
}

impl Room {
    pub fn new(vault: Arc<MemoryVault>) -> Self {
        let layout = ShelfLayout::default();
        Self {
            scene: SceneBindings::uniform(layout.len()),
            layout,
            vault,
            net: Network::new(),
            presence: Arc::new(Presence::default()),
            flags: Arc::new(DashMap::new()),
            owner: None,
            members: Vec::new(),
        }
    }

    /// Replace the layout; the scene is regenerated to match.
    pub fn with_layout(mut self, layout: ShelfLayout) -> Self {
        self.scene = SceneBindings::uniform(layout.len());
        self.layout = layout;
        self
    }

    pub fn with_scene(mut self, scene: SceneBindings) -> Self {
        self.scene = scene;
        self
    }

    /// The participant whose world this is.
    pub fn owned_by(mut self, owner: ParticipantId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn set_flag(&self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn vault(&self) -> &MemoryVault {
        &self.vault
    }

    pub fn scene(&self) -> &SceneBindings {
        &self.scene
    }

    pub fn join(&mut self, id: ParticipantId) -> std::result::Result<(), ConfigError> {
        self.presence.arrive();
        let world = Arc::new(
            TestWorld::new(id, self.presence.clone())
                .owned(self.owner == Some(id))
                .with_flags(self.flags.clone()),
        );
        let vars = self.net.join();
        let deps = ShelfDeps::new(self.vault.clone(), vars.clone(), world.clone());
        let controller = ShelfController::new(deps, self.layout.clone(), &self.scene)?;

        let mut member = Member {
            id,
            world,
            vars,
            controller,
            log: Vec::new(),
            triggers: VecDeque::new(),
        };
        let commands = member.controller.load();
        member.record(&self.net, commands);
        debug!(%id, "joined");
        self.members.push(member);
        self.pump();
        Ok(())
    }

    pub fn leave(&mut self, id: ParticipantId) {
        let before = self.members.len();
        self.members.retain(|member| member.id != id);
        if self.members.len() < before {
            self.presence.leave();
        }
    }

    pub fn member(&self, id: ParticipantId) -> Option<&Member> {
        self.members.iter().find(|member| member.id == id)
    }

    pub fn controller(&self, id: ParticipantId) -> Option<&ShelfController> {
        self.member(id).map(|member| &member.controller)
    }

    pub fn log(&self, id: ParticipantId) -> &[ShelfCommand] {
        self.member(id).map_or(&[][..], Member::log)
    }

    pub fn clear_logs(&mut self) {
        for member in &mut self.members {
            member.log.clear();
        }
    }

    /// Members whose controller believes it holds the operator token.
    pub fn operators(&self) -> Vec<ParticipantId> {
        self.members
            .iter()
            .filter(|member| member.controller.is_operator())
            .map(|member| member.id)
            .collect()
    }

    /// Handle `event` on one member without delivering broadcasts.
    pub fn send(&mut self, id: ParticipantId, event: ShelfEvent) -> Result<()> {
        let member = self
            .members
            .iter_mut()
            .find(|member| member.id == id)
            .ok_or_else(|| ShelfError::NotFound(format!("participant {id}")))?;
        member.handle(&self.net, &event)
    }

    /// [`send`](Self::send) followed by [`pump`](Self::pump).
    pub fn act(&mut self, id: ParticipantId, event: ShelfEvent) -> Result<()> {
        let outcome = self.send(id, event);
        self.pump();
        outcome
    }

    /// Deliver every queued broadcast, including ones raised while delivering.
    pub fn pump(&mut self) {
        while let Some(broadcast) = self.net.deliver_next() {
            for member in &mut self.members {
                let event = match broadcast {
                    Broadcast::Var { var, .. } => ShelfEvent::ReplicatedChanged { var },
                    Broadcast::Busy { from, .. } if from == member.id => continue,
                    Broadcast::Busy { busy, .. } => ShelfEvent::BusyChanged { busy },
                };
                // Broadcast handlers never fail; denials are already logged.
                let _ = member.handle(&self.net, &event);
            }
        }
    }

    /// Finish the oldest live trigger of `id`. `None` when nothing is playing.
    pub fn complete_next(&mut self, id: ParticipantId) -> Option<Result<()>> {
        let key = self
            .members
            .iter_mut()
            .find(|member| member.id == id)?
            .triggers
            .pop_front()?;
        Some(self.act(id, ShelfEvent::TriggerCompleted(key)))
    }

    /// Finish triggers until `id` has none left. Returns how many completed.
    pub fn settle(&mut self, id: ParticipantId) -> usize {
        let mut completed = 0;
        while self.complete_next(id).is_some() {
            completed += 1;
        }
        completed
    }

    /// Rebuild `id`'s books from storage.
    pub fn reload(&mut self, id: ParticipantId) {
        if let Some(member) = self.members.iter_mut().find(|member| member.id == id) {
            let commands = member.controller.load();
            member.record(&self.net, commands);
        }
    }

    /// Pick the shelf and finish walking up to it.
    pub fn engage(&mut self, id: ParticipantId) -> Result<()> {
        self.act(id, ShelfEvent::EntryPicked { participant: id })?;
        self.act(id, ShelfEvent::SeekCompleted { participant: id })
    }

    /// Click the object of `aspect` in `slot`.
    pub fn pick(&mut self, id: ParticipantId, slot: SlotIndex, aspect: Aspect) -> Result<()> {
        let object = self
            .scene
            .object_name(slot, aspect)
            .ok_or_else(|| ShelfError::NotFound(format!("object for {slot}")))?
            .to_string();
        let event = match aspect {
            Aspect::Shown => ShelfEvent::BookPicked {
                participant: id,
                object,
            },
            Aspect::Locked => ShelfEvent::LockPicked {
                participant: id,
                object,
            },
            Aspect::Tray => ShelfEvent::TrayPicked {
                participant: id,
                object,
            },
        };
        self.act(id, event)
    }

    /// Live triggers `id` has run for `slot` and `aspect`, by edge.
    pub fn triggers_run(
        &self,
        id: ParticipantId,
        slot: SlotIndex,
        aspect: Aspect,
    ) -> Vec<Edge> {
        self.log(id)
            .iter()
            .filter_map(|cmd| match cmd {
                ShelfCommand::RunTrigger {
                    key,
                    fast_forward: false,
                    ..
                } if key.slot == slot && key.aspect == aspect => Some(key.edge),
                _ => None,
            })
            .collect()
    }
}
