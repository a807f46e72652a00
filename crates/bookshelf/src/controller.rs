//! The shelf controller.
//!
//! Holds every piece of per-shelf session state in one place: the book
//! table, the three rows of item states, the cached operator token, the
//! in-flight animation counter and the slot currently presented.
//!
//! ```text
//!          entry (claim ok)          seek done
//!  Idle ───────────────────► Engaging ─────────► Operating
//!   ▲                           │                    │
//!   │      seek done, not       │    exit / key /    │
//!   ├──────── operator ◄────────┘    region exit     │
//!   │                                                ▼
//!   └──────────────── release token ◄──────── Disengaging
//! ```
//!
//! A foreign holder that settles on the replicated vars sends `Engaging` or
//! `Operating` back to `Idle` without touching the token.
//!
//! Inside `Operating` each selection runs
//! `select → (unlock →) present → dialog → shelve (→ lock) → select(none)`,
//! one notification at a time.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::book::BookTable;
use crate::deps::ShelfDeps;
use crate::dispatch;
use crate::error::{ConfigError, Denial, Result, ShelfError};
use crate::event::{DialogAction, ShelfCommand, ShelfEvent};
use crate::item_state::{Aspect, ItemState, Playback};
use crate::layout::{ShelfLayout, SlotIndex};
use crate::operator::{Arbiter, ParticipantId, SharedVar, TokenChange};
use crate::scene::SceneBindings;

/// Local view of where this client is in a shelf session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Engaging,
    Operating,
    Disengaging,
}

/// What the controller decided for one event.
#[derive(Debug)]
pub struct Decision {
    /// Commands to execute, in order. Present even when `outcome` is an error.
    pub commands: Vec<ShelfCommand>,
    pub outcome: Result<()>,
}

pub struct ShelfController {
    deps: ShelfDeps,
    layout: Arc<ShelfLayout>,
    names: HashMap<String, SlotIndex>,
    books: BookTable,
    shown: Vec<ItemState>,
    locks: Vec<ItemState>,
    trays: Vec<ItemState>,
    arbiter: Arbiter,
    phase: Phase,
    pending_animations: u32,
    showing: Option<SlotIndex>,
    pending_archive: Option<SlotIndex>,
    outbox: Vec<ShelfCommand>,
}

impl std::fmt::Debug for ShelfController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShelfController")
            .field("phase", &self.phase)
            .field("holder", &self.arbiter.holder())
            .field("pending_animations", &self.pending_animations)
            .field("showing", &self.showing)
            .finish()
    }
}

impl ShelfController {
    /// Build the controller and its item states. Nothing is read from storage
    /// until [`load`](Self::load).
    pub fn new(
        deps: ShelfDeps,
        layout: ShelfLayout,
        scene: &SceneBindings,
    ) -> std::result::Result<Self, ConfigError> {
        layout.validate()?;
        if scene.len() != layout.len() {
            return Err(ConfigError::SlotCountMismatch {
                scene: scene.len(),
                layout: layout.len(),
            });
        }

        let layout = Arc::new(layout);
        let local = deps.world.local_participant();
        Ok(Self {
            books: BookTable::empty(deps.store.clone(), deps.world.clone(), layout.clone()),
            names: scene.name_table(),
            shown: scene.item_states(Aspect::Shown),
            locks: scene.item_states(Aspect::Locked),
            trays: scene.item_states(Aspect::Tray),
            arbiter: Arbiter::new(local),
            phase: Phase::Idle,
            pending_animations: 0,
            showing: None,
            pending_archive: None,
            outbox: Vec::new(),
            deps,
            layout,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_operator(&self) -> bool {
        self.arbiter.is_operator()
    }

    pub fn holder(&self) -> Option<ParticipantId> {
        self.arbiter.holder()
    }

    pub fn pending_animations(&self) -> u32 {
        self.pending_animations
    }

    pub fn showing(&self) -> Option<SlotIndex> {
        self.showing
    }

    pub fn books(&self) -> &BookTable {
        &self.books
    }

    pub fn layout(&self) -> &ShelfLayout {
        &self.layout
    }

    pub fn item_state(&self, slot: SlotIndex, aspect: Aspect) -> Option<&ItemState> {
        self.row(aspect).get(slot.0)
    }

    /// Adopt the replicated operator token and rebuild every book from
    /// storage. Session state from a previous load is discarded.
    pub fn load(&mut self) -> Vec<ShelfCommand> {
        self.outbox.push(ShelfCommand::SetEntryEnabled(true));
        self.arbiter.observe(self.deps.vars.as_ref());
        info!(holder = ?self.arbiter.holder(), "loading shelf");

        self.showing = None;
        self.pending_archive = None;
        self.pending_animations = 0;
        self.update_books();
        mem::take(&mut self.outbox)
    }

    /// Route one notification through the dispatch table.
    pub fn handle(&mut self, event: &ShelfEvent) -> Decision {
        let kind = event.kind();
        let outcome = match dispatch::route(kind) {
            Some(route) => route
                .check(self.arbiter.is_operator(), self.pending_animations)
                .and_then(|()| (route.handler)(self, event)),
            None => Ok(()),
        };

        match &outcome {
            Ok(()) => {}
            Err(err) if err.is_denial() => debug!(?kind, %err, "event ignored"),
            Err(err @ ShelfError::EmptySlot(_)) => {
                warn!(?kind, %err, "slot has no book, scene and layout disagree")
            }
            Err(err) => warn!(?kind, %err, "event abandoned"),
        }

        Decision {
            commands: mem::take(&mut self.outbox),
            outcome,
        }
    }

    fn update_books(&mut self) {
        for aspect in Aspect::ALL {
            self.outbox.push(ShelfCommand::DisableActivators(aspect));
            for state in self.row_mut(aspect) {
                state.note_activator(false);
            }
        }

        self.books = BookTable::load(
            self.deps.store.clone(),
            self.deps.world.clone(),
            self.layout.clone(),
        );
        let own_world = self.deps.world.in_own_world();

        for slot in self.layout.slots() {
            let Some(book) = self.books.get(slot) else {
                self.outbox.push(ShelfCommand::HideSlot(slot));
                continue;
            };
            let (unlockable, deletable) = (book.unlockable(), book.deletable());
            let locked = self.books.locked(slot).unwrap_or(true);
            let volatile = self.books.volatile(slot).unwrap_or(false);

            let restore_lock = self.locks[slot.0].set_state(!locked, Playback::RESTORE);
            let restore_tray = self.trays[slot.0].set_state(volatile, Playback::RESTORE);
            self.outbox.extend(restore_lock);
            self.outbox.extend(restore_tray);

            if own_world {
                if unlockable {
                    let cmd = self.locks[slot.0].set_activator(true);
                    self.outbox.push(cmd);
                }
                if deletable {
                    let cmd = self.trays[slot.0].set_activator(true);
                    self.outbox.push(cmd);
                }
            }
            if !volatile && (own_world || !locked) {
                let cmd = self.shown[slot.0].set_activator(true);
                self.outbox.push(cmd);
            }
        }
    }

    // ------------------------------------------------------------------
    // Engage / disengage
    // ------------------------------------------------------------------

    pub(crate) fn on_entry(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::EntryPicked { participant } = *event else {
            return Ok(());
        };
        if participant != self.arbiter.local() {
            debug!(%participant, "entry for another participant");
            return Ok(());
        }
        if self.phase != Phase::Idle {
            debug!(phase = ?self.phase, "entry while already engaged");
            return Ok(());
        }

        let others_present = self.deps.world.others_present();
        if !self
            .arbiter
            .try_claim(participant, self.deps.vars.as_ref(), others_present)
        {
            info!(%participant, holder = ?self.arbiter.holder(), "shelf is in use");
            return Ok(());
        }

        self.phase = Phase::Engaging;
        self.pending_animations = 0;
        self.outbox.extend([
            ShelfCommand::BroadcastBusy(true),
            ShelfCommand::SetCollisionExclusive(true),
            ShelfCommand::BeginSeek { participant },
        ]);
        Ok(())
    }

    pub(crate) fn on_seek_completed(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::SeekCompleted { participant } = *event else {
            return Ok(());
        };
        if participant != self.arbiter.local() || self.phase != Phase::Engaging {
            return Ok(());
        }

        if !self.arbiter.is_operator() {
            // Lost the claim race while walking up.
            info!(%participant, holder = ?self.arbiter.holder(), "claim lost during seek");
            self.step_back();
            return Ok(());
        }

        info!(%participant, "engaging shelf");
        self.phase = Phase::Operating;
        self.outbox.extend([
            ShelfCommand::EnterShelfView,
            ShelfCommand::SetEntryEnabled(false),
            ShelfCommand::SetExitEnabled(true),
        ]);
        Ok(())
    }

    pub(crate) fn on_exit(&mut self, _event: &ShelfEvent) -> Result<()> {
        self.disengage();
        Ok(())
    }

    pub(crate) fn on_region_exited(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::RegionExited { participant } = *event else {
            return Ok(());
        };
        if Some(participant) != self.arbiter.holder() {
            debug!(%participant, "region exit by someone other than the operator");
            return Ok(());
        }
        self.disengage();
        Ok(())
    }

    pub(crate) fn on_control_key(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::ControlKey { key } = *event else {
            return Ok(());
        };
        if key.disengages() && self.phase != Phase::Idle {
            self.disengage();
        }
        Ok(())
    }

    fn disengage(&mut self) {
        info!(operator = ?self.arbiter.holder(), "disengaging shelf");
        self.phase = Phase::Disengaging;

        if let Some(slot) = self.showing.take() {
            self.run(slot, Aspect::Shown, false);
        }
        self.pending_archive = None;
        self.pending_animations = 0;

        self.arbiter.release(self.deps.vars.as_ref());
        self.outbox.extend([
            ShelfCommand::BroadcastBusy(false),
            ShelfCommand::SetCollisionExclusive(false),
            ShelfCommand::LeaveShelfView,
            ShelfCommand::SetExitEnabled(false),
            ShelfCommand::SetEntryEnabled(true),
        ]);
        self.phase = Phase::Idle;
    }

    /// Leave the shelf locally without touching the replicated token, which
    /// now belongs to someone else.
    fn step_back(&mut self) {
        if let Some(slot) = self.showing.take() {
            self.run(slot, Aspect::Shown, false);
        }
        if self.phase == Phase::Operating {
            self.outbox.extend([
                ShelfCommand::LeaveShelfView,
                ShelfCommand::SetExitEnabled(false),
            ]);
        }
        self.pending_archive = None;
        self.pending_animations = 0;
        self.phase = Phase::Idle;
        self.outbox.extend([
            ShelfCommand::SetCollisionExclusive(false),
            ShelfCommand::SetEntryEnabled(true),
        ]);
    }

    // ------------------------------------------------------------------
    // Books
    // ------------------------------------------------------------------

    pub(crate) fn on_book_picked(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::BookPicked {
            participant,
            object,
        } = event
        else {
            return Ok(());
        };
        let slot = self.picked_slot(*participant, object)?;
        let locked = self.books.locked(slot)?;

        self.showing = Some(slot);
        if locked && self.run(slot, Aspect::Locked, true) {
            debug!(%slot, "unlocking before present");
            self.pending_animations += 1;
            return Ok(());
        }
        if self.run(slot, Aspect::Shown, true) {
            self.pending_animations += 1;
            Ok(())
        } else {
            self.open_dialog(slot)
        }
    }

    pub(crate) fn on_open_lock_completed(&mut self, _event: &ShelfEvent) -> Result<()> {
        match self.showing {
            Some(slot) => {
                if !self.run(slot, Aspect::Shown, true) {
                    return self.open_dialog(slot);
                }
            }
            None => self.finish_animation("open lock"),
        }
        Ok(())
    }

    pub(crate) fn on_present_completed(&mut self, _event: &ShelfEvent) -> Result<()> {
        match self.showing {
            Some(slot) => self.open_dialog(slot),
            None => {
                debug!("present completed with no book chosen");
                Ok(())
            }
        }
    }

    pub(crate) fn on_book_dialog(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::BookDialog(action) = event else {
            return Ok(());
        };
        let Some(slot) = self.showing else {
            debug!("dialog reply with no book chosen");
            return Ok(());
        };

        match action {
            DialogAction::Shelve => {
                self.run(slot, Aspect::Shown, false);
                Ok(())
            }
            DialogAction::Link {
                spawn_title,
                spawn_name,
            } => {
                // Disengaging also puts the book back.
                self.disengage();
                let request = self.books.resolve_link(slot, spawn_title, spawn_name)?;
                info!(destination = %request.destination, rule = ?request.linking_rule, "linking");
                self.outbox.push(ShelfCommand::Link(request));
                Ok(())
            }
        }
    }

    pub(crate) fn on_shelve_completed(&mut self, _event: &ShelfEvent) -> Result<()> {
        let Some(slot) = self.showing else {
            return Ok(());
        };
        let locked = self.books.locked(slot)?;
        self.showing = None;

        if !(locked && self.run(slot, Aspect::Locked, false)) {
            self.finish_animation("shelve");
        }
        Ok(())
    }

    pub(crate) fn on_animation_finished(&mut self, event: &ShelfEvent) -> Result<()> {
        self.finish_animation(&format!("{:?}", event.kind()));
        Ok(())
    }

    fn open_dialog(&mut self, slot: SlotIndex) -> Result<()> {
        let book = self.books.book(slot)?;
        self.outbox.push(ShelfCommand::OpenBookDialog {
            destination: book.destination().to_string(),
            slot,
            participant: self.arbiter.local(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks and trays
    // ------------------------------------------------------------------

    pub(crate) fn on_lock_picked(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::LockPicked {
            participant,
            object,
        } = event
        else {
            return Ok(());
        };
        let slot = self.picked_slot(*participant, object)?;
        let unlocked = self.locks[slot.0].state();

        for (slot, state) in self.books.on_lock(slot, !unlocked)? {
            if self.run(slot, Aspect::Locked, state) {
                self.pending_animations += 1;
            }
        }
        Ok(())
    }

    pub(crate) fn on_tray_picked(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::TrayPicked {
            participant,
            object,
        } = event
        else {
            return Ok(());
        };
        let slot = self.picked_slot(*participant, object)?;
        let book = self.books.book(slot)?;
        if !book.deletable() {
            return Err(ShelfError::PreconditionDenied {
                event: event.kind(),
                reason: Denial::Capability("deletable"),
            });
        }

        if self.books.volatile(slot)? {
            return self.change_volatility(slot, false);
        }

        let message_key = book.delete_message_key(&self.layout).to_string();
        debug!(%slot, %message_key, "asking before archiving");
        self.pending_archive = Some(slot);
        self.outbox
            .push(ShelfCommand::RequestConfirmation { message_key });
        Ok(())
    }

    pub(crate) fn on_confirmation(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::ConfirmationAnswered { accepted } = *event else {
            return Ok(());
        };
        let Some(slot) = self.pending_archive.take() else {
            return Ok(());
        };
        if !accepted {
            debug!(%slot, "archive declined");
            return Ok(());
        }
        // Checked here rather than on the route so a decline still clears the prompt.
        let reason = if !self.arbiter.is_operator() {
            Some(Denial::NotOperator)
        } else if self.pending_animations > 0 {
            Some(Denial::AnimationPending)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ShelfError::PreconditionDenied {
                event: event.kind(),
                reason,
            });
        }
        self.change_volatility(slot, true)
    }

    /// Persist the archive flag first, then animate every affected tray.
    fn change_volatility(&mut self, slot: SlotIndex, archived: bool) -> Result<()> {
        for (slot, state) in self.books.on_tray(slot, archived)? {
            let destination = self.books.book(slot)?.destination().to_string();

            if self.run(slot, Aspect::Tray, state) {
                self.pending_animations += 1;
            }
            let cmd = self.locks[slot.0].set_activator(!state);
            self.outbox.push(cmd);
            self.outbox.push(ShelfCommand::AnnounceArchived {
                destination,
                archived: state,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Broadcasts
    // ------------------------------------------------------------------

    pub(crate) fn on_busy_changed(&mut self, event: &ShelfEvent) -> Result<()> {
        // A stale "free" broadcast must not unseat a local session.
        if let ShelfEvent::BusyChanged { busy: false } = event {
            if self.phase == Phase::Idle {
                self.arbiter.clear();
                self.outbox.push(ShelfCommand::SetEntryEnabled(true));
            }
        }
        Ok(())
    }

    /// The latest broadcast decides the holder. While a local session is
    /// active, values older than the local claim are skipped and a released
    /// token is treated as in flight; only a settled foreign holder ends the
    /// session.
    pub(crate) fn on_replicated_changed(&mut self, event: &ShelfEvent) -> Result<()> {
        let ShelfEvent::ReplicatedChanged { var } = *event else {
            return Ok(());
        };
        let vars = self.deps.vars.as_ref();
        if var == SharedVar::HolderId {
            self.arbiter.note_holder_change(vars);
        }
        let local = self.arbiter.local();

        match self.phase {
            Phase::Engaging | Phase::Operating => match Arbiter::replicated_holder(vars) {
                None => debug!(phase = ?self.phase, "token release seen mid-session, waiting"),
                Some(holder) if holder == local => {
                    self.arbiter.change(holder.as_wire());
                }
                Some(holder) if !self.arbiter.settled() => {
                    debug!(%holder, "older claim delivered ahead of ours");
                }
                Some(holder) => {
                    warn!(%holder, "operator token taken over");
                    self.arbiter.change(holder.as_wire());
                    self.step_back();
                }
            },
            Phase::Idle | Phase::Disengaging => match self.arbiter.observe(vars) {
                TokenChange::Released => {
                    self.outbox.push(ShelfCommand::SetEntryEnabled(true));
                }
                TokenChange::Held(holder) if holder == local && self.arbiter.settled() => {
                    // Entering again resumes the claim without another write.
                    info!("holding the token with no session");
                    self.outbox.push(ShelfCommand::SetEntryEnabled(true));
                }
                TokenChange::Held(_) => {}
            },
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn picked_slot(&self, participant: ParticipantId, object: &str) -> Result<SlotIndex> {
        if participant != self.arbiter.local() {
            return Err(ShelfError::not_found(format!(
                "pick by remote participant {participant}"
            )));
        }
        let slot = self
            .names
            .get(object)
            .copied()
            .ok_or_else(|| ShelfError::not_found(format!("slot for object {object}")))?;
        self.books.book(slot)?;
        Ok(slot)
    }

    /// Drive one item state live. Returns whether a trigger was issued.
    fn run(&mut self, slot: SlotIndex, aspect: Aspect, state: bool) -> bool {
        let Some(item) = self.row_mut(aspect).get_mut(slot.0) else {
            return false;
        };
        match item.set_state(state, Playback::LIVE) {
            Some(cmd) => {
                self.outbox.push(cmd);
                true
            }
            None => false,
        }
    }

    fn finish_animation(&mut self, what: &str) {
        self.pending_animations = self.pending_animations.saturating_sub(1);
        debug!(what, pending = self.pending_animations, "animation finished");
    }

    fn row(&self, aspect: Aspect) -> &[ItemState] {
        match aspect {
            Aspect::Shown => &self.shown,
            Aspect::Locked => &self.locks,
            Aspect::Tray => &self.trays,
        }
    }

    fn row_mut(&mut self, aspect: Aspect) -> &mut Vec<ItemState> {
        match aspect {
            Aspect::Shown => &mut self.shown,
            Aspect::Locked => &mut self.locks,
            Aspect::Tray => &mut self.trays,
        }
    }
}
