//! Controller tests against single-participant fakes.
//!
//! Cross-participant behaviour lives in the `bookshelf-testing` crate; these
//! cover what one controller decides on its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::controller::{Phase, ShelfController};
use crate::deps::{ShelfDeps, WorldView};
use crate::error::{ConfigError, Denial, ShelfError, StoreError};
use crate::event::{DialogAction, ShelfCommand, ShelfEvent};
use crate::item_state::{Aspect, Edge, TriggerKey};
use crate::layout::{ShelfLayout, SlotIndex};
use crate::operator::{ParticipantId, ReplicatedVars, SharedVar, NO_HOLDER};
use crate::scene::SceneBindings;
use crate::store::{
    DestinationInfo, FolderId, LinkRecord, LinkRecordId, PersistentStore, ScalarId,
};

// =============================================================================
// Fakes
// =============================================================================

/// Bookshelf folder only; every other folder is empty.
#[derive(Default)]
struct ShelfStore {
    links: Mutex<Vec<LinkRecord>>,
}

impl ShelfStore {
    fn with(records: &[(&str, bool, bool)]) -> Arc<Self> {
        let links = records
            .iter()
            .map(|(name, locked, volatile)| LinkRecord {
                destination: DestinationInfo::named(*name),
                locked: *locked,
                volatile: *volatile,
                spawn_points: Vec::new(),
            })
            .collect();
        Arc::new(Self {
            links: Mutex::new(links),
        })
    }
}

impl PersistentStore for ShelfStore {
    fn folder(&self, name: &str) -> FolderId {
        FolderId(u64::from(name == "Bookshelf"))
    }
    fn scalar(&self, _folder: FolderId, _name: &str, _default: Option<&str>) -> Option<ScalarId> {
        None
    }
    fn read_scalar(&self, _scalar: ScalarId) -> Option<String> {
        None
    }
    fn write_scalar(&self, scalar: ScalarId, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::MissingNode(format!("{scalar:?}")))
    }
    fn link_records(&self, folder: FolderId) -> Vec<LinkRecordId> {
        if folder.0 == 0 {
            return Vec::new();
        }
        let count = self.links.lock().unwrap().len() as u64;
        (0..count).map(LinkRecordId).collect()
    }
    fn link_record(&self, record: LinkRecordId) -> Option<LinkRecord> {
        self.links.lock().unwrap().get(record.0 as usize).cloned()
    }
    fn set_link_record(
        &self,
        record: LinkRecordId,
        locked: Option<bool>,
        volatile: Option<bool>,
    ) -> Result<(), StoreError> {
        let mut links = self.links.lock().unwrap();
        let link = links
            .get_mut(record.0 as usize)
            .ok_or_else(|| StoreError::MissingNode(format!("{record:?}")))?;
        if let Some(locked) = locked {
            link.locked = locked;
        }
        if let Some(volatile) = volatile {
            link.volatile = volatile;
        }
        Ok(())
    }
}

/// Replicated vars with no network: writes are only ever local.
#[derive(Default)]
struct LocalVars(Mutex<HashMap<SharedVar, i32>>);

impl LocalVars {
    fn held_by(id: i32) -> Arc<Self> {
        let vars = Self::default();
        vars.set(SharedVar::Operated, 1);
        vars.set(SharedVar::HolderId, id);
        Arc::new(vars)
    }
}

impl ReplicatedVars for LocalVars {
    fn get(&self, var: SharedVar) -> i32 {
        let default = match var {
            SharedVar::Operated => 0,
            SharedVar::HolderId => NO_HOLDER,
        };
        *self.0.lock().unwrap().get(&var).unwrap_or(&default)
    }
    fn set(&self, var: SharedVar, value: i32) {
        self.0.lock().unwrap().insert(var, value);
    }
}

struct Home {
    others: bool,
}

impl WorldView for Home {
    fn local_participant(&self) -> ParticipantId {
        me()
    }
    fn in_own_world(&self) -> bool {
        true
    }
    fn others_present(&self) -> bool {
        self.others
    }
    fn flag(&self, _name: &str) -> bool {
        false
    }
    fn current_world(&self) -> DestinationInfo {
        DestinationInfo::named("Personal")
    }
}

fn me() -> ParticipantId {
    ParticipantId::new(3).unwrap()
}

const TELEDAHN: SlotIndex = SlotIndex(7);
const GIRA: SlotIndex = SlotIndex(9);

fn controller_with(
    store: Arc<ShelfStore>,
    vars: Arc<LocalVars>,
    others: bool,
    scene: SceneBindings,
) -> ShelfController {
    let deps = ShelfDeps::new(store, vars, Arc::new(Home { others }));
    let mut controller = ShelfController::new(deps, ShelfLayout::default(), &scene).unwrap();
    controller.load();
    controller
}

fn controller() -> ShelfController {
    controller_with(
        ShelfStore::with(&[("Teledahn", true, false), ("Gira", false, false)]),
        Arc::new(LocalVars::default()),
        false,
        SceneBindings::uniform(36),
    )
}

fn engaged() -> ShelfController {
    let mut controller = controller();
    controller
        .handle(&ShelfEvent::EntryPicked { participant: me() })
        .outcome
        .unwrap();
    controller
        .handle(&ShelfEvent::SeekCompleted { participant: me() })
        .outcome
        .unwrap();
    controller
}

fn pick_book(slot: SlotIndex) -> ShelfEvent {
    ShelfEvent::BookPicked {
        participant: me(),
        object: format!("Book{:02}", slot.0),
    }
}

// =============================================================================
// Construction and load
// =============================================================================

#[test]
fn scene_must_match_layout() {
    let deps = ShelfDeps::new(
        ShelfStore::with(&[]),
        Arc::new(LocalVars::default()),
        Arc::new(Home { others: false }),
    );
    let err = ShelfController::new(deps, ShelfLayout::default(), &SceneBindings::uniform(12))
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigError::SlotCountMismatch {
            scene: 12,
            layout: 36
        }
    ));
}

#[test]
fn load_disables_everything_before_enabling_activators() {
    let deps = ShelfDeps::new(
        ShelfStore::with(&[("Gira", false, false)]),
        Arc::new(LocalVars::default()),
        Arc::new(Home { others: false }),
    );
    let mut controller =
        ShelfController::new(deps, ShelfLayout::default(), &SceneBindings::uniform(36)).unwrap();
    let commands = controller.load();

    assert_eq!(commands[0], ShelfCommand::SetEntryEnabled(true));
    let last_disable = commands
        .iter()
        .rposition(|c| matches!(c, ShelfCommand::DisableActivators(_)))
        .unwrap();
    let first_enable = commands
        .iter()
        .position(|c| matches!(c, ShelfCommand::SetActivator { enabled: true, .. }))
        .unwrap();
    assert!(last_disable < first_enable);
    assert!(controller
        .item_state(GIRA, Aspect::Shown)
        .unwrap()
        .activator_enabled());
    assert!(commands.contains(&ShelfCommand::HideSlot(SlotIndex(8))));
}

#[test]
fn load_adopts_replicated_holder() {
    let controller = controller_with(
        ShelfStore::with(&[]),
        LocalVars::held_by(11),
        true,
        SceneBindings::uniform(36),
    );
    assert_eq!(controller.holder(), ParticipantId::new(11));
    assert!(!controller.is_operator());
}

// =============================================================================
// Claiming
// =============================================================================

#[test]
fn solo_claim_ignores_a_stale_holder() {
    let mut controller = controller_with(
        ShelfStore::with(&[]),
        LocalVars::held_by(11),
        false,
        SceneBindings::uniform(36),
    );
    let decision = controller.handle(&ShelfEvent::EntryPicked { participant: me() });

    assert!(decision.outcome.is_ok());
    assert!(controller.is_operator());
    assert_eq!(controller.phase(), Phase::Engaging);
    assert!(decision
        .commands
        .contains(&ShelfCommand::BeginSeek { participant: me() }));
}

#[test]
fn contended_claim_respects_the_holder() {
    let mut controller = controller_with(
        ShelfStore::with(&[]),
        LocalVars::held_by(11),
        true,
        SceneBindings::uniform(36),
    );
    let decision = controller.handle(&ShelfEvent::EntryPicked { participant: me() });

    assert!(decision.outcome.is_ok());
    assert!(decision.commands.is_empty());
    assert_eq!(controller.phase(), Phase::Idle);
}

fn holder_changed() -> ShelfEvent {
    ShelfEvent::ReplicatedChanged {
        var: SharedVar::HolderId,
    }
}

/// Contended controller that has claimed and walked up; its claim has not
/// echoed back yet.
fn operating_among_others(vars: &Arc<LocalVars>) -> ShelfController {
    let mut controller = controller_with(
        ShelfStore::with(&[]),
        vars.clone(),
        true,
        SceneBindings::uniform(36),
    );
    controller.handle(&ShelfEvent::EntryPicked { participant: me() });
    controller.handle(&ShelfEvent::SeekCompleted { participant: me() });
    assert_eq!(controller.phase(), Phase::Operating);
    controller
}

#[test]
fn losing_the_token_while_operating_steps_back() {
    let vars = Arc::new(LocalVars::default());
    let mut controller = operating_among_others(&vars);
    controller.handle(&holder_changed());

    vars.set(SharedVar::HolderId, 11);
    let decision = controller.handle(&holder_changed());

    assert_eq!(controller.phase(), Phase::Idle);
    assert_eq!(controller.holder(), ParticipantId::new(11));
    assert!(decision.commands.contains(&ShelfCommand::LeaveShelfView));
    // The token is someone else's now; stepping back must not release it.
    assert_eq!(vars.get(SharedVar::HolderId), 11);
}

#[test]
fn holders_older_than_our_claim_are_skipped() {
    let vars = Arc::new(LocalVars::default());
    let mut controller = operating_among_others(&vars);

    // A racing claim lands before ours echoes back.
    vars.set(SharedVar::HolderId, 11);
    let decision = controller.handle(&holder_changed());
    assert!(decision.commands.is_empty());
    assert_eq!(controller.phase(), Phase::Operating);
    assert!(controller.is_operator());

    vars.set(SharedVar::HolderId, me().as_wire());
    controller.handle(&holder_changed());
    assert!(controller.is_operator());
}

#[test]
fn release_seen_mid_session_is_waited_out() {
    let vars = Arc::new(LocalVars::default());
    let mut controller = operating_among_others(&vars);
    controller.handle(&holder_changed());

    vars.set(SharedVar::Operated, 0);
    vars.set(SharedVar::HolderId, NO_HOLDER);
    let decision = controller.handle(&holder_changed());

    assert!(decision.commands.is_empty());
    assert_eq!(controller.phase(), Phase::Operating);
    assert!(controller.is_operator());
}

#[test]
fn token_settling_on_an_idle_participant_is_kept() {
    let vars = Arc::new(LocalVars::default());
    let mut controller = controller_with(
        ShelfStore::with(&[]),
        vars.clone(),
        true,
        SceneBindings::uniform(36),
    );

    vars.set(SharedVar::Operated, 1);
    vars.set(SharedVar::HolderId, me().as_wire());
    let decision = controller.handle(&holder_changed());

    assert!(controller.is_operator());
    assert_eq!(vars.get(SharedVar::HolderId), me().as_wire());
    assert!(!decision.commands.contains(&ShelfCommand::BroadcastBusy(false)));
    assert!(decision.commands.contains(&ShelfCommand::SetEntryEnabled(true)));

    let decision = controller.handle(&ShelfEvent::EntryPicked { participant: me() });
    assert!(decision
        .commands
        .contains(&ShelfCommand::BeginSeek { participant: me() }));
}

#[test]
fn stale_free_broadcast_does_not_unseat_the_operator() {
    let mut controller = engaged();
    controller.handle(&ShelfEvent::BusyChanged { busy: false });
    assert!(controller.is_operator());
}

// =============================================================================
// Picks
// =============================================================================

#[test]
fn denied_events_emit_nothing() {
    let mut controller = controller();
    let decision = controller.handle(&pick_book(GIRA));

    assert!(decision.commands.is_empty());
    assert!(matches!(
        decision.outcome,
        Err(ShelfError::PreconditionDenied {
            reason: Denial::NotOperator,
            ..
        })
    ));
}

#[test]
fn picking_an_empty_slot_is_reported() {
    let mut controller = engaged();
    let decision = controller.handle(&pick_book(SlotIndex(8)));
    assert!(matches!(decision.outcome, Err(ShelfError::EmptySlot(SlotIndex(8)))));
    assert_eq!(controller.pending_animations(), 0);
}

#[test]
fn unknown_objects_are_not_found() {
    let mut controller = engaged();
    let decision = controller.handle(&ShelfEvent::TrayPicked {
        participant: me(),
        object: "Window01".into(),
    });
    assert!(matches!(decision.outcome, Err(ShelfError::NotFound(_))));
}

#[test]
fn missing_present_trigger_opens_dialog_at_once() {
    let mut scene = SceneBindings::uniform(36);
    scene
        .unbound
        .insert(TriggerKey::new(GIRA, Aspect::Shown, Edge::On));
    let mut controller = controller_with(
        ShelfStore::with(&[("Gira", false, false)]),
        Arc::new(LocalVars::default()),
        false,
        scene,
    );
    controller.handle(&ShelfEvent::EntryPicked { participant: me() });
    controller.handle(&ShelfEvent::SeekCompleted { participant: me() });

    let decision = controller.handle(&pick_book(GIRA));

    assert_eq!(controller.pending_animations(), 0);
    assert!(decision
        .commands
        .iter()
        .any(|c| matches!(c, ShelfCommand::OpenBookDialog { slot, .. } if *slot == GIRA)));
}

#[test]
fn shelving_a_locked_book_closes_its_lock() {
    let mut controller = engaged();
    controller.handle(&pick_book(TELEDAHN));
    controller.handle(&ShelfEvent::TriggerCompleted(TriggerKey::new(
        TELEDAHN,
        Aspect::Locked,
        Edge::On,
    )));
    controller.handle(&ShelfEvent::TriggerCompleted(TriggerKey::new(
        TELEDAHN,
        Aspect::Shown,
        Edge::On,
    )));
    controller.handle(&ShelfEvent::BookDialog(DialogAction::Shelve));
    let decision = controller.handle(&ShelfEvent::TriggerCompleted(TriggerKey::new(
        TELEDAHN,
        Aspect::Shown,
        Edge::Off,
    )));

    assert!(decision.commands.iter().any(|c| matches!(
        c,
        ShelfCommand::RunTrigger { key, .. }
            if *key == TriggerKey::new(TELEDAHN, Aspect::Locked, Edge::Off)
    )));
    assert_eq!(controller.pending_animations(), 1);
    assert_eq!(controller.showing(), None);
}

#[test]
fn stray_completions_never_underflow() {
    let mut controller = engaged();
    for _ in 0..3 {
        controller.handle(&ShelfEvent::TriggerCompleted(TriggerKey::new(
            GIRA,
            Aspect::Tray,
            Edge::On,
        )));
    }
    assert_eq!(controller.pending_animations(), 0);
}
