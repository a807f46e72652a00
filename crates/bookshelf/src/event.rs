//! Events (facts arriving from the runtime) and commands (intent sent back).
//!
//! The controller never performs presentation work itself. It reads an
//! event, mutates its own state and storage, and answers with commands for
//! the runtime to execute.

use serde::{Deserialize, Serialize};

use crate::item_state::{Aspect, Edge, TriggerKey};
use crate::layout::SlotIndex;
use crate::link::LinkRequest;
use crate::operator::{ParticipantId, SharedVar};

/// Movement and mode keys that can end a shelf session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlKey {
    ExitMode,
    MoveForward,
    MoveBackward,
    RotateLeft,
    RotateRight,
    Jump,
}

impl ControlKey {
    /// Keys that walk the operator away from the shelf.
    pub fn disengages(self) -> bool {
        matches!(
            self,
            ControlKey::ExitMode
                | ControlKey::MoveBackward
                | ControlKey::RotateLeft
                | ControlKey::RotateRight
        )
    }
}

/// Reply from the linking-book dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogAction {
    /// Put the book back.
    Shelve,
    /// Link through the book to the given spawn point.
    Link { spawn_title: String, spawn_name: String },
}

impl DialogAction {
    /// Parse the dialog's wire form: `IShelveBook` or `ILink,<name>,<title>`.
    pub fn parse(wire: &str) -> Option<Self> {
        let mut parts = wire.split(',');
        match parts.next()? {
            "IShelveBook" => Some(DialogAction::Shelve),
            "ILink" => {
                let spawn_name = parts.next()?.to_string();
                let spawn_title = parts.next()?.to_string();
                Some(DialogAction::Link {
                    spawn_title,
                    spawn_name,
                })
            }
            _ => None,
        }
    }
}

/// Notifications delivered to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShelfEvent {
    /// A participant clicked the shelf to start using it.
    EntryPicked { participant: ParticipantId },
    /// The walk into position finished.
    SeekCompleted { participant: ParticipantId },
    /// The explicit exit control was used.
    ExitPicked { participant: ParticipantId },
    /// A participant walked out of the region in front of the shelf.
    RegionExited { participant: ParticipantId },
    ControlKey { key: ControlKey },
    BookPicked { participant: ParticipantId, object: String },
    LockPicked { participant: ParticipantId, object: String },
    TrayPicked { participant: ParticipantId, object: String },
    /// A triggered sequence finished playing.
    TriggerCompleted(TriggerKey),
    BookDialog(DialogAction),
    ConfirmationAnswered { accepted: bool },
    /// Someone broadcast that the shelf became busy or free.
    BusyChanged { busy: bool },
    ReplicatedChanged { var: SharedVar },
}

/// Routing key for [`ShelfEvent`]s; trigger completions route by aspect and edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EntryPicked,
    SeekCompleted,
    ExitPicked,
    RegionExited,
    ControlKey,
    BookPicked,
    LockPicked,
    TrayPicked,
    PresentCompleted,
    ShelveCompleted,
    OpenLockCompleted,
    CloseLockCompleted,
    ArchiveCompleted,
    ReturnCompleted,
    BookDialog,
    ConfirmationAnswered,
    BusyChanged,
    ReplicatedChanged,
}

impl ShelfEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ShelfEvent::EntryPicked { .. } => EventKind::EntryPicked,
            ShelfEvent::SeekCompleted { .. } => EventKind::SeekCompleted,
            ShelfEvent::ExitPicked { .. } => EventKind::ExitPicked,
            ShelfEvent::RegionExited { .. } => EventKind::RegionExited,
            ShelfEvent::ControlKey { .. } => EventKind::ControlKey,
            ShelfEvent::BookPicked { .. } => EventKind::BookPicked,
            ShelfEvent::LockPicked { .. } => EventKind::LockPicked,
            ShelfEvent::TrayPicked { .. } => EventKind::TrayPicked,
            ShelfEvent::TriggerCompleted(key) => match (key.aspect, key.edge) {
                (Aspect::Shown, Edge::On) => EventKind::PresentCompleted,
                (Aspect::Shown, Edge::Off) => EventKind::ShelveCompleted,
                (Aspect::Locked, Edge::On) => EventKind::OpenLockCompleted,
                (Aspect::Locked, Edge::Off) => EventKind::CloseLockCompleted,
                (Aspect::Tray, Edge::On) => EventKind::ArchiveCompleted,
                (Aspect::Tray, Edge::Off) => EventKind::ReturnCompleted,
            },
            ShelfEvent::BookDialog(_) => EventKind::BookDialog,
            ShelfEvent::ConfirmationAnswered { .. } => EventKind::ConfirmationAnswered,
            ShelfEvent::BusyChanged { .. } => EventKind::BusyChanged,
            ShelfEvent::ReplicatedChanged { .. } => EventKind::ReplicatedChanged,
        }
    }
}

/// Work for the runtime, emitted in the order it must be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShelfCommand {
    RunTrigger {
        key: TriggerKey,
        fast_forward: bool,
        propagate: bool,
    },
    SetActivator {
        slot: SlotIndex,
        aspect: Aspect,
        enabled: bool,
    },
    /// Disable every activator of one aspect at once.
    DisableActivators(Aspect),
    SetEntryEnabled(bool),
    SetExitEnabled(bool),
    HideSlot(SlotIndex),
    /// Make the shelf's collision local to the operator (or restore it).
    SetCollisionExclusive(bool),
    /// Walk the participant in front of the shelf.
    BeginSeek { participant: ParticipantId },
    /// Swap to the shelf camera and capture input.
    EnterShelfView,
    /// Restore the previous camera and release input.
    LeaveShelfView,
    BroadcastBusy(bool),
    AnnounceArchived { destination: String, archived: bool },
    RequestConfirmation { message_key: String },
    OpenBookDialog {
        destination: String,
        slot: SlotIndex,
        participant: ParticipantId,
    },
    Link(LinkRequest),
}

impl ShelfCommand {
    /// JSON form for wire logging. The engine logs every command this way.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
