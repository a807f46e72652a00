//! Per-slot, per-aspect two-state machines.
//!
//! Each slot has three [`ItemState`]s: whether its book is shown, whether its
//! lock is open, and whether its tray is out (archived). A state change fires
//! exactly one external trigger; setting the current state again fires none.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::ShelfCommand;
use crate::layout::SlotIndex;

/// Which visual aspect of a slot a state machine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Aspect {
    /// On = book presented, off = book shelved.
    Shown,
    /// On = lock open (unlocked), off = lock closed.
    Locked,
    /// On = tray out (archived), off = tray returned.
    Tray,
}

impl Aspect {
    pub const ALL: [Aspect; 3] = [Aspect::Shown, Aspect::Locked, Aspect::Tray];
}

/// Direction of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Edge {
    On,
    Off,
}

impl Edge {
    pub fn of(state: bool) -> Self {
        if state {
            Edge::On
        } else {
            Edge::Off
        }
    }
}

/// Identifies one external trigger and its completion notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TriggerKey {
    pub slot: SlotIndex,
    pub aspect: Aspect,
    pub edge: Edge,
}

impl TriggerKey {
    pub fn new(slot: SlotIndex, aspect: Aspect, edge: Edge) -> Self {
        Self { slot, aspect, edge }
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}:{:?}", self.slot, self.aspect, self.edge)
    }
}

/// How a triggered sequence should play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playback {
    /// Complete the sequence instantly.
    pub fast_forward: bool,
    /// Broadcast the trigger to every participant instead of playing it locally.
    pub propagate: bool,
}

impl Playback {
    /// A live, replicated transition.
    pub const LIVE: Playback = Playback {
        fast_forward: false,
        propagate: true,
    };

    /// Local catch-up to state read from storage.
    pub const RESTORE: Playback = Playback {
        fast_forward: true,
        propagate: false,
    };
}

#[derive(Debug, Clone)]
pub struct ItemState {
    slot: SlotIndex,
    aspect: Aspect,
    state: bool,
    on_bound: bool,
    off_bound: bool,
    activator: bool,
}

impl ItemState {
    pub fn new(slot: SlotIndex, aspect: Aspect) -> Self {
        Self {
            slot,
            aspect,
            state: false,
            on_bound: true,
            off_bound: true,
            activator: false,
        }
    }

    /// Mark which trigger handles the scene actually provides.
    pub fn with_triggers(mut self, on: bool, off: bool) -> Self {
        self.on_bound = on;
        self.off_bound = off;
        self
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn activator_enabled(&self) -> bool {
        self.activator
    }

    /// Move to `target`, returning the trigger to run when the state changed
    /// and the handle for that direction is bound.
    pub fn set_state(&mut self, target: bool, playback: Playback) -> Option<ShelfCommand> {
        if target == self.state {
            return None;
        }
        self.state = target;

        let bound = if target { self.on_bound } else { self.off_bound };
        bound.then(|| ShelfCommand::RunTrigger {
            key: TriggerKey::new(self.slot, self.aspect, Edge::of(target)),
            fast_forward: playback.fast_forward,
            propagate: playback.propagate,
        })
    }

    /// Flip the state, returning the new state and the trigger to run.
    pub fn toggle_state(&mut self, playback: Playback) -> (bool, Option<ShelfCommand>) {
        let trigger = self.set_state(!self.state, playback);
        (self.state, trigger)
    }

    pub fn set_activator(&mut self, enabled: bool) -> ShelfCommand {
        self.activator = enabled;
        ShelfCommand::SetActivator {
            slot: self.slot,
            aspect: self.aspect,
            enabled,
        }
    }

    /// Record an activator change that was issued for the whole aspect at once.
    pub(crate) fn note_activator(&mut self, enabled: bool) {
        self.activator = enabled;
    }
}
