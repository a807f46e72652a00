//! # Bookshelf
//!
//! A shared, networked bookshelf of linking books. Several participants stand
//! in the same world; at most one of them operates the shelf at a time, and
//! every change that operator makes is persisted before it is shown.
//!
//! ## Core Concepts
//!
//! The crate separates **facts** from **intent**:
//! - [`ShelfEvent`] = Facts (a click, a finished animation, a broadcast)
//! - [`ShelfCommand`] = Intent (run a trigger, toggle an activator, link away)
//!
//! The [`ShelfController`] reads one event, updates its state and the
//! [`PersistentStore`], and answers with commands. It never does presentation
//! work itself.
//!
//! ## Architecture
//!
//! ```text
//! Scene / network / dialogs
//!     │
//!     ▼ EngineHandle::emit()
//! Engine.run() loop
//!     │
//!     ▼
//! dispatch::ROUTES ── precondition denied ─► logged, dropped
//!     │
//!     ▼ handler
//! ShelfController ───────► PersistentStore (synchronous writes)
//!     │        │
//!     │        └─────────► ReplicatedVars (operator token)
//!     ▼
//! Vec<ShelfCommand>
//!     │
//!     ▼
//! Effect.execute() ──► scene ──► TriggerCompleted / BusyChanged ─┐
//!     ▲                                                          │
//!     └──────────────────────── emit() ◄─────────────────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One operator** - At most one participant holds the token; the
//!    replicated vars are the source of truth and the last write wins.
//! 2. **Operator only** - Every shelf mutation is denied unless the local
//!    participant holds the token.
//! 3. **No overlapping animations** - New interactions wait until every
//!    operator-triggered animation has reported completion.
//! 4. **Persist first** - Storage is written before the matching animation
//!    is requested.
//! 5. **Mirrored archive** - The twin and its companion always report the
//!    same archive flag.
//! 6. **Idempotent visuals** - Setting an item to its current state runs nothing.
//!
//! ## Example
//!
//! ```ignore
//! use bookshelf::{EngineBuilder, ShelfDeps, ShelfEvent};
//!
//! let deps = ShelfDeps::new(store, vars, world);
//! let (engine, handle) = EngineBuilder::new(deps)
//!     .with_layout(layout)
//!     .with_effect(SceneEffect::new(scene))
//!     .build()?;
//!
//! tokio::spawn(engine.run());
//!
//! handle.emit(ShelfEvent::EntryPicked { participant })?;
//! ```

pub mod book;
mod controller;
#[cfg(test)]
mod controller_tests;
mod deps;
pub mod dispatch;
mod engine;
mod error;
mod event;
mod item_state;
pub mod layout;
mod link;
pub mod operator;
mod scene;
pub mod store;

pub use book::{Book, BookKind, BookTable, SlotUpdates};
pub use controller::{Decision, Phase, ShelfController};
pub use deps::{ShelfDeps, WorldView};
pub use engine::{Effect, Engine, EngineBuilder, EngineHandle, EngineStopped};
pub use error::{ConfigError, Denial, Result, ShelfError, StoreError};
pub use event::{ControlKey, DialogAction, EventKind, ShelfCommand, ShelfEvent};
pub use item_state::{Aspect, Edge, ItemState, Playback, TriggerKey};
pub use layout::{HubConfig, MessageKeys, ShelfLayout, SlotIndex, TwinConfig, Variant};
pub use link::{LinkRequest, LinkingRule};
pub use operator::{Arbiter, ParticipantId, ReplicatedVars, SharedVar, TokenChange, NO_HOLDER};
pub use scene::{SceneBindings, SlotObjects};
pub use store::{
    DestinationInfo, FolderId, LinkRecord, LinkRecordId, PersistentStore, ScalarId, SpawnPoint,
};
