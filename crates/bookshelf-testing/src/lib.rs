//! Test support for the bookshelf crate.
//!
//! - [`MemoryVault`]: in-memory [`PersistentStore`](bookshelf::PersistentStore)
//! - [`Network`] / [`ReplicaVars`]: ordered replication of the operator vars
//! - [`TestWorld`]: world flags, ownership and head count
//! - [`RecordingEffect`]: an [`Effect`](bookshelf::Effect) that keeps every command
//! - [`Room`]: several participants sharing one shelf, stepped by hand
//!
//! ```ignore
//! let vault = Arc::new(MemoryVault::new());
//! vault.add_link("Bookshelf", record("Teledahn", true, false));
//!
//! let mut room = Room::new(vault).owned_by(participant(1));
//! room.join(participant(1))?;
//! room.engage(participant(1))?;
//! room.pick(participant(1), SlotIndex(7), Aspect::Locked)?;
//! room.settle(participant(1));
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

mod effect;
mod network;
mod room;
mod vault;
mod world;

pub use effect::RecordingEffect;
pub use network::{Broadcast, Network, ReplicaVars};
pub use room::{participant, Member, Room};
pub use vault::{record, record_with_spawns, MemoryVault};
pub use world::{Presence, TestWorld};

/// A panicking test must not take every later lock down with it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
