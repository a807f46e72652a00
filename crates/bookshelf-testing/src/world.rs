//! Scriptable [`WorldView`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bookshelf::{DestinationInfo, ParticipantId, WorldView};
use dashmap::DashMap;

use crate::lock;

/// Head count shared by everyone standing in one world.
#[derive(Debug, Default)]
pub struct Presence(AtomicUsize);

impl Presence {
    pub fn arrive(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// One participant's view of the world. Flags are shared by reference so a
/// test can flip them between loads.
pub struct TestWorld {
    local: ParticipantId,
    own_world: AtomicBool,
    presence: Arc<Presence>,
    flags: Arc<DashMap<String, bool>>,
    current: Mutex<DestinationInfo>,
}

impl TestWorld {
    pub fn new(local: ParticipantId, presence: Arc<Presence>) -> Self {
        Self {
            local,
            own_world: AtomicBool::new(false),
            presence,
            flags: Arc::new(DashMap::new()),
            current: Mutex::new(DestinationInfo::named("Personal")),
        }
    }

    /// Solo participant in their own world.
    pub fn solo(local: ParticipantId) -> Self {
        let presence = Arc::new(Presence::default());
        presence.arrive();
        Self::new(local, presence).owned(true)
    }

    pub fn owned(self, own_world: bool) -> Self {
        self.own_world.store(own_world, Ordering::SeqCst);
        self
    }

    pub fn with_flags(mut self, flags: Arc<DashMap<String, bool>>) -> Self {
        self.flags = flags;
        self
    }

    pub fn set_flag(&self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn set_current_world(&self, world: DestinationInfo) {
        *lock(&self.current) = world;
    }
}

impl WorldView for TestWorld {
    fn local_participant(&self) -> ParticipantId {
        self.local
    }

    fn in_own_world(&self) -> bool {
        self.own_world.load(Ordering::SeqCst)
    }

    fn others_present(&self) -> bool {
        self.presence.count() > 1
    }

    fn flag(&self, name: &str) -> bool {
        self.flags.get(name).is_some_and(|flag| *flag.value())
    }

    fn current_world(&self) -> DestinationInfo {
        lock(&self.current).clone()
    }
}
