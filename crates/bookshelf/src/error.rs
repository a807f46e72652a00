//! Error types for shelf operations.
//!
//! Nothing in this crate aborts a shelf session. Every variant here describes
//! an interaction that was abandoned; the controller logs it and the
//! participant can retry or walk away.

use thiserror::Error;

use crate::event::EventKind;
use crate::layout::SlotIndex;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ShelfError>;

/// Why a dispatcher precondition rejected an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The local participant does not hold the operator token.
    NotOperator,
    /// An operator-triggered animation has not reported completion yet.
    AnimationPending,
    /// The slot's book does not allow the requested mutation.
    Capability(&'static str),
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::NotOperator => f.write_str("not operator"),
            Denial::AnimationPending => f.write_str("animation pending"),
            Denial::Capability(what) => write!(f, "book is not {what}"),
        }
    }
}

/// Errors that can occur while handling a shelf notification.
#[derive(Error, Debug)]
pub enum ShelfError {
    #[error("{event:?} denied: {reason}")]
    PreconditionDenied { event: EventKind, reason: Denial },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation on empty slot {0}")]
    EmptySlot(SlotIndex),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ShelfError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        ShelfError::NotFound(what.into())
    }

    /// Precondition denials are routine and only worth a debug line.
    pub fn is_denial(&self) -> bool {
        matches!(self, ShelfError::PreconditionDenied { .. })
    }
}

/// Errors reported by a [`PersistentStore`](crate::store::PersistentStore) write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such node: {0}")]
    MissingNode(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Errors raised while loading or validating a [`ShelfLayout`](crate::layout::ShelfLayout).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("malformed layout: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("destination {0} appears in more than one slot")]
    DuplicateDestination(String),

    #[error("destination {0} is configured but has no slot")]
    Unplaced(String),

    #[error("scene binds {scene} slots but the layout has {layout}")]
    SlotCountMismatch { scene: usize, layout: usize },
}
