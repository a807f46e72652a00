//! Static routing of notifications to controller handlers.
//!
//! Every route carries two preconditions that are checked uniformly before
//! its handler runs: the local participant must hold the operator token, and
//! no operator-triggered animation may be in flight.

use crate::controller::ShelfController;
use crate::controller::ShelfController as C;
use crate::error::{Denial, Result, ShelfError};
use crate::event::EventKind as K;
use crate::event::{EventKind, ShelfEvent};

pub type Handler = fn(&mut ShelfController, &ShelfEvent) -> Result<()>;

/// Handler plus its preconditions for one [`EventKind`].
#[derive(Clone, Copy)]
pub struct Route {
    pub kind: EventKind,
    pub needs_operator: bool,
    pub needs_idle: bool,
    pub handler: Handler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("kind", &self.kind)
            .field("needs_operator", &self.needs_operator)
            .field("needs_idle", &self.needs_idle)
            .finish()
    }
}

impl Route {
    const fn new(kind: EventKind, needs_operator: bool, needs_idle: bool, handler: Handler) -> Self {
        Self {
            kind,
            needs_operator,
            needs_idle,
            handler,
        }
    }

    /// Evaluate both preconditions, operator first.
    pub fn check(&self, is_operator: bool, pending_animations: u32) -> Result<()> {
        let reason = if self.needs_operator && !is_operator {
            Denial::NotOperator
        } else if self.needs_idle && pending_animations > 0 {
            Denial::AnimationPending
        } else {
            return Ok(());
        };
        Err(ShelfError::PreconditionDenied {
            event: self.kind,
            reason,
        })
    }
}

pub static ROUTES: &[Route] = &[
    Route::new(K::EntryPicked, false, false, C::on_entry),
    Route::new(K::SeekCompleted, false, false, C::on_seek_completed),
    Route::new(K::ExitPicked, true, true, C::on_exit),
    Route::new(K::RegionExited, true, false, C::on_region_exited),
    Route::new(K::ControlKey, true, true, C::on_control_key),
    Route::new(K::BookPicked, true, true, C::on_book_picked),
    Route::new(K::PresentCompleted, true, false, C::on_present_completed),
    Route::new(K::ShelveCompleted, true, false, C::on_shelve_completed),
    Route::new(K::LockPicked, true, true, C::on_lock_picked),
    Route::new(K::OpenLockCompleted, true, false, C::on_open_lock_completed),
    Route::new(K::CloseLockCompleted, true, false, C::on_animation_finished),
    Route::new(K::TrayPicked, true, true, C::on_tray_picked),
    Route::new(K::ArchiveCompleted, true, false, C::on_animation_finished),
    Route::new(K::ReturnCompleted, true, false, C::on_animation_finished),
    Route::new(K::BookDialog, true, false, C::on_book_dialog),
    Route::new(K::ConfirmationAnswered, false, false, C::on_confirmation),
    Route::new(K::BusyChanged, false, false, C::on_busy_changed),
    Route::new(K::ReplicatedChanged, false, false, C::on_replicated_changed),
];

pub fn route(kind: EventKind) -> Option<&'static Route> {
    ROUTES.iter().find(|route| route.kind == kind)
}
