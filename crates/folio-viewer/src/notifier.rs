//! Outbound notifications to the embedding UI.

use folio_types::model::{FailureReason, RecoveryOption, SessionHandle, ViewerState};

/// Receives session lifecycle events.
///
/// Called synchronously from inside the engine; implementations must not
/// call back into the [`Viewer`](crate::Viewer).
pub trait Notifier {
    fn on_state_changed(&mut self, state: ViewerState);

    /// The primary document finished loading on an embedded surface.
    fn on_loaded(&mut self);

    /// The session reached a terminal failure. `recovery` is never empty.
    fn on_error(&mut self, reason: FailureReason, recovery: &[RecoveryOption]);
}

/// Writes every event through the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogNotifier {
    session: SessionHandle,
}

impl LogNotifier {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }
}

impl Notifier for LogNotifier {
    fn on_state_changed(&mut self, state: ViewerState) {
        log::info!("preview {}: state {state:?}", self.session);
    }

    fn on_loaded(&mut self) {
        log::info!("preview {}: loaded", self.session);
    }

    fn on_error(&mut self, reason: FailureReason, recovery: &[RecoveryOption]) {
        log::warn!("preview {}: {reason} (recovery: {recovery:?})", self.session);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn on_state_changed(&mut self, _state: ViewerState) {}
    fn on_loaded(&mut self) {}
    fn on_error(&mut self, _reason: FailureReason, _recovery: &[RecoveryOption]) {}
}
