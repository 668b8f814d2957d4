//! Serializable view of a session, for embedding UIs and diagnostics.

use serde::Serialize;

use folio_types::error::Result;
use folio_types::model::{
    Epoch, FailureReason, ProbeResult, RecoveryOption, RenderAttempt, SessionHandle, ViewerState,
};

use crate::session::ViewerSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub handle: SessionHandle,
    pub epoch: Epoch,
    pub state: ViewerState,
    pub probe: ProbeResult,
    pub attempts: Vec<RenderAttempt>,
    pub failure: Option<FailureReason>,
    /// Offered only while the session is `Failed`.
    pub recovery: Vec<RecoveryOption>,
}

impl SessionSnapshot {
    pub fn of(session: &ViewerSession) -> Self {
        let recovery = if session.state() == ViewerState::Failed {
            session.recovery_options()
        } else {
            Vec::new()
        };
        Self {
            handle: session.handle(),
            epoch: session.epoch(),
            state: session.state(),
            probe: session.probe_result().clone(),
            attempts: session.attempts().to_vec(),
            failure: session.failure(),
            recovery,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
