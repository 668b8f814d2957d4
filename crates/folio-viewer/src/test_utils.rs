//! Shared test doubles for the viewer: a scripted probe transport and
//! recording notifier/surface hosts.
//!
//! Each double keeps its log behind an `Rc<RefCell<..>>` so a test can
//! hand a clone to the engine and keep one for assertions.

use std::cell::RefCell;
use std::rc::Rc;

use folio_net::transport::{ProbeReply, ProbeRequest, ProbeTicket, ProbeTransport};
use folio_types::model::{
    FailureReason, RecoveryOption, RenderTicket, Strategy, ViewerState,
};

use crate::notifier::Notifier;
use crate::surface::SurfaceHost;

/// Initialize `env_logger` for tests (idempotent).
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A 200 response declaring `application/pdf`.
pub fn pdf_ok() -> ProbeReply {
    ProbeReply::Response {
        status: 200,
        content_type: Some("application/pdf".to_string()),
        sniffed: None,
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

type Responder = Box<dyn FnMut(&ProbeRequest) -> Option<ProbeReply>>;

struct ScriptState {
    responder: Responder,
    sent: Vec<ProbeRequest>,
    ready: Vec<(ProbeTicket, ProbeReply)>,
}

/// Probe transport whose replies come from a closure. A `None` from the
/// closure leaves the request unanswered.
///
/// Replies become visible on the next [`poll`](ProbeTransport::poll).
#[derive(Clone)]
pub struct ScriptedTransport {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new(responder: impl FnMut(&ProbeRequest) -> Option<ProbeReply> + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                responder: Box::new(responder),
                sent: Vec::new(),
                ready: Vec::new(),
            })),
        }
    }

    /// A transport that never answers.
    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    /// Every request sent so far.
    pub fn sent(&self) -> Vec<ProbeRequest> {
        self.state.borrow().sent.clone()
    }

    /// Number of replies waiting for the next poll.
    pub fn pending(&self) -> usize {
        self.state.borrow().ready.len()
    }

    /// Queue a reply by hand.
    pub fn push_reply(&self, ticket: ProbeTicket, reply: ProbeReply) {
        self.state.borrow_mut().ready.push((ticket, reply));
    }
}

impl ProbeTransport for ScriptedTransport {
    fn send(&mut self, request: ProbeRequest) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if let Some(reply) = (state.responder)(&request) {
            state.ready.push((request.ticket, reply));
        }
        state.sent.push(request);
    }

    fn poll(&mut self) -> Vec<(ProbeTicket, ProbeReply)> {
        std::mem::take(&mut self.state.borrow_mut().ready)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A notification observed by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    State(ViewerState),
    Loaded,
    Error(FailureReason, Vec<RecoveryOption>),
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Rc<RefCell<Vec<Event>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn states(&self) -> Vec<ViewerState> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(FailureReason, Vec<RecoveryOption>)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Error(reason, options) => Some((*reason, options.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Loaded))
            .count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn on_state_changed(&mut self, state: ViewerState) {
        self.events.borrow_mut().push(Event::State(state));
    }

    fn on_loaded(&mut self) {
        self.events.borrow_mut().push(Event::Loaded);
    }

    fn on_error(&mut self, reason: FailureReason, recovery: &[RecoveryOption]) {
        self.events
            .borrow_mut()
            .push(Event::Error(reason, recovery.to_vec()));
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

/// A call observed by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Mount {
        ticket: RenderTicket,
        strategy: Strategy,
        reference: String,
    },
    Unmount,
    Alternate(String),
    Raw(String),
}

#[derive(Clone, Default)]
pub struct RecordingSurface {
    calls: Rc<RefCell<Vec<SurfaceCall>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.borrow().clone()
    }

    pub fn mounts(&self) -> Vec<(RenderTicket, Strategy, String)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                SurfaceCall::Mount {
                    ticket,
                    strategy,
                    reference,
                } => Some((*ticket, *strategy, reference.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn last_mount(&self) -> Option<RenderTicket> {
        self.mounts().last().map(|(t, _, _)| *t)
    }
}

impl SurfaceHost for RecordingSurface {
    fn mount(&mut self, ticket: RenderTicket, strategy: Strategy, reference: &str) {
        self.calls.borrow_mut().push(SurfaceCall::Mount {
            ticket,
            strategy,
            reference: reference.to_string(),
        });
    }

    fn unmount(&mut self) {
        self.calls.borrow_mut().push(SurfaceCall::Unmount);
    }

    fn show_alternate(&mut self, content: &str) {
        self.calls
            .borrow_mut()
            .push(SurfaceCall::Alternate(content.to_string()));
    }

    fn show_raw(&mut self, content: &str) {
        self.calls.borrow_mut().push(SurfaceCall::Raw(content.to_string()));
    }
}
