//! Handle-based facade over viewer sessions.
//!
//! The host owns a single [`Viewer`], creates one session per preview,
//! forwards surface signals, and calls [`Viewer::poll`] from its frame
//! loop. Nothing here blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use folio_net::http::HttpOptions;
use folio_net::relay::RelayRewriter;
use folio_net::transport::{HttpProbeTransport, ProbeTransport};
use folio_types::config::ViewerConfig;
use folio_types::error::{FolioError, Result};
use folio_types::model::{PreviewRequest, RenderTicket, SessionHandle};

use crate::notifier::Notifier;
use crate::session::{SessionSettings, ViewerSession};
use crate::snapshot::SessionSnapshot;
use crate::surface::SurfaceHost;

pub struct Viewer {
    settings: SessionSettings,
    relay: Arc<RelayRewriter>,
    transport: Box<dyn ProbeTransport>,
    sessions: BTreeMap<SessionHandle, ViewerSession>,
    next_handle: u64,
}

impl Viewer {
    /// Build a viewer over an arbitrary probe transport.
    pub fn new(config: &ViewerConfig, transport: Box<dyn ProbeTransport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            settings: SessionSettings::from_config(config),
            relay: Arc::new(RelayRewriter::new(&config.relay)),
            transport,
            sessions: BTreeMap::new(),
            next_handle: 1,
        })
    }

    /// Build a viewer that probes over HTTP (and HTTPS when a TLS provider
    /// is compiled in).
    pub fn with_http(config: &ViewerConfig) -> Result<Self> {
        let transport = HttpProbeTransport::with_default_tls(HttpOptions::from(&config.http));
        Self::new(config, Box::new(transport))
    }

    /// Create a session for `request` and start it immediately.
    pub fn create_session(
        &mut self,
        request: PreviewRequest,
        notifier: Box<dyn Notifier>,
        surface: Box<dyn SurfaceHost>,
        now_ms: u64,
    ) -> SessionHandle {
        let handle = SessionHandle(self.next_handle);
        self.next_handle += 1;

        let mut session = ViewerSession::new(
            handle,
            request,
            self.settings,
            Arc::clone(&self.relay),
            notifier,
            surface,
        );
        log::info!("created preview session {handle}");
        session.start(self.transport.as_mut(), now_ms);
        self.sessions.insert(handle, session);
        handle
    }

    /// Restart `handle` from scratch under a new epoch.
    pub fn retry(&mut self, handle: SessionHandle, now_ms: u64) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(FolioError::UnknownSession(handle))?;
        session.retry(self.transport.as_mut(), now_ms)
    }

    /// Point `handle` at a new primary reference.
    pub fn change_reference(
        &mut self,
        handle: SessionHandle,
        reference: &str,
        now_ms: u64,
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&handle)
            .ok_or(FolioError::UnknownSession(handle))?;
        session.change_reference(reference, self.transport.as_mut(), now_ms)?;
        Ok(())
    }

    pub fn switch_to_alternate(&mut self, handle: SessionHandle) -> Result<()> {
        self.session_mut(handle)?.switch_to_alternate()
    }

    /// Cancel all work for `handle` and release it.
    pub fn dispose(&mut self, handle: SessionHandle) -> Result<()> {
        let mut session = self
            .sessions
            .remove(&handle)
            .ok_or(FolioError::UnknownSession(handle))?;
        session.dispose();
        Ok(())
    }

    /// The reference to open outside the viewer. No state change.
    pub fn open_externally(&self, handle: SessionHandle) -> Result<Option<String>> {
        Ok(self.session(handle)?.open_externally())
    }

    /// Forward a surface load signal. Signals for released sessions are
    /// dropped.
    pub fn surface_loaded(&mut self, ticket: RenderTicket) {
        match self.sessions.get_mut(&ticket.session) {
            Some(session) => session.on_surface_loaded(ticket),
            None => log::debug!("load signal for released session {}", ticket.session),
        }
    }

    /// Forward a surface error signal. Signals for released sessions are
    /// dropped.
    pub fn surface_errored(&mut self, ticket: RenderTicket, detail: &str, now_ms: u64) {
        match self.sessions.get_mut(&ticket.session) {
            Some(session) => session.on_surface_error(ticket, detail, now_ms),
            None => log::debug!("error signal for released session {}", ticket.session),
        }
    }

    /// Deliver probe replies and fire due timers. Call once per frame.
    pub fn poll(&mut self, now_ms: u64) {
        for (ticket, reply) in self.transport.poll() {
            match self.sessions.get_mut(&ticket.session) {
                Some(session) => {
                    session.on_probe_reply(ticket, reply, self.transport.as_mut(), now_ms)
                },
                None => log::debug!("probe reply for released session {}", ticket.session),
            }
        }
        for session in self.sessions.values_mut() {
            session.advance(now_ms, self.transport.as_mut());
        }
    }

    /// Earliest pending deadline across all sessions.
    pub fn next_deadline(&self) -> Option<u64> {
        self.sessions
            .values()
            .filter_map(ViewerSession::next_deadline)
            .min()
    }

    pub fn session(&self, handle: SessionHandle) -> Result<&ViewerSession> {
        self.sessions
            .get(&handle)
            .ok_or(FolioError::UnknownSession(handle))
    }

    pub fn snapshot(&self, handle: SessionHandle) -> Result<SessionSnapshot> {
        Ok(SessionSnapshot::of(self.session(handle)?))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session_mut(&mut self, handle: SessionHandle) -> Result<&mut ViewerSession> {
        self.sessions
            .get_mut(&handle)
            .ok_or(FolioError::UnknownSession(handle))
    }
}
