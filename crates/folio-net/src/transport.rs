//! Probe transport: the boundary between the single-threaded prober and
//! whatever actually talks to the network.
//!
//! A transport accepts [`ProbeRequest`]s and later hands back replies
//! tagged with the request's [`ProbeTicket`]. It never decides whether a
//! reply is still wanted; stale replies are dropped by the session.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use folio_types::model::{DocumentKind, Epoch, SessionHandle};

use crate::http::{self, HttpOptions, Method};
use crate::tls::TlsProvider;

/// Method a probe attempt used.
pub type ProbeMethod = Method;

/// Identifies one probe request. Echoed back with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTicket {
    pub session: SessionHandle,
    pub epoch: Epoch,
    pub attempt: u32,
    pub method: ProbeMethod,
}

/// A request for the transport to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub ticket: ProbeTicket,
    pub url: String,
}

/// What came back for a probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeReply {
    /// The host answered.
    Response {
        status: u16,
        content_type: Option<String>,
        /// Kind sniffed from the body prefix (`GET` only).
        sniffed: Option<DocumentKind>,
    },
    /// No answer: DNS, connect, TLS, or read failure.
    Unreachable(String),
}

/// Non-blocking probe transport.
pub trait ProbeTransport {
    /// Start a request. Must not block.
    fn send(&mut self, request: ProbeRequest);

    /// Drain the replies that have arrived since the last call.
    fn poll(&mut self) -> Vec<(ProbeTicket, ProbeReply)>;
}

/// [`ProbeTransport`] over the blocking HTTP client. Each request runs on
/// its own worker thread; replies come back through a channel.
pub struct HttpProbeTransport {
    options: HttpOptions,
    tls: Option<Arc<dyn TlsProvider>>,
    tx: Sender<(ProbeTicket, ProbeReply)>,
    rx: Receiver<(ProbeTicket, ProbeReply)>,
}

impl HttpProbeTransport {
    pub fn new(options: HttpOptions, tls: Option<Arc<dyn TlsProvider>>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            options,
            tls,
            tx,
            rx,
        }
    }

    /// Transport with the crate's default TLS provider, if one is compiled in.
    pub fn with_default_tls(options: HttpOptions) -> Self {
        Self::new(options, default_tls())
    }

    /// Queue an `Unreachable` reply for a request whose worker never started.
    fn report_unlaunched(&self, ticket: ProbeTicket, err: &std::io::Error) {
        log::warn!("failed to spawn probe worker: {err}");
        // We hold the receiver, so this cannot fail.
        let _ = self.tx.send((ticket, ProbeReply::Unreachable(err.to_string())));
    }
}

#[cfg(feature = "tls-rustls")]
fn default_tls() -> Option<Arc<dyn TlsProvider>> {
    Some(Arc::new(crate::RustlsTlsProvider::new()))
}

#[cfg(not(feature = "tls-rustls"))]
fn default_tls() -> Option<Arc<dyn TlsProvider>> {
    None
}

impl ProbeTransport for HttpProbeTransport {
    fn send(&mut self, request: ProbeRequest) {
        let ticket = request.ticket;
        let tx = self.tx.clone();
        let options = self.options.clone();
        let tls = self.tls.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("folio-probe-{}", ticket.session.0))
            .spawn(move || {
                let reply = perform(&request, &options, tls.as_deref());
                // The receiver is gone only when the transport was dropped.
                let _ = tx.send((request.ticket, reply));
            });
        if let Err(e) = spawned {
            self.report_unlaunched(ticket, &e);
        }
    }

    fn poll(&mut self) -> Vec<(ProbeTicket, ProbeReply)> {
        self.rx.try_iter().collect()
    }
}

/// Run one probe request to completion on the current thread.
pub fn perform(
    request: &ProbeRequest,
    options: &HttpOptions,
    tls: Option<&dyn TlsProvider>,
) -> ProbeReply {
    let method = request.ticket.method;
    match http::request(method, &request.url, options, tls) {
        Ok(resp) => {
            let sniffed = match method {
                Method::Get => Some(DocumentKind::sniff(&resp.body_prefix)),
                Method::Head => None,
            };
            log::debug!(
                "probe {} {} -> {}",
                method.as_str(),
                request.url,
                resp.status_code
            );
            ProbeReply::Response {
                status: resp.status_code,
                content_type: resp.content_type().map(str::to_string),
                sniffed,
            }
        },
        Err(e) => {
            log::debug!("probe {} {} failed: {e}", method.as_str(), request.url);
            ProbeReply::Unreachable(e.to_string())
        },
    }
}
