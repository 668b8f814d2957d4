//! Folio networking: relay rewriting, the blocking HTTP probe client,
//! probe transports, and the accessibility prober.

pub mod http;
pub mod probe;
pub mod relay;
pub mod tls;
#[cfg(feature = "tls-rustls")]
pub mod tls_rustls;
pub mod transport;

pub use http::{HttpOptions, HttpResponse, Method};
pub use probe::{ProbeStep, ProbeTarget, Prober, classify};
pub use relay::RelayRewriter;
pub use tls::{HttpStream, TlsProvider};
#[cfg(feature = "tls-rustls")]
pub use tls_rustls::RustlsTlsProvider;
pub use transport::{
    HttpProbeTransport, ProbeMethod, ProbeReply, ProbeRequest, ProbeTicket, ProbeTransport,
};
