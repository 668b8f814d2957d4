//! TLS provider abstraction.
//!
//! The HTTP probe client wraps plain TCP connections through a
//! [`TlsProvider`] so it never depends on a concrete TLS library.

use std::io::{Read, Write};
use std::net::TcpStream;

use folio_types::error::Result;

/// A bidirectional byte stream the HTTP client can speak over.
pub trait HttpStream: Read + Write + Send {}

impl<T: Read + Write + Send> HttpStream for T {}

/// Provides TLS client connections.
pub trait TlsProvider: Send + Sync {
    /// Wrap `stream` in a TLS client session.
    ///
    /// `server_name` is used for SNI and certificate verification.
    fn connect_tls(&self, stream: TcpStream, server_name: &str) -> Result<Box<dyn HttpStream>>;
}
