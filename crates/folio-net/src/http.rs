//! Minimal blocking HTTP/1.1 probe client.
//!
//! Issues `HEAD` or `GET` over `std::net::TcpStream` and, when a
//! [`TlsProvider`] is supplied, over TLS. Probes only need the status line,
//! the headers, and (for `GET`) a short body prefix for content sniffing,
//! so the client stops reading as soon as it has those.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use folio_types::config::HttpConfig;
use folio_types::error::{FolioError, Result};
use url::Url;

use crate::tls::{HttpStream, TlsProvider};

/// Upper bound on the size of a response header block.
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Probe methods, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Metadata only.
    Head,
    /// Full content (read no further than the sniff prefix).
    Get,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
        }
    }
}

/// Connection and read limits for one request.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_redirects: u8,
    pub sniff_bytes: usize,
    pub user_agent: String,
}

impl From<&HttpConfig> for HttpOptions {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            read_timeout: Duration::from_millis(cfg.read_timeout_ms),
            max_redirects: cfg.max_redirects,
            sniff_bytes: cfg.sniff_bytes,
            user_agent: cfg.user_agent.clone(),
        }
    }
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

/// A parsed probe response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status_code: u16,
    /// Response headers as (lowercased name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Up to `sniff_bytes` of decoded body (always empty for `HEAD`).
    pub body_prefix: Vec<u8>,
}

impl HttpResponse {
    /// The declared `Content-Type`, if any.
    pub fn content_type(&self) -> Option<&str> {
        find_header(&self.headers, "content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Perform a probe request, following redirects up to
/// `opts.max_redirects` hops.
pub fn request(
    method: Method,
    url: &str,
    opts: &HttpOptions,
    tls: Option<&dyn TlsProvider>,
) -> Result<HttpResponse> {
    let mut current =
        Url::parse(url).map_err(|e| FolioError::Http(format!("invalid URL {url}: {e}")))?;

    for _ in 0..=opts.max_redirects {
        match current.scheme() {
            "http" => {},
            "https" if tls.is_some() => {},
            "https" => {
                return Err(FolioError::Transport(
                    "HTTPS not supported: TLS not available".to_string(),
                ));
            },
            scheme => {
                return Err(FolioError::Http(format!(
                    "unsupported scheme for HTTP client: {scheme}",
                )));
            },
        }

        let mut resp = do_request(method, &current, opts, tls)?;

        if is_redirect(resp.status_code)
            && let Some(location) = find_header(&resp.headers, "location")
        {
            let location = location.to_string();
            current = current
                .join(&location)
                .map_err(|_| FolioError::Http(format!("bad redirect Location: {location}")))?;
            log::debug!("{} redirected to {current}", method.as_str());
            continue;
        }

        resp.url = current.to_string();
        return Ok(resp);
    }

    Err(FolioError::Http("too many redirects".to_string()))
}

// -------------------------------------------------------------------
// Internals
// -------------------------------------------------------------------

/// Connect, optionally upgrade to TLS, send the request, read and parse.
fn do_request(
    method: Method,
    url: &Url,
    opts: &HttpOptions,
    tls: Option<&dyn TlsProvider>,
) -> Result<HttpResponse> {
    let host = url
        .host_str()
        .ok_or_else(|| FolioError::Http(format!("URL has no host: {url}")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| FolioError::Http(format!("URL has no port: {url}")))?;

    let stream = tcp_connect(host, port, opts)?;

    let mut stream: Box<dyn HttpStream> = if url.scheme() == "https" {
        let provider =
            tls.ok_or_else(|| FolioError::Transport("TLS not available".to_string()))?;
        provider.connect_tls(stream, host)?
    } else {
        Box::new(stream)
    };

    send_request(&mut stream, method, url, opts)?;
    let raw = read_head(&mut stream, method, opts.sniff_bytes)?;
    parse_response(&raw, method, opts.sniff_bytes)
}

/// Open a TCP connection with connect and read timeouts.
fn tcp_connect(host: &str, port: u16, opts: &HttpOptions) -> Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| FolioError::Transport(format!("DNS resolution failed: {e}")))?
        .next()
        .ok_or_else(|| FolioError::Transport(format!("no addresses for {host}:{port}")))?;

    let stream = TcpStream::connect_timeout(&addr, opts.connect_timeout)
        .map_err(|e| FolioError::Transport(format!("TCP connect failed: {e}")))?;

    stream
        .set_read_timeout(Some(opts.read_timeout))
        .map_err(|e| FolioError::Transport(format!("set read timeout: {e}")))?;

    Ok(stream)
}

/// Send an HTTP/1.1 request line and headers.
fn send_request(
    stream: &mut impl Write,
    method: Method,
    url: &Url,
    opts: &HttpOptions,
) -> Result<()> {
    let host = url.host_str().unwrap_or_default();
    let host_header = match url.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    };

    let path = match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    };

    let request = format!(
        "{method} {path} HTTP/1.1\r\n\
         Host: {host_header}\r\n\
         User-Agent: {agent}\r\n\
         Accept: */*\r\n\
         Connection: close\r\n\
         \r\n",
        method = method.as_str(),
        agent = opts.user_agent,
    );

    stream
        .write_all(request.as_bytes())
        .map_err(|e| FolioError::Transport(format!("send request: {e}")))?;
    stream
        .flush()
        .map_err(|e| FolioError::Transport(format!("send request: {e}")))?;

    Ok(())
}

/// Read until the header block is complete and, for `GET`, until enough
/// body bytes for sniffing have arrived (or EOF / read timeout).
fn read_head(stream: &mut impl Read, method: Method, sniff_bytes: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    // Room for a chunk-size line in front of the sniffed bytes.
    let body_wanted = match method {
        Method::Head => 0,
        Method::Get => sniff_bytes + 16,
    };

    loop {
        if let Some(end) = find_subsequence(&buf, b"\r\n\r\n")
            && buf.len() >= end + 4 + body_wanted
        {
            break;
        }
        if buf.len() > MAX_HEADER_SIZE + body_wanted {
            return Err(FolioError::Http("response headers too large".to_string()));
        }
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if (e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut)
                    && find_subsequence(&buf, b"\r\n\r\n").is_some() =>
            {
                break;
            },
            Err(e) => {
                return Err(FolioError::Transport(format!("read response: {e}")));
            },
        }
    }
    Ok(buf)
}

/// Parse raw bytes into status code, headers, and a body prefix.
pub fn parse_response(data: &[u8], method: Method, sniff_bytes: usize) -> Result<HttpResponse> {
    let header_end = find_subsequence(data, b"\r\n\r\n").ok_or_else(|| {
        FolioError::Http("malformed HTTP response: no header terminator".to_string())
    })?;

    let header_str = std::str::from_utf8(&data[..header_end])
        .map_err(|_| FolioError::Http("non-UTF-8 headers".to_string()))?;

    let mut lines = header_str.split("\r\n");

    // Status line: "HTTP/1.x STATUS REASON"
    let status_line = lines
        .next()
        .ok_or_else(|| FolioError::Http("empty response".to_string()))?;
    let status_code = parse_status_line(status_line)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    let body_prefix = match method {
        Method::Head => Vec::new(),
        Method::Get => {
            let raw_body = &data[header_end + 4..];
            let mut body = if find_header(&headers, "transfer-encoding")
                .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
            {
                decode_chunked(raw_body)
            } else {
                raw_body.to_vec()
            };
            body.truncate(sniff_bytes);
            body
        },
    };

    Ok(HttpResponse {
        url: String::new(),
        status_code,
        headers,
        body_prefix,
    })
}

/// Parse the HTTP status code from the status line.
fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(FolioError::Http(format!("bad status line: {line}")));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| FolioError::Http(format!("bad status code in: {line}")))
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    let name_lower = name.to_lowercase();
    headers
        .iter()
        .find(|(k, _)| k == &name_lower)
        .map(|(_, v)| v.as_str())
}

/// Decode as much of a chunked body as is present. A truncated final
/// chunk contributes whatever bytes arrived.
fn decode_chunked(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    let mut pos = 0;

    while let Some(i) = find_subsequence(&data[pos..], b"\r\n") {
        let line_end = pos + i;

        let Ok(size_line) = std::str::from_utf8(&data[pos..line_end]) else {
            break;
        };
        // Strip optional chunk extensions (after `;`).
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let Ok(chunk_size) = usize::from_str_radix(size_str, 16) else {
            break;
        };
        if chunk_size == 0 {
            break;
        }

        let chunk_start = line_end + 2;
        let chunk_end = chunk_start.saturating_add(chunk_size);
        if chunk_end > data.len() {
            result.extend_from_slice(&data[chunk_start.min(data.len())..]);
            break;
        }

        result.extend_from_slice(&data[chunk_start..chunk_end]);
        pos = chunk_end + 2;
        if pos > data.len() {
            break;
        }
    }

    result
}

/// Whether a status code is a redirect we should follow.
fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Find the position of a byte subsequence in a slice.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
