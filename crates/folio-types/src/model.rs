//! Preview data model: requests, probe results, epochs, render attempts,
//! viewer states, and the failure taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Document kinds
// ---------------------------------------------------------------------------

/// Content classification of a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Html,
    Image,
    PlainText,
    /// `application/octet-stream` and friends: says nothing about the content.
    Binary,
    Unknown,
}

impl DocumentKind {
    /// Classify a MIME type string. Parameters (`; charset=...`) are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" | "application/x-pdf" => DocumentKind::Pdf,
            "text/html" | "application/xhtml+xml" => DocumentKind::Html,
            "text/plain" => DocumentKind::PlainText,
            "application/octet-stream" | "binary/octet-stream" | "application/download"
            | "application/force-download" => DocumentKind::Binary,
            m if m.starts_with("image/") => DocumentKind::Image,
            _ => DocumentKind::Unknown,
        }
    }

    /// Classify a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => DocumentKind::Pdf,
            "html" | "htm" | "xhtml" => DocumentKind::Html,
            "txt" | "text" => DocumentKind::PlainText,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => DocumentKind::Image,
            _ => DocumentKind::Unknown,
        }
    }

    /// Classify a URL-like reference by the extension of its last path
    /// segment. Query and fragment are ignored.
    pub fn from_reference(reference: &str) -> Self {
        let path = reference.split(['?', '#']).next().unwrap_or("");
        let path = path.split_once("://").map_or(path, |(_, rest)| {
            rest.find('/').map_or("", |i| &rest[i..])
        });
        let Some(segment) = path.rsplit('/').next() else {
            return DocumentKind::Unknown;
        };
        match segment.rfind('.') {
            Some(i) if i + 1 < segment.len() => Self::from_extension(&segment[i + 1..]),
            _ => DocumentKind::Unknown,
        }
    }

    /// Classify the leading bytes of a body by magic number.
    pub fn sniff(prefix: &[u8]) -> Self {
        let trimmed = trim_leading_ws(prefix);
        if trimmed.starts_with(b"%PDF-") {
            return DocumentKind::Pdf;
        }
        if prefix.starts_with(b"\x89PNG\r\n\x1a\n")
            || prefix.starts_with(b"\xff\xd8\xff")
            || prefix.starts_with(b"GIF87a")
            || prefix.starts_with(b"GIF89a")
        {
            return DocumentKind::Image;
        }
        let head: Vec<u8> = trimmed.iter().take(16).map(u8::to_ascii_lowercase).collect();
        if head.starts_with(b"<!doctype html") || head.starts_with(b"<html") {
            return DocumentKind::Html;
        }
        DocumentKind::Unknown
    }

    /// Whether this classification carries no information about the content.
    pub fn is_generic(&self) -> bool {
        matches!(self, DocumentKind::Binary | DocumentKind::Unknown)
    }
}

fn trim_leading_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

// ---------------------------------------------------------------------------
// Preview request
// ---------------------------------------------------------------------------

/// Immutable input to a preview session.
///
/// Blank fields are treated as absent: the accessors return `None` for
/// whitespace-only values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub primary_reference: Option<String>,
    pub alternate_content: Option<String>,
    pub raw_fallback_content: Option<String>,
    pub expected_kind: DocumentKind,
}

impl Default for PreviewRequest {
    fn default() -> Self {
        Self {
            primary_reference: None,
            alternate_content: None,
            raw_fallback_content: None,
            expected_kind: DocumentKind::Pdf,
        }
    }
}

impl PreviewRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.primary_reference = Some(reference.into());
        self
    }

    pub fn with_alternate(mut self, content: impl Into<String>) -> Self {
        self.alternate_content = Some(content.into());
        self
    }

    pub fn with_raw_fallback(mut self, content: impl Into<String>) -> Self {
        self.raw_fallback_content = Some(content.into());
        self
    }

    pub fn with_expected_kind(mut self, kind: DocumentKind) -> Self {
        self.expected_kind = kind;
        self
    }

    /// The primary reference, trimmed, if present and non-blank.
    pub fn primary(&self) -> Option<&str> {
        non_blank(self.primary_reference.as_deref()).map(str::trim)
    }

    /// The alternate rich content, if present and non-blank.
    pub fn alternate(&self) -> Option<&str> {
        non_blank(self.alternate_content.as_deref())
    }

    /// The raw fallback content, if present and non-blank.
    pub fn raw_fallback(&self) -> Option<&str> {
        non_blank(self.raw_fallback_content.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Epochs, handles, tickets
// ---------------------------------------------------------------------------

/// Monotonic generation counter owned by a session.
///
/// Asynchronous work captures the epoch it started under; completions are
/// honored only while that epoch is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Epoch(pub u64);

impl Epoch {
    /// The epoch following this one.
    pub fn next(self) -> Self {
        Epoch(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Opaque identifier of a session owned by a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionHandle(pub u64);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one render attempt. The surface host echoes it back with the
/// load or error signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderTicket {
    pub session: SessionHandle,
    pub epoch: Epoch,
    pub attempt: u32,
}

// ---------------------------------------------------------------------------
// Probe results
// ---------------------------------------------------------------------------

/// Tri-state reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    #[default]
    Unknown,
    Accessible,
    Inaccessible,
}

/// Outcome of probing a document reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProbeResult {
    pub accessible: Accessibility,
    /// Raw `Content-Type` value declared by the last response.
    pub content_type: Option<String>,
    /// Classified kind of the last successful response.
    pub declared_kind: Option<DocumentKind>,
    pub status_code: Option<u16>,
    pub attempts_used: u32,
    pub last_failure_reason: Option<FailureReason>,
}

impl ProbeResult {
    /// A result for a probe that has not run.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_accessible(&self) -> bool {
        self.accessible == Accessibility::Accessible
    }
}

// ---------------------------------------------------------------------------
// Render attempts
// ---------------------------------------------------------------------------

/// Ordered rendering approaches for a reachable primary document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Direct embed of the relay reference.
    PrimarySurface,
    /// Embed inside an isolated, restricted frame.
    SandboxedSurface,
    /// No embedded surface left; the document can only be opened out of band.
    ExternalOnly,
}

impl Strategy {
    /// Strategy used for the 1-based render attempt `attempt`.
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt {
            0 | 1 => Strategy::PrimarySurface,
            2 => Strategy::SandboxedSurface,
            _ => Strategy::ExternalOnly,
        }
    }

    /// Whether this strategy mounts an embedded surface.
    pub fn is_embedded(&self) -> bool {
        !matches!(self, Strategy::ExternalOnly)
    }

    /// Maximum number of embedded strategies.
    pub const EMBEDDED_COUNT: u32 = 2;
}

/// Outcome of a single render attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderOutcome {
    Pending,
    Loaded,
    Errored,
    TimedOut,
}

/// One entry in a session's render history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderAttempt {
    pub strategy: Strategy,
    pub attempt_number: u32,
    pub outcome: RenderOutcome,
    pub started_at_ms: u64,
}

// ---------------------------------------------------------------------------
// Resolution, states, failures
// ---------------------------------------------------------------------------

/// Which content class a session should attempt to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    PrimaryDocument,
    AlternateRich,
    RawFallback,
    NoContent,
}

/// Caller-visible state of a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerState {
    #[default]
    Idle,
    Probing,
    Inaccessible,
    Accessible,
    RenderingPrimarySurface,
    RenderingSandboxedSurface,
    Loaded,
    AlternateRich,
    RawFallback,
    Failed,
    Disposed,
}

impl ViewerState {
    /// States in which no further work happens without caller action.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ViewerState::Loaded
                | ViewerState::AlternateRich
                | ViewerState::RawFallback
                | ViewerState::Failed
                | ViewerState::Disposed
        )
    }

    /// The rendering state for an embedded strategy.
    pub fn rendering(strategy: Strategy) -> Option<Self> {
        match strategy {
            Strategy::PrimarySurface => Some(ViewerState::RenderingPrimarySurface),
            Strategy::SandboxedSurface => Some(ViewerState::RenderingSandboxedSurface),
            Strategy::ExternalOnly => None,
        }
    }
}

/// Why a probe, render attempt, or session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("document host unreachable")]
    ProbeUnreachable,
    #[error("document is not of the expected kind")]
    ProbeContentMismatch,
    #[error("document host answered with a non-success status")]
    ProbeRejected,
    #[error("probe timed out")]
    ProbeTimedOut,
    #[error("probe attempts exhausted")]
    ProbeExhausted,
    #[error("render attempt timed out")]
    RenderTimedOut,
    #[error("render attempt failed")]
    RenderErrored,
    #[error("all render strategies failed")]
    StrategyExhausted,
    #[error("no content available to preview")]
    NoContentAvailable,
}

impl FailureReason {
    /// Whether this reason is ever surfaced to the caller as a terminal failure.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureReason::StrategyExhausted | FailureReason::NoContentAvailable
        )
    }
}

/// Actions offered to the user alongside a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOption {
    Retry,
    OpenExternally,
    SwitchToAlternate,
}
