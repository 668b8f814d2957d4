//! Content class resolution.

use folio_types::model::{ContentClass, PreviewRequest, ProbeResult};

/// Pick the content class to show for `request` given what the probe found.
///
/// A reachable primary document always wins; otherwise the first
/// non-empty fallback in priority order.
pub fn resolve(request: &PreviewRequest, probe: &ProbeResult) -> ContentClass {
    if probe.is_accessible() && request.primary().is_some() {
        ContentClass::PrimaryDocument
    } else if request.alternate().is_some() {
        ContentClass::AlternateRich
    } else if request.raw_fallback().is_some() {
        ContentClass::RawFallback
    } else {
        ContentClass::NoContent
    }
}
