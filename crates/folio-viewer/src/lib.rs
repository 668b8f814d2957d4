//! Folio viewer: resolves what to show for a document preview and drives
//! the probe and render fallback state machine for each session.

pub mod notifier;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod surface;
pub mod viewer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use notifier::{LogNotifier, Notifier, NullNotifier};
pub use resolver::resolve;
pub use session::{SessionSettings, SessionTimer, ViewerSession};
pub use snapshot::SessionSnapshot;
pub use surface::{HeadlessSurface, SurfaceHost};
pub use viewer::Viewer;
