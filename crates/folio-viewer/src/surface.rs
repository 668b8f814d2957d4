//! Rendering surface abstraction.
//!
//! The engine never draws anything itself. It tells a [`SurfaceHost`]
//! which surface to mount and with what reference; the host reports load
//! and error signals back through
//! [`Viewer::surface_loaded`](crate::Viewer::surface_loaded) and
//! [`Viewer::surface_errored`](crate::Viewer::surface_errored), echoing the
//! [`RenderTicket`] it was given.

use folio_types::model::{RenderTicket, Strategy};

/// Side effects of the viewer state machine on the embedding UI.
pub trait SurfaceHost {
    /// Mount an embedded surface for `reference` using `strategy`.
    fn mount(&mut self, ticket: RenderTicket, strategy: Strategy, reference: &str);

    /// Tear down whatever is mounted. Must be idempotent.
    fn unmount(&mut self);

    /// Display pre-rendered rich content.
    fn show_alternate(&mut self, content: &str);

    /// Display plain fallback content.
    fn show_raw(&mut self, content: &str);
}

/// A host with no display. Logs what it would have shown.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    mounted: Option<RenderTicket>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ticket of the currently mounted surface.
    pub fn mounted(&self) -> Option<RenderTicket> {
        self.mounted
    }
}

impl SurfaceHost for HeadlessSurface {
    fn mount(&mut self, ticket: RenderTicket, strategy: Strategy, reference: &str) {
        log::debug!(
            "mount {} {} attempt {} {strategy:?}: {reference}",
            ticket.session,
            ticket.epoch,
            ticket.attempt
        );
        self.mounted = Some(ticket);
    }

    fn unmount(&mut self) {
        self.mounted = None;
    }

    fn show_alternate(&mut self, content: &str) {
        self.mounted = None;
        log::debug!("show alternate content ({} bytes)", content.len());
    }

    fn show_raw(&mut self, content: &str) {
        self.mounted = None;
        log::debug!("show raw content ({} bytes)", content.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_types::model::{Epoch, SessionHandle};

    #[test]
    fn headless_tracks_mounted_ticket() {
        let mut host = HeadlessSurface::new();
        let ticket = RenderTicket {
            session: SessionHandle(1),
            epoch: Epoch(2),
            attempt: 1,
        };
        host.mount(ticket, Strategy::PrimarySurface, "https://a.example/x.pdf");
        assert_eq!(host.mounted(), Some(ticket));
        host.unmount();
        host.unmount();
        assert_eq!(host.mounted(), None);
    }
}
