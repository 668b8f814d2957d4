//! Relay URL rewriting.
//!
//! Many document origins answer with `Content-Disposition: attachment` or
//! frame-blocking headers. The relay fetches the original resource and
//! re-serves it with headers that allow inline display; this module turns
//! an origin reference into the matching relay reference.

use folio_types::config::RelayConfig;
use url::Url;

/// Rewrites origin references into relay references.
///
/// `rewrite` is total: whenever the rules do not apply the original
/// reference comes back unchanged.
#[derive(Debug, Clone)]
pub struct RelayRewriter {
    endpoint: Option<Url>,
    param: String,
    bypass_hosts: Vec<String>,
}

impl RelayRewriter {
    /// Build a rewriter from config. A disabled relay or an endpoint that
    /// does not parse as an absolute `http(s)` URL yields a pass-through
    /// rewriter.
    pub fn new(config: &RelayConfig) -> Self {
        let endpoint = if config.enabled {
            config.endpoint.as_deref().and_then(|raw| match Url::parse(raw) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => Some(u),
                Ok(u) => {
                    log::warn!(
                        "relay endpoint has unsupported scheme {}; relay disabled",
                        u.scheme()
                    );
                    None
                },
                Err(e) => {
                    log::warn!("relay endpoint {raw:?} is invalid ({e}); relay disabled");
                    None
                },
            })
        } else {
            None
        };
        Self {
            endpoint,
            param: config.url_param.clone(),
            bypass_hosts: config
                .bypass_hosts
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// A rewriter that never rewrites.
    pub fn passthrough() -> Self {
        Self {
            endpoint: None,
            param: "url".to_string(),
            bypass_hosts: Vec::new(),
        }
    }

    /// Whether a relay endpoint is active.
    pub fn is_active(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Map `reference` to its relay reference, or return it unchanged.
    pub fn rewrite(&self, reference: &str) -> String {
        let Some(endpoint) = &self.endpoint else {
            return reference.to_string();
        };
        let trimmed = reference.trim();
        let Ok(origin) = Url::parse(trimmed) else {
            return reference.to_string();
        };
        if !matches!(origin.scheme(), "http" | "https") {
            return reference.to_string();
        }
        if self.is_relay_url(endpoint, &origin) {
            return reference.to_string();
        }
        if let Some(host) = origin.host_str()
            && self.bypass_hosts.iter().any(|b| b == &host.to_ascii_lowercase())
        {
            return reference.to_string();
        }

        let mut relay = endpoint.clone();
        relay.query_pairs_mut().append_pair(&self.param, trimmed);
        relay.to_string()
    }

    /// Recover the original reference from a relay reference produced by
    /// [`rewrite`](Self::rewrite).
    pub fn original_of(&self, reference: &str) -> Option<String> {
        let endpoint = self.endpoint.as_ref()?;
        let parsed = Url::parse(reference.trim()).ok()?;
        if !self.is_relay_url(endpoint, &parsed) {
            return None;
        }
        parsed
            .query_pairs()
            .find(|(k, _)| k == self.param.as_str())
            .map(|(_, v)| v.into_owned())
    }

    fn is_relay_url(&self, endpoint: &Url, candidate: &Url) -> bool {
        candidate.origin() == endpoint.origin()
            && candidate.path() == endpoint.path()
            && candidate.query_pairs().any(|(k, _)| k == self.param.as_str())
    }
}
