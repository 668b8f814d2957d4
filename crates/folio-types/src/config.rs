//! Viewer configuration, loaded from TOML.
//!
//! Every section is optional; missing keys take the defaults below.
//!
//! ```toml
//! [relay]
//! enabled = true
//! endpoint = "https://relay.example.com/inline"
//! bypass_hosts = ["files.example.com"]
//!
//! [probe]
//! max_attempts = 3
//!
//! [render]
//! timeout_ms = 5000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FolioError, Result};

/// Top-level configuration for a viewer and all of its sessions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub relay: RelayConfig,
    pub probe: ProbeConfig,
    pub render: RenderConfig,
    pub http: HttpConfig,
}

/// Relay (header-normalizing proxy) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    /// Absolute `http(s)` URL of the relay endpoint.
    pub endpoint: Option<String>,
    /// Query parameter carrying the original reference.
    pub url_param: String,
    /// Hosts that already serve inline-friendly headers and skip the relay.
    pub bypass_hosts: Vec<String>,
    /// Hand the relay reference (rather than the original) to out-of-band
    /// openers.
    pub external_via_relay: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            url_param: "url".to_string(),
            bypass_hosts: Vec::new(),
            external_via_relay: true,
        }
    }
}

/// Accessibility probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub max_attempts: u32,
    pub per_attempt_timeout_ms: u64,
    pub delay_between_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout_ms: 10_000,
            delay_between_ms: 1_000,
        }
    }
}

/// Render strategy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Budget for each render attempt to signal load or error.
    pub timeout_ms: u64,
    /// Number of embedded strategies to try (1 or 2).
    pub max_strategy_attempts: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_strategy_attempts: 2,
        }
    }
}

/// Low-level HTTP client settings used by the probe transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_redirects: u8,
    /// Bytes of body read by a `GET` probe for content sniffing.
    pub sniff_bytes: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 15_000,
            max_redirects: 5,
            sniff_bytes: 1024,
            user_agent: "Folio/0.1".to_string(),
        }
    }
}

impl ViewerConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ViewerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded viewer config from {}", path.display());
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.probe.max_attempts == 0 {
            return Err(FolioError::Config(
                "probe.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.probe.per_attempt_timeout_ms == 0 {
            return Err(FolioError::Config(
                "probe.per_attempt_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.render.timeout_ms == 0 {
            return Err(FolioError::Config(
                "render.timeout_ms must be at least 1".to_string(),
            ));
        }
        if !(1..=2).contains(&self.render.max_strategy_attempts) {
            return Err(FolioError::Config(format!(
                "render.max_strategy_attempts must be 1 or 2, got {}",
                self.render.max_strategy_attempts,
            )));
        }
        if self.relay.url_param.trim().is_empty() {
            return Err(FolioError::Config(
                "relay.url_param must not be empty".to_string(),
            ));
        }
        if let Some(endpoint) = &self.relay.endpoint {
            let parsed = url::Url::parse(endpoint)
                .map_err(|e| FolioError::Config(format!("relay.endpoint: {e}")))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(FolioError::Config(format!(
                    "relay.endpoint must be http or https, got {}",
                    parsed.scheme(),
                )));
            }
        }
        if self.relay.enabled && self.relay.endpoint.is_none() {
            log::warn!("relay enabled without an endpoint; references will not be rewritten");
        }
        Ok(())
    }
}
