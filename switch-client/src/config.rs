//! # Client Configuration
//!
//! Purpose: Collect the knobs that are not part of the connection profile:
//! where the service lives, how long to wait, and how to sign.
//!
//! ## Design Principles
//! 1. **Working Defaults**: `ClientConfig::default()` targets the public
//!    service domain with the reference timeouts and heartbeat.
//! 2. **Explicit Overrides**: Base addresses can be pinned individually, which
//!    is how tests and staging deployments point the client elsewhere.
//! 3. **TOML-Friendly**: Durations are stored as whole seconds so a config file
//!    stays plain.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use switch_common::{SignatureScheme, SwitchError, SwitchResult};

/// Public service domain; sessions resolve `{location}.{domain}`.
pub const DEFAULT_SERVICE_DOMAIN: &str = "switchapi.com";

/// Channel endpoint used when no override is configured.
///
/// This is a local development address. Production channel deployments must
/// set `channel_base`.
pub const DEFAULT_CHANNEL_BASE: &str = "ws://127.0.0.1:8000/";

/// Configuration for a `SwitchClient` session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Domain appended to the location, e.g. "switchapi.com".
    pub service_domain: String,
    /// Overrides the secure address used for the credential exchange.
    pub credential_base: Option<Url>,
    /// Overrides the request/response address for `http` and `https` modes.
    pub request_base: Option<Url>,
    /// Overrides the channel address for `websocket` mode.
    pub channel_base: Option<Url>,
    /// Upper bound on waiting for a response to one call.
    pub request_timeout_secs: u64,
    /// Upper bound on a channel's open handshake.
    pub open_timeout_secs: u64,
    /// Keep-alive ping interval on open channels.
    pub heartbeat_interval_secs: u64,
    /// Digest used to sign the credential request.
    pub signature: SignatureScheme,
    /// Worker threads of the session's runtime.
    pub worker_threads: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            service_domain: DEFAULT_SERVICE_DOMAIN.to_string(),
            credential_base: None,
            request_base: None,
            channel_base: None,
            request_timeout_secs: 30,
            open_timeout_secs: 10,
            heartbeat_interval_secs: 10,
            signature: SignatureScheme::LegacyMd5,
            worker_threads: 2,
        }
    }
}

impl ClientConfig {
    /// Parses a configuration from TOML; omitted keys keep their defaults.
    pub fn from_toml_str(text: &str) -> SwitchResult<Self> {
        let config: ClientConfig = toml::from_str(text)
            .map_err(|err| SwitchError::Configuration(format!("client config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make every call fail immediately.
    pub fn validate(&self) -> SwitchResult<()> {
        if self.service_domain.trim().is_empty() {
            return Err(SwitchError::Configuration("service_domain is required".into()));
        }
        if self.request_timeout_secs == 0 || self.open_timeout_secs == 0 {
            return Err(SwitchError::Configuration("timeouts must be non-zero".into()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(SwitchError::Configuration(
                "heartbeat_interval_secs must be non-zero".into(),
            ));
        }
        if self.worker_threads == 0 {
            return Err(SwitchError::Configuration("worker_threads must be non-zero".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[inline]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    #[inline]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
