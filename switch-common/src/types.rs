//! # Session Type Definitions
//!
//! Core data types shared by every transport: the connection profile a
//! session is created from, the operation kinds the service exposes, and the
//! access credential obtained at connect time.
//!
//! ## Design Principles
//!
//! 1. **Immutable Profiles**: A `ConnectionProfile` is validated once and never
//!    mutated after a session starts.
//! 2. **Closed Operation Set**: `OperationKind` is a fixed enum so per-kind
//!    resources (channels) can live in fixed-size arrays instead of maps.
//! 3. **Redacted Secrets**: `Debug` output never prints the service secret or
//!    the bearer token.
//!
//! ## Profile TOML Example
//!
//! ```text
//! api_key = "my-key"
//! api_secret = "my-secret"
//! transport = "https"          # "http" | "https" | "websocket"
//! expires_at = "2030-01-01T00:00:00Z"
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SwitchError, SwitchResult};

/// Number of operation kinds that own a persistent channel.
pub const CHANNEL_KINDS: usize = 4;

/// Transport strategy selected per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Plain request/response (`http://`).
    Http,
    /// Secure request/response (`https://`).
    Https,
    /// Persistent message channel per operation kind (`ws://`).
    #[serde(alias = "channel")]
    WebSocket,
}

impl TransportMode {
    /// Returns true when operations run over persistent channels.
    #[inline]
    pub fn is_channel(self) -> bool {
        matches!(self, TransportMode::WebSocket)
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportMode::Http => "http",
            TransportMode::Https => "https",
            TransportMode::WebSocket => "websocket",
        };
        f.write_str(name)
    }
}

/// Remote operations exposed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    List,
    Add,
    Set,
    Delete,
    /// Mail relay passthrough. Never carried over a channel.
    SendMail,
}

impl OperationKind {
    /// Kinds that own a dedicated channel in channel mode, in slot order.
    pub const CHANNELED: [OperationKind; CHANNEL_KINDS] = [
        OperationKind::List,
        OperationKind::Add,
        OperationKind::Set,
        OperationKind::Delete,
    ];

    /// Slot index of this kind's channel, or `None` for request-only kinds.
    #[inline]
    pub fn channel_slot(self) -> Option<usize> {
        match self {
            OperationKind::List => Some(0),
            OperationKind::Add => Some(1),
            OperationKind::Set => Some(2),
            OperationKind::Delete => Some(3),
            OperationKind::SendMail => None,
        }
    }

    /// Path segment used for the channel address (`{base}{segment}?...`),
    /// or `None` for request-only kinds.
    pub fn channel_segment(self) -> Option<&'static str> {
        match self {
            OperationKind::List => Some("List"),
            OperationKind::Add => Some("Add"),
            OperationKind::Set => Some("Set"),
            OperationKind::Delete => Some("Delete"),
            OperationKind::SendMail => None,
        }
    }

    /// Lowercase name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Add => "add",
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
            OperationKind::SendMail => "send_mail",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials and transport choice a session is created from.
///
/// All four fields are mandatory. Build with [`ConnectionProfile::new`],
/// [`ConnectionProfile::builder`], or [`ConnectionProfile::from_toml_str`];
/// every path runs the same validation.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionProfile {
    api_key: String,
    api_secret: String,
    transport: TransportMode,
    expires_at: DateTime<Utc>,
}

impl ConnectionProfile {
    /// Creates a validated profile.
    ///
    /// # Errors
    /// Returns `SwitchError::Configuration` if the key or secret is empty.
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        transport: TransportMode,
        expires_at: DateTime<Utc>,
    ) -> SwitchResult<Self> {
        let profile = ConnectionProfile {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            transport,
            expires_at,
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Starts a builder with every field unset.
    pub fn builder() -> ConnectionProfileBuilder {
        ConnectionProfileBuilder::default()
    }

    /// Parses and validates a profile from TOML text.
    pub fn from_toml_str(text: &str) -> SwitchResult<Self> {
        let profile: ConnectionProfile = toml::from_str(text)
            .map_err(|err| SwitchError::Configuration(format!("connection profile: {err}")))?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> SwitchResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(SwitchError::Configuration("api_key is required".into()));
        }
        if self.api_secret.is_empty() {
            return Err(SwitchError::Configuration("api_secret is required".into()));
        }
        Ok(())
    }

    /// Service key sent as `APIKey`.
    #[inline]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Shared secret used only for signing.
    #[inline]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    #[inline]
    pub fn transport(&self) -> TransportMode {
        self.transport
    }

    /// Wall-clock instant the requested credential expires at.
    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("transport", &self.transport)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Builder that reports the first missing field as a configuration error.
#[derive(Debug, Default, Clone)]
pub struct ConnectionProfileBuilder {
    api_key: Option<String>,
    api_secret: Option<String>,
    transport: Option<TransportMode>,
    expires_at: Option<DateTime<Utc>>,
}

impl ConnectionProfileBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
        self.api_secret = Some(secret.into());
        self
    }

    pub fn transport(mut self, mode: TransportMode) -> Self {
        self.transport = Some(mode);
        self
    }

    pub fn expires_at(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_at = Some(instant);
        self
    }

    /// Validates and builds the profile.
    ///
    /// # Errors
    /// Returns `SwitchError::Configuration` naming the first missing field.
    pub fn build(self) -> SwitchResult<ConnectionProfile> {
        let api_key = self.api_key.ok_or_else(|| missing("api_key"))?;
        let api_secret = self.api_secret.ok_or_else(|| missing("api_secret"))?;
        let transport = self.transport.ok_or_else(|| missing("transport"))?;
        let expires_at = self.expires_at.ok_or_else(|| missing("expires_at"))?;
        ConnectionProfile::new(api_key, api_secret, transport, expires_at)
    }
}

fn missing(field: &str) -> SwitchError {
    SwitchError::Configuration(format!("{field} is required"))
}

/// Short-lived bearer token returned by the credential exchange.
///
/// The client never refreshes it; once `expires_at` passes, the remote end
/// rejects calls made with it.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessCredential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        AccessCredential {
            token: token.into(),
            expires_at,
        }
    }

    /// Raw token sent as `AccessToken`.
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
