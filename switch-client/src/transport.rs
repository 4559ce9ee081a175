//! # Transport Selection
//!
//! Purpose: Decide, from the profile's transport mode, whether an operation is
//! carried by a request/response call or by a persistent channel, and resolve
//! the base addresses each path uses.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The mode is resolved once into a `Route`; call
//!    sites match on it instead of re-inspecting the mode.
//! 2. **Secure Credential Path**: The credential exchange always resolves to an
//!    `https` address, whatever mode the session runs in.
//! 3. **Directory Bases**: Every base address ends in `/`, so joining a path
//!    segment never replaces part of the base.

use url::Url;

use switch_common::{OperationKind, SwitchError, SwitchResult, TransportMode};

use crate::config::{ClientConfig, DEFAULT_CHANNEL_BASE};

/// Path that carries an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RequestResponse,
    Channel,
}

impl Route {
    /// Route for data operations in the given mode.
    pub fn for_mode(mode: TransportMode) -> Self {
        if mode.is_channel() {
            Route::Channel
        } else {
            Route::RequestResponse
        }
    }

    /// Route for a specific operation. Request-only kinds (the mail relay)
    /// always use request/response.
    pub fn for_operation(self, kind: OperationKind) -> Self {
        match (self, kind.channel_slot()) {
            (Route::Channel, Some(_)) => Route::Channel,
            _ => Route::RequestResponse,
        }
    }
}

/// Resolved base addresses for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Where `GET Token` is sent. Always secure unless overridden.
    pub credential: Url,
    /// Base for data operations: `http(s)://...` or `ws://...`.
    pub base: Url,
    /// Base for request-only operations such as the mail relay.
    pub relay: Url,
}

impl Endpoints {
    /// Resolves addresses for `location` under the given mode and config.
    ///
    /// # Errors
    /// Returns `SwitchError::Configuration` for an empty location or an address
    /// that does not parse.
    pub fn resolve(location: &str, mode: TransportMode, config: &ClientConfig) -> SwitchResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(SwitchError::Configuration("location is required".into()));
        }

        let host = format!("{location}.{}", config.service_domain);
        let credential = match &config.credential_base {
            Some(url) => directory(url.clone()),
            None => parse_base(&format!("https://{host}/"))?,
        };

        let request = |scheme: &str| -> SwitchResult<Url> {
            match &config.request_base {
                Some(url) => Ok(directory(url.clone())),
                None => parse_base(&format!("{scheme}://{host}/")),
            }
        };

        let (base, relay) = match mode {
            TransportMode::Http => {
                let base = request("http")?;
                (base.clone(), base)
            }
            TransportMode::Https => {
                let base = request("https")?;
                (base.clone(), base)
            }
            TransportMode::WebSocket => {
                let base = match &config.channel_base {
                    Some(url) => directory(url.clone()),
                    None => parse_base(DEFAULT_CHANNEL_BASE)?,
                };
                // The relay has no channel form; it rides the secure address.
                (base, credential.clone())
            }
        };

        Ok(Endpoints {
            credential,
            base,
            relay,
        })
    }
}

/// Payload of one outbound operation, shaped per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded query document.
    List { query: String },
    /// Serialized item for `add` or `set`.
    Write { list: String, item: String },
    /// Raw item identifier.
    Delete { list: String, item_id: String },
    /// Serialized mail envelope.
    Mail { envelope: String },
}

impl Outbound {
    /// Target list, when the operation names one.
    pub fn list(&self) -> Option<&str> {
        match self {
            Outbound::Write { list, .. } | Outbound::Delete { list, .. } => Some(list),
            Outbound::List { .. } | Outbound::Mail { .. } => None,
        }
    }

    /// Request body for request/response calls. Deletes carry no body.
    pub fn body(&self) -> Option<&str> {
        match self {
            Outbound::List { query } => Some(query),
            Outbound::Write { item, .. } => Some(item),
            Outbound::Delete { .. } => None,
            Outbound::Mail { envelope } => Some(envelope),
        }
    }

    /// Text frame sent over a channel.
    pub fn into_channel_text(self) -> String {
        match self {
            Outbound::List { query } => query,
            Outbound::Write { item, .. } => item,
            Outbound::Delete { item_id, .. } => item_id,
            Outbound::Mail { envelope } => envelope,
        }
    }
}

fn parse_base(text: &str) -> SwitchResult<Url> {
    Url::parse(text)
        .map(directory)
        .map_err(|err| SwitchError::Configuration(format!("invalid address {text}: {err}")))
}

fn directory(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
