//! # SwitchDB Client
//!
//! Purpose: Provide a synchronous client for the SwitchDB list service that
//! exchanges an API key for an access credential and then issues list
//! operations over plain HTTP, HTTPS, or per-operation WebSocket channels.
//!
//! ## Design Principles
//! 1. **One Session, Three Transports**: The connection profile picks the
//!    transport; the operation API is the same for all of them.
//! 2. **Lazy Channels**: A channel opens on the first call of its kind and is
//!    reused until it fails or the session is aborted.
//! 3. **Typed Failures**: Every failure is a `SwitchError` that names the
//!    operation it came from.
//! 4. **Replaceable Transports**: HTTP and channel I/O sit behind traits so
//!    sessions can run against any server.

mod channel;
mod client;
mod config;
mod credential;
mod http;
mod transport;
mod ws;

#[cfg(test)]
mod testing;

pub use channel::{ChannelConnector, ChannelLink, ChannelState, LinkError};
pub use client::SwitchClient;
pub use config::{ClientConfig, DEFAULT_CHANNEL_BASE, DEFAULT_SERVICE_DOMAIN};
pub use http::{route, HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportFailure};
pub use transport::{Endpoints, Outbound, Route};
pub use ws::{WsConnector, WsLink, DEFAULT_HEARTBEAT};

// Re-export the shared model so callers need a single dependency.
pub use switch_common::{
    query, AccessCredential, Combinator, ConnectionProfile, ConnectionProfileBuilder, Filter, FilterOp,
    MailContent, MailEnvelope, OperationKind, Personalization, Query, Recipient, Sender, SignatureScheme, Sort,
    SortDirection, SwitchError, SwitchResult, TransportMode, UNLIMITED,
};
