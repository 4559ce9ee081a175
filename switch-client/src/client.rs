//! # Synchronous Session API
//!
//! Purpose: Expose a compact, blocking API (`connect`, `list`, `add`, `set`,
//! `delete`, `send_mail`, `abort`) over whichever transport the connection
//! profile selects.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `SwitchClient` hides the credential exchange, the
//!    transport choice, and channel management.
//! 2. **Gate on the Credential**: Every operation checks for an access
//!    credential before doing anything else.
//! 3. **Validate Before I/O**: Queries and items are encoded before a
//!    transport is touched, so malformed input never reaches the wire.
//! 4. **Async Inside, Blocking Outside**: The session owns a tokio runtime;
//!    each call is one future driven to completion on the caller's thread.
//!
//! Blocking methods must not be called from inside an async runtime.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use switch_common::query;
use switch_common::{
    AccessCredential, ConnectionProfile, MailEnvelope, OperationKind, Query, SwitchError,
    SwitchResult, TransportMode,
};

use crate::channel::{ChannelConnector, ChannelSet, ChannelState};
use crate::config::ClientConfig;
use crate::credential;
use crate::http::{HttpTransport, ReqwestTransport, RequestAdapter};
use crate::transport::{Endpoints, Outbound, Route};
use crate::ws::WsConnector;

/// A session with the SwitchDB service.
///
/// Create it, call [`connect`](SwitchClient::connect) once, issue operations,
/// and [`abort`](SwitchClient::abort) to close any open channels.
pub struct SwitchClient {
    profile: ConnectionProfile,
    config: ClientConfig,
    endpoints: Endpoints,
    route: Route,
    http: Arc<dyn HttpTransport>,
    requests: RequestAdapter,
    relay: RequestAdapter,
    channels: ChannelSet,
    credential: RwLock<Option<AccessCredential>>,
    runtime: Runtime,
}

impl SwitchClient {
    /// Creates a session for `location` with default configuration.
    pub fn new(location: &str, profile: ConnectionProfile) -> SwitchResult<Self> {
        Self::with_config(location, profile, ClientConfig::default())
    }

    /// Creates a session using `reqwest` and WebSocket transports.
    pub fn with_config(location: &str, profile: ConnectionProfile, config: ClientConfig) -> SwitchResult<Self> {
        let http = Arc::new(ReqwestTransport::new()?);
        let channels = Arc::new(WsConnector::new(config.heartbeat_interval()));
        Self::with_transports(location, profile, config, http, channels)
    }

    /// Creates a session over caller-supplied transports.
    pub fn with_transports(
        location: &str,
        profile: ConnectionProfile,
        config: ClientConfig,
        http: Arc<dyn HttpTransport>,
        connector: Arc<dyn ChannelConnector>,
    ) -> SwitchResult<Self> {
        config.validate()?;
        let endpoints = Endpoints::resolve(location, profile.transport(), &config)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("switch-client")
            .enable_all()
            .build()
            .map_err(|err| SwitchError::Configuration(format!("runtime: {err}")))?;

        let requests = RequestAdapter::new(http.clone(), endpoints.base.clone(), profile.api_key());
        let relay = RequestAdapter::new(http.clone(), endpoints.relay.clone(), profile.api_key());
        let channels = ChannelSet::new(
            connector,
            endpoints.base.clone(),
            profile.api_key(),
            config.open_timeout(),
        );

        tracing::debug!(
            mode = %profile.transport(),
            base = %endpoints.base,
            "session created"
        );

        Ok(SwitchClient {
            route: Route::for_mode(profile.transport()),
            profile,
            config,
            endpoints,
            http,
            requests,
            relay,
            channels,
            credential: RwLock::new(None),
            runtime,
        })
    }

    /// Obtains the access credential over the secure address.
    ///
    /// Channels are not opened here; each opens on its first use. When an
    /// earlier credential is replaced, channels opened with it are closed.
    ///
    /// # Errors
    /// `SwitchError::Credential` when the exchange fails or times out.
    pub fn connect(&self) -> SwitchResult<()> {
        let limit = self.config.request_timeout();
        let exchange = credential::exchange(
            self.http.as_ref(),
            &self.endpoints.credential,
            &self.profile,
            self.config.signature,
        );
        let credential = self
            .runtime
            .block_on(async { tokio::time::timeout(limit, exchange).await })
            .unwrap_or_else(|_| {
                Err(SwitchError::Credential {
                    status: None,
                    message: "token request timed out".into(),
                })
            })
            .inspect_err(|err| tracing::warn!(error = %err, "credential exchange failed"))?;

        if credential.is_expired(chrono::Utc::now()) {
            tracing::warn!(expires_at = %credential.expires_at(), "access credential is already expired");
        }
        let replaced = self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(credential)
            .is_some();
        if replaced && self.route == Route::Channel {
            let closed = self.runtime.block_on(self.channels.close_open());
            tracing::debug!(closed, "closed channels opened with the previous credential");
        }
        tracing::info!(mode = %self.profile.transport(), "connected");
        Ok(())
    }

    /// Closes every open channel. A no-op outside channel mode, and never
    /// fails for channels that were never opened.
    pub fn abort(&self) -> SwitchResult<()> {
        if self.route != Route::Channel {
            return Ok(());
        }
        let closed = self.runtime.block_on(self.channels.close_open());
        tracing::info!(closed, "session aborted");
        Ok(())
    }

    /// Returns true once `connect` has stored a credential.
    pub fn is_connected(&self) -> bool {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    #[inline]
    pub fn transport_mode(&self) -> TransportMode {
        self.profile.transport()
    }

    /// Current state of the channel serving `kind`.
    ///
    /// Always `Unopened` outside channel mode.
    pub fn channel_state(&self, kind: OperationKind) -> ChannelState {
        self.runtime.block_on(self.channels.state(kind))
    }

    /// Runs a query and returns the matching rows.
    pub fn list(&self, query: &Query) -> SwitchResult<Vec<Value>> {
        self.list_cancellable(query, &CancellationToken::new())
    }

    pub fn list_cancellable(&self, query: &Query, cancel: &CancellationToken) -> SwitchResult<Vec<Value>> {
        let kind = OperationKind::List;
        let token = self.access_token()?;
        let outbound = Outbound::List {
            query: query::encode(query)?,
        };
        let body = self.dispatch(kind, &token, outbound, cancel)?;
        serde_json::from_str(&body).map_err(|source| SwitchError::Decode { operation: kind, source })
    }

    /// Adds `item` to `list` and returns the stored record.
    pub fn add<T: Serialize + ?Sized>(&self, list: &str, item: &T) -> SwitchResult<Value> {
        self.add_cancellable(list, item, &CancellationToken::new())
    }

    pub fn add_cancellable<T: Serialize + ?Sized>(
        &self,
        list: &str,
        item: &T,
        cancel: &CancellationToken,
    ) -> SwitchResult<Value> {
        self.write(OperationKind::Add, list, item, cancel)
    }

    /// Updates `item` in `list` and returns the stored record.
    pub fn set<T: Serialize + ?Sized>(&self, list: &str, item: &T) -> SwitchResult<Value> {
        self.set_cancellable(list, item, &CancellationToken::new())
    }

    pub fn set_cancellable<T: Serialize + ?Sized>(
        &self,
        list: &str,
        item: &T,
        cancel: &CancellationToken,
    ) -> SwitchResult<Value> {
        self.write(OperationKind::Set, list, item, cancel)
    }

    /// Removes the item with `item_id` from `list`.
    pub fn delete(&self, list: &str, item_id: &str) -> SwitchResult<Value> {
        self.delete_cancellable(list, item_id, &CancellationToken::new())
    }

    pub fn delete_cancellable(&self, list: &str, item_id: &str, cancel: &CancellationToken) -> SwitchResult<Value> {
        let kind = OperationKind::Delete;
        let token = self.access_token()?;
        let outbound = Outbound::Delete {
            list: list.to_string(),
            item_id: item_id.to_string(),
        };
        let body = self.dispatch(kind, &token, outbound, cancel)?;
        decode_record(kind, &body)
    }

    /// Sends `envelope` through the service's mail relay.
    ///
    /// Always a request/response call; in channel mode it uses the secure
    /// address.
    pub fn send_mail(&self, envelope: &MailEnvelope) -> SwitchResult<Value> {
        let kind = OperationKind::SendMail;
        let token = self.access_token()?;
        let outbound = Outbound::Mail {
            envelope: serde_json::to_string(envelope)
                .map_err(|source| SwitchError::Encode { operation: kind, source })?,
        };
        let body = self.dispatch(kind, &token, outbound, &CancellationToken::new())?;
        decode_record(kind, &body)
    }

    fn write<T: Serialize + ?Sized>(
        &self,
        kind: OperationKind,
        list: &str,
        item: &T,
        cancel: &CancellationToken,
    ) -> SwitchResult<Value> {
        let token = self.access_token()?;
        let outbound = Outbound::Write {
            list: list.to_string(),
            item: serde_json::to_string(item)
                .map_err(|source| SwitchError::Encode { operation: kind, source })?,
        };
        let body = self.dispatch(kind, &token, outbound, cancel)?;
        decode_record(kind, &body)
    }

    fn access_token(&self) -> SwitchResult<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|credential| credential.token().to_string())
            .ok_or(SwitchError::NotConnected)
    }

    fn dispatch(
        &self,
        kind: OperationKind,
        token: &str,
        outbound: Outbound,
        cancel: &CancellationToken,
    ) -> SwitchResult<String> {
        let limit = self.config.request_timeout();
        let result = match self.route.for_operation(kind) {
            Route::Channel => self.runtime.block_on(self.channels.call(
                kind,
                token,
                outbound.into_channel_text(),
                limit,
                cancel,
            )),
            Route::RequestResponse => {
                let adapter = if kind == OperationKind::SendMail {
                    &self.relay
                } else {
                    &self.requests
                };
                self.block_with(kind, cancel, adapter.call(kind, token, &outbound))
            }
        };
        if let Err(err) = &result {
            tracing::warn!(operation = %kind, error = %err, "call failed");
        }
        result
    }

    /// Drives `call` on the session runtime until it finishes, times out, or
    /// `cancel` fires.
    fn block_with<F>(&self, kind: OperationKind, cancel: &CancellationToken, call: F) -> SwitchResult<String>
    where
        F: Future<Output = SwitchResult<String>>,
    {
        let limit = self.config.request_timeout();
        self.runtime.block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SwitchError::Canceled { operation: kind }),
                finished = tokio::time::timeout(limit, call) => {
                    finished.unwrap_or(Err(SwitchError::Timeout { operation: kind }))
                }
            }
        })
    }
}

/// Decodes a single-record response. An empty body decodes to `null`.
fn decode_record(kind: OperationKind, body: &str) -> SwitchResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|source| SwitchError::Decode { operation: kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, LinkEvent, SpyHttp};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use switch_common::{FilterOp, SortDirection};

    const TOKEN_OK: &str = r#"{"AccessToken":"tok/1+2"}"#;

    struct Harness {
        client: SwitchClient,
        http: Arc<SpyHttp>,
        channels: Arc<FakeConnector>,
    }

    fn harness(mode: TransportMode) -> Harness {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let profile = ConnectionProfile::new("key-1", "s3cr3t", mode, expiry).unwrap();
        let http = Arc::new(SpyHttp::default());
        let channels = Arc::new(FakeConnector::default());
        let client = SwitchClient::with_transports(
            "eu",
            profile,
            ClientConfig::default(),
            http.clone(),
            channels.clone(),
        )
        .expect("client");
        Harness {
            client,
            http,
            channels,
        }
    }

    fn connected(mode: TransportMode) -> Harness {
        let harness = harness(mode);
        harness.http.respond(200, TOKEN_OK);
        harness.client.connect().expect("connect");
        harness
    }

    fn users() -> Query {
        Query::on("users")
            .filter(FilterOp::Equal, "name", "bob")
            .order_by(SortDirection::Ascending, "id")
    }

    const ALL_MODES: [TransportMode; 3] = [TransportMode::Http, TransportMode::Https, TransportMode::WebSocket];

    #[test]
    fn operations_before_connect_fail_in_every_mode() {
        for mode in ALL_MODES {
            let h = harness(mode);
            assert!(matches!(h.client.list(&users()), Err(SwitchError::NotConnected)));
            assert!(matches!(h.client.add("users", &json!({})), Err(SwitchError::NotConnected)));
            assert!(matches!(h.client.set("users", &json!({})), Err(SwitchError::NotConnected)));
            assert!(matches!(h.client.delete("users", "1"), Err(SwitchError::NotConnected)));
            assert_eq!(h.http.calls(), 0, "{mode}");
            assert_eq!(h.channels.opens(), 0, "{mode}");
        }
    }

    #[test]
    fn connect_always_uses_the_secure_address() {
        for mode in ALL_MODES {
            let h = connected(mode);
            let requests = h.http.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].url.as_str(), "https://eu.switchapi.com/Token");
            assert!(h.client.is_connected());
        }
    }

    #[test]
    fn connect_does_not_open_channels() {
        let h = connected(TransportMode::WebSocket);
        assert_eq!(h.channels.opens(), 0);
        for kind in OperationKind::CHANNELED {
            assert_eq!(h.client.channel_state(kind), ChannelState::Unopened);
        }
    }

    #[test]
    fn rejected_token_leaves_session_disconnected() {
        let h = harness(TransportMode::Https);
        h.http.respond(403, "expired");
        assert!(matches!(
            h.client.connect(),
            Err(SwitchError::Credential { status: Some(403), .. })
        ));
        assert!(!h.client.is_connected());
    }

    #[test]
    fn invalid_query_never_reaches_a_transport() {
        for mode in ALL_MODES {
            let h = connected(mode);
            let before = h.http.calls();
            let unsorted = Query::on("users");
            let unnamed = Query::on("").order_by(SortDirection::Ascending, "id");
            assert!(matches!(h.client.list(&unsorted), Err(SwitchError::InvalidQuery(_))));
            assert!(matches!(h.client.list(&unnamed), Err(SwitchError::InvalidQuery(_))));
            assert_eq!(h.http.calls(), before);
            assert_eq!(h.channels.opens(), 0);
        }
    }

    #[test]
    fn add_decodes_ok_response() {
        let h = connected(TransportMode::Https);
        h.http.respond(200, r#"{"id":"1"}"#);
        let record = h.client.add("users", &json!({"name": "bob"})).unwrap();
        assert_eq!(record, json!({"id": "1"}));

        let sent = h.http.requests().pop().unwrap();
        assert_eq!(sent.url.as_str(), "https://eu.switchapi.com/Add");
        assert_eq!(sent.header("AccessToken"), Some("tok/1+2"));
        assert_eq!(sent.header("List"), Some("users"));
        assert_eq!(sent.body.as_deref(), Some(r#"{"name":"bob"}"#));
    }

    #[test]
    fn add_maps_server_error_to_remote_error() {
        let h = connected(TransportMode::Http);
        h.http.respond(500, "boom");
        let err = h.client.add("users", &json!({})).unwrap_err();
        assert!(matches!(
            err,
            SwitchError::Remote { operation: OperationKind::Add, status: Some(500), .. }
        ));
        assert!(h.client.is_connected());
    }

    #[test]
    fn plain_mode_sends_data_calls_over_http() {
        let h = connected(TransportMode::Http);
        h.http.respond(200, r#"[{"id":"1"},{"id":"2"}]"#);
        let rows = h.client.list(&users()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(h.http.requests()[1].url.as_str(), "http://eu.switchapi.com/List");
    }

    #[test]
    fn undecodable_list_body_is_decode_error() {
        let h = connected(TransportMode::Https);
        h.http.respond(200, r#"{"not":"a list"}"#);
        assert!(matches!(
            h.client.list(&users()),
            Err(SwitchError::Decode { operation: OperationKind::List, .. })
        ));
    }

    #[test]
    fn empty_delete_body_is_null() {
        let h = connected(TransportMode::Https);
        h.http.respond(200, "");
        assert_eq!(h.client.delete("users", "1").unwrap(), Value::Null);
    }

    #[test]
    fn channel_list_returns_first_message() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![LinkEvent::Reply(r#"[{"id":"1"}]"#.into())]);
        let rows = h.client.list(&users()).unwrap();
        assert_eq!(rows, vec![json!({"id": "1"})]);

        let (kind, endpoint) = h.channels.endpoints().pop().unwrap();
        assert_eq!(kind, OperationKind::List);
        assert_eq!(
            endpoint.as_str(),
            "ws://127.0.0.1:8000/List?apiKey=key-1&token=tok%2F1%2B2"
        );
        assert_eq!(h.channels.sent(), vec![query::encode(&users()).unwrap()]);
        assert_eq!(h.http.calls(), 1);
    }

    #[test]
    fn channel_error_event_is_remote_error() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![LinkEvent::Fail("socket reset".into())]);
        let err = h.client.list(&users()).unwrap_err();
        assert!(matches!(
            err,
            SwitchError::Remote { operation: OperationKind::List, status: None, .. }
        ));
    }

    #[test]
    fn sequential_lists_share_one_channel() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![
            LinkEvent::Reply("[]".into()),
            LinkEvent::Reply(r#"[{"id":"7"}]"#.into()),
        ]);
        let other = Query::on("orders").order_by(SortDirection::Descending, "created");
        assert!(h.client.list(&users()).unwrap().is_empty());
        assert_eq!(h.client.list(&other).unwrap().len(), 1);
        assert_eq!(h.channels.opens(), 1);
        assert_eq!(h.client.channel_state(OperationKind::List), ChannelState::Open);
    }

    #[test]
    fn kinds_get_their_own_channels() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![LinkEvent::Reply(r#"{"id":"1"}"#.into())]);
        h.channels.script(vec![LinkEvent::Reply(r#"{"deleted":true}"#.into())]);
        h.client.add("users", &json!({"name": "bob"})).unwrap();
        h.client.delete("users", "1").unwrap();

        let kinds: Vec<_> = h.channels.endpoints().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![OperationKind::Add, OperationKind::Delete]);
        assert_eq!(h.channels.sent(), vec![r#"{"name":"bob"}"#.to_string(), "1".to_string()]);
    }

    #[test]
    fn reconnect_reopens_channels_with_the_new_token() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![LinkEvent::Reply("[]".into())]);
        h.client.list(&users()).unwrap();

        h.http.respond(200, r#"{"AccessToken":"tok-2"}"#);
        h.client.connect().unwrap();
        assert_eq!(h.channels.closes(), 1);
        assert_eq!(h.client.channel_state(OperationKind::List), ChannelState::Closed);

        h.channels.script(vec![LinkEvent::Reply("[]".into())]);
        h.client.list(&users()).unwrap();
        assert_eq!(h.channels.opens(), 2);
        let (_, endpoint) = h.channels.endpoints().pop().unwrap();
        assert_eq!(endpoint.query(), Some("apiKey=key-1&token=tok-2"));
    }

    #[test]
    fn abort_without_channels_closes_nothing() {
        for mode in ALL_MODES {
            let h = connected(mode);
            h.client.abort().unwrap();
            assert_eq!(h.channels.closes(), 0);
        }
    }

    #[test]
    fn abort_closes_open_channels_only() {
        let h = connected(TransportMode::WebSocket);
        h.channels.script(vec![LinkEvent::Reply("[]".into())]);
        h.client.list(&users()).unwrap();
        h.client.abort().unwrap();
        assert_eq!(h.channels.closes(), 1);
        assert_eq!(h.client.channel_state(OperationKind::List), ChannelState::Closed);
        assert_eq!(h.client.channel_state(OperationKind::Add), ChannelState::Unopened);
    }

    #[test]
    fn mail_relay_uses_secure_address_in_channel_mode() {
        let h = connected(TransportMode::WebSocket);
        h.http.respond(200, r#"{"sent":true}"#);
        let envelope = MailEnvelope::from_sender("noreply@example.com", "Example")
            .to(["a@example.com"], "Hi")
            .body("text/plain", "hello");
        assert_eq!(h.client.send_mail(&envelope).unwrap(), json!({"sent": true}));
        let sent = h.http.requests().pop().unwrap();
        assert_eq!(sent.url.as_str(), "https://eu.switchapi.com/SendGrid/Send");
        assert_eq!(h.channels.opens(), 0);
    }

    #[test]
    fn mail_requires_a_session() {
        let h = harness(TransportMode::Https);
        let envelope = MailEnvelope::from_sender("noreply@example.com", "Example");
        assert!(matches!(h.client.send_mail(&envelope), Err(SwitchError::NotConnected)));
    }

    #[test]
    fn cancelled_request_reports_canceled() {
        let h = connected(TransportMode::Https);
        h.http.respond(200, "[]");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            h.client.list_cancellable(&users(), &cancel),
            Err(SwitchError::Canceled { operation: OperationKind::List })
        ));
    }
}
