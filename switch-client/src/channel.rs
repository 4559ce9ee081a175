//! # Operation Channels
//!
//! Purpose: Own one persistent channel per operation kind, open it lazily,
//! and turn "send a frame, wait for the first event" into a single result.
//!
//! ## Design Principles
//! 1. **One Slot per Kind**: Channels live in a fixed array indexed by
//!    `OperationKind::channel_slot`; kinds never share a channel.
//! 2. **Serialized per Kind**: Each slot sits behind an async mutex held for
//!    the whole send/receive pair, so there is one in-flight call per channel
//!    while different kinds run in parallel.
//! 3. **First Event Wins**: A link resolves each exchange with exactly one
//!    message or one error; nothing outlives the call that installed it.
//! 4. **Close on Abandon**: A call that stops waiting (timeout, cancel) closes
//!    its channel so a late reply can never answer the next call.
//!
//! ## State Machine
//!
//! ```text
//! Unopened --open--> Opening --ok--> Open --close/error--> Closed
//!                       |                                     |
//!                       +--fail--> Closed <-------------------+
//! Closed --next call--> Opening
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use switch_common::{OperationKind, SwitchError, SwitchResult, CHANNEL_KINDS};

/// Lifecycle of one operation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Opening,
    Open,
    Closed,
}

/// Failure reported by a channel link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The channel closed before an event arrived.
    Closed,
    /// The transport reported an error event.
    Socket(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Closed => f.write_str("channel closed"),
            LinkError::Socket(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for LinkError {}

/// An open, message-oriented connection serving one operation kind.
#[async_trait]
pub trait ChannelLink: Send {
    /// Sends `payload` as one text frame and resolves with the first inbound
    /// message, or with the first error/close event.
    async fn exchange(&mut self, payload: String) -> Result<String, LinkError>;

    /// Returns false once the transport has closed or failed.
    fn is_open(&self) -> bool;

    /// Closes the channel. Idempotent.
    async fn close(&mut self);
}

/// Opens channel links; the open handshake completes before `open` returns.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, kind: OperationKind, endpoint: Url) -> Result<Box<dyn ChannelLink>, LinkError>;
}

struct ChannelSlot {
    state: ChannelState,
    link: Option<Box<dyn ChannelLink>>,
}

impl ChannelSlot {
    fn new() -> Self {
        ChannelSlot {
            state: ChannelState::Unopened,
            link: None,
        }
    }

    /// Folds a link that died between calls into the `Closed` state.
    fn observe(&mut self) {
        if self.state == ChannelState::Open && !self.link.as_ref().is_some_and(|link| link.is_open()) {
            self.state = ChannelState::Closed;
            self.link = None;
        }
    }

    async fn shut(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.state = ChannelState::Closed;
    }
}

enum Outcome {
    Reply(String),
    Failed(LinkError),
    TimedOut,
    Canceled,
}

/// The per-kind channels of one session.
pub(crate) struct ChannelSet {
    connector: Arc<dyn ChannelConnector>,
    base: Url,
    api_key: String,
    open_timeout: Duration,
    slots: [Mutex<ChannelSlot>; CHANNEL_KINDS],
}

impl ChannelSet {
    pub(crate) fn new(
        connector: Arc<dyn ChannelConnector>,
        base: Url,
        api_key: impl Into<String>,
        open_timeout: Duration,
    ) -> Self {
        ChannelSet {
            connector,
            base,
            api_key: api_key.into(),
            open_timeout,
            slots: std::array::from_fn(|_| Mutex::new(ChannelSlot::new())),
        }
    }

    /// Channel address: `{base}{Kind}?apiKey={key}&token={token}`.
    pub(crate) fn endpoint(&self, kind: OperationKind, token: &str) -> SwitchResult<Url> {
        let segment = kind
            .channel_segment()
            .ok_or_else(|| SwitchError::Configuration(format!("{kind} has no channel form")))?;
        let mut url = self
            .base
            .join(segment)
            .map_err(|err| SwitchError::Configuration(format!("{kind} channel address: {err}")))?;
        url.query_pairs_mut()
            .append_pair("apiKey", &self.api_key)
            .append_pair("token", token);
        Ok(url)
    }

    pub(crate) async fn state(&self, kind: OperationKind) -> ChannelState {
        match kind.channel_slot() {
            Some(idx) => {
                let mut slot = self.slots[idx].lock().await;
                slot.observe();
                slot.state
            }
            None => ChannelState::Unopened,
        }
    }

    /// Sends `payload` on the kind's channel, opening it first if needed, and
    /// returns the first inbound message.
    pub(crate) async fn call(
        &self,
        kind: OperationKind,
        token: &str,
        payload: String,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> SwitchResult<String> {
        let idx = kind
            .channel_slot()
            .ok_or_else(|| SwitchError::Configuration(format!("{kind} has no channel form")))?;
        let mut slot = self.slots[idx].lock().await;
        slot.observe();

        if slot.state != ChannelState::Open {
            self.open(&mut slot, kind, token, cancel).await?;
        }

        let outcome = match slot.link.as_mut() {
            Some(link) => first_event(link, payload, limit, cancel).await,
            None => Outcome::Failed(LinkError::Closed),
        };

        match outcome {
            Outcome::Reply(text) => Ok(text),
            Outcome::Failed(err) => {
                slot.shut().await;
                tracing::warn!(operation = %kind, error = %err, "channel reported an error");
                Err(SwitchError::remote_event(kind, err.to_string()))
            }
            Outcome::TimedOut => {
                slot.shut().await;
                Err(SwitchError::Timeout { operation: kind })
            }
            Outcome::Canceled => {
                slot.shut().await;
                Err(SwitchError::Canceled { operation: kind })
            }
        }
    }

    async fn open(
        &self,
        slot: &mut ChannelSlot,
        kind: OperationKind,
        token: &str,
        cancel: &CancellationToken,
    ) -> SwitchResult<()> {
        let endpoint = self.endpoint(kind, token)?;
        slot.state = ChannelState::Opening;
        tracing::debug!(operation = %kind, "opening channel");

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                slot.state = ChannelState::Closed;
                return Err(SwitchError::Canceled { operation: kind });
            }
            opened = tokio::time::timeout(self.open_timeout, self.connector.open(kind, endpoint)) => opened,
        };

        match opened {
            Ok(Ok(link)) => {
                slot.link = Some(link);
                slot.state = ChannelState::Open;
                tracing::info!(operation = %kind, "channel open");
                Ok(())
            }
            Ok(Err(err)) => {
                slot.state = ChannelState::Closed;
                Err(SwitchError::Transport {
                    message: format!("{kind} channel failed to open: {err}"),
                })
            }
            Err(_) => {
                slot.state = ChannelState::Closed;
                Err(SwitchError::Transport {
                    message: format!("{kind} channel open handshake timed out"),
                })
            }
        }
    }

    /// Closes every channel currently open and returns how many were closed.
    ///
    /// Waits for an in-flight call on a channel to finish before closing it.
    pub(crate) async fn close_open(&self) -> usize {
        let mut closed = 0;
        for (slot, kind) in self.slots.iter().zip(OperationKind::CHANNELED) {
            let mut slot = slot.lock().await;
            slot.observe();
            if slot.state == ChannelState::Open {
                slot.shut().await;
                closed += 1;
                tracing::info!(operation = %kind, "channel closed");
            }
        }
        closed
    }
}

async fn first_event(
    link: &mut Box<dyn ChannelLink>,
    payload: String,
    limit: Duration,
    cancel: &CancellationToken,
) -> Outcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Outcome::Canceled,
        waited = tokio::time::timeout(limit, link.exchange(payload)) => match waited {
            Ok(Ok(text)) => Outcome::Reply(text),
            Ok(Err(err)) => Outcome::Failed(err),
            Err(_) => Outcome::TimedOut,
        },
    }
}
