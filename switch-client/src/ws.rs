//! # WebSocket Channels
//!
//! Purpose: `ChannelConnector` over `tokio-tungstenite`. Each open channel is
//! driven by one background pump task that owns the socket, sends keep-alive
//! pings, and hands the first inbound event to whichever call is waiting.
//!
//! ## Design Principles
//! 1. **Single Owner**: Only the pump touches the socket; calls talk to it
//!    through a command queue.
//! 2. **Single-Use Reply Slot**: Each `Send` command carries a `oneshot`
//!    sender. The pump resolves it with the first message or error and then
//!    forgets it, so replies never accumulate across calls.
//! 3. **Heartbeat Between Calls**: The pump pings on a fixed interval even
//!    when no call is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use switch_common::OperationKind;

use crate::channel::{ChannelConnector, ChannelLink, LinkError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<String, LinkError>>;

/// Interval between keep-alive pings on an open channel.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

enum Command {
    Send { payload: String, reply: Reply },
    Close,
}

/// Opens WebSocket channels.
#[derive(Debug, Clone)]
pub struct WsConnector {
    heartbeat: Duration,
}

impl WsConnector {
    pub fn new(heartbeat: Duration) -> Self {
        WsConnector { heartbeat }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        WsConnector::new(DEFAULT_HEARTBEAT)
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, kind: OperationKind, endpoint: Url) -> Result<Box<dyn ChannelLink>, LinkError> {
        let (socket, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|err| LinkError::Socket(err.to_string()))?;

        let open = Arc::new(AtomicBool::new(true));
        let (commands, inbox) = mpsc::channel(1);
        let pump = tokio::spawn(pump(kind, socket, inbox, open.clone(), self.heartbeat));

        Ok(Box::new(WsLink {
            commands,
            open,
            pump: Some(pump),
        }))
    }
}

/// Handle to one pumped WebSocket.
pub struct WsLink {
    commands: mpsc::Sender<Command>,
    open: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl ChannelLink for WsLink {
    async fn exchange(&mut self, payload: String) -> Result<String, LinkError> {
        if !self.is_open() {
            return Err(LinkError::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send { payload, reply })
            .await
            .map_err(|_| LinkError::Closed)?;
        response.await.map_err(|_| LinkError::Closed)?
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&mut self) {
        let _ = self.commands.send(Command::Close).await;
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        self.open.store(false, Ordering::Release);
    }
}

async fn pump(
    kind: OperationKind,
    mut socket: Socket,
    mut inbox: mpsc::Receiver<Command>,
    open: Arc<AtomicBool>,
    heartbeat: Duration,
) {
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<Reply> = None;

    let failure = loop {
        tokio::select! {
            command = inbox.recv() => match command {
                Some(Command::Send { payload, reply }) => {
                    if let Err(err) = socket.send(Message::Text(payload)).await {
                        let _ = reply.send(Err(LinkError::Socket(err.to_string())));
                        break None;
                    }
                    // A replaced slot resolves its receiver with `Closed`.
                    pending = Some(reply);
                }
                Some(Command::Close) | None => {
                    let _ = socket.close(None).await;
                    break Some(LinkError::Closed);
                }
            },
            _ = ticker.tick() => {
                if let Err(err) = socket.send(Message::Ping(Vec::new())).await {
                    break Some(LinkError::Socket(err.to_string()));
                }
            }
            frame = socket.next() => match frame {
                Some(Ok(Message::Text(text))) => deliver(kind, &mut pending, text),
                Some(Ok(Message::Binary(bytes))) => {
                    deliver(kind, &mut pending, String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(_))) | None => break Some(LinkError::Closed),
                Some(Ok(_)) => {}
                Some(Err(err)) => break Some(LinkError::Socket(err.to_string())),
            },
        }
    };

    open.store(false, Ordering::Release);
    if let (Some(reply), Some(err)) = (pending.take(), failure) {
        tracing::debug!(operation = %kind, error = %err, "channel ended with a call waiting");
        let _ = reply.send(Err(err));
    }
}

fn deliver(kind: OperationKind, pending: &mut Option<Reply>, text: String) {
    match pending.take() {
        Some(reply) => {
            let _ = reply.send(Ok(text));
        }
        None => tracing::debug!(operation = %kind, "dropping unsolicited channel message"),
    }
}
