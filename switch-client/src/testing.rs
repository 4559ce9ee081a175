//! Recording transports for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use url::Url;

use switch_common::{OperationKind, CHANNEL_KINDS};

use crate::channel::{ChannelConnector, ChannelLink, LinkError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportFailure};

/// HTTP transport that records requests and replays queued responses.
#[derive(Default)]
pub(crate) struct SpyHttp {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportFailure>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl SpyHttp {
    pub(crate) fn respond(&self, status: u16, body: &str) {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub(crate) fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportFailure(message.to_string())));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for SpyHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure("no scripted response".into())))
    }
}

/// What a fake link does when asked to exchange.
#[derive(Debug, Clone)]
pub(crate) enum LinkEvent {
    Reply(String),
    Fail(String),
    /// Replies with the text once the gate is notified.
    Wait(Arc<Notify>, String),
    Hang,
}

#[derive(Default)]
struct ConnectorLog {
    scripts: VecDeque<Vec<LinkEvent>>,
    endpoints: Vec<(OperationKind, Url)>,
    sent: Vec<String>,
    refuse_next: bool,
    active: [usize; CHANNEL_KINDS],
    peak: [usize; CHANNEL_KINDS],
}

/// Channel connector that hands out scripted links and counts opens/closes.
#[derive(Default)]
pub(crate) struct FakeConnector {
    log: Arc<Mutex<ConnectorLog>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    /// Queues the events the next opened link will produce, in order.
    pub(crate) fn script(&self, events: Vec<LinkEvent>) {
        self.log.lock().unwrap().scripts.push_back(events);
    }

    pub(crate) fn refuse_next(&self) {
        self.log.lock().unwrap().refuse_next = true;
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    pub(crate) fn endpoints(&self) -> Vec<(OperationKind, Url)> {
        self.log.lock().unwrap().endpoints.clone()
    }

    /// Most exchanges ever in flight at once on channels of `kind`.
    pub(crate) fn peak_exchanges(&self, kind: OperationKind) -> usize {
        kind.channel_slot().map_or(0, |slot| self.log.lock().unwrap().peak[slot])
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn open(&self, kind: OperationKind, endpoint: Url) -> Result<Box<dyn ChannelLink>, LinkError> {
        let mut log = self.log.lock().unwrap();
        if std::mem::take(&mut log.refuse_next) {
            return Err(LinkError::Socket("connection refused".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        log.endpoints.push((kind, endpoint));
        let events = log.scripts.pop_front().unwrap_or_default();
        Ok(Box::new(FakeLink {
            slot: kind.channel_slot().unwrap_or_default(),
            events: events.into(),
            open: AtomicBool::new(true),
            log: self.log.clone(),
            closes: self.closes.clone(),
        }))
    }
}

struct FakeLink {
    slot: usize,
    events: VecDeque<LinkEvent>,
    open: AtomicBool,
    log: Arc<Mutex<ConnectorLog>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ChannelLink for FakeLink {
    async fn exchange(&mut self, payload: String) -> Result<String, LinkError> {
        {
            let mut log = self.log.lock().unwrap();
            log.sent.push(payload);
            log.active[self.slot] += 1;
            log.peak[self.slot] = log.peak[self.slot].max(log.active[self.slot]);
        }
        let outcome = match self.events.pop_front() {
            Some(LinkEvent::Reply(text)) => Ok(text),
            Some(LinkEvent::Wait(gate, text)) => {
                gate.notified().await;
                Ok(text)
            }
            Some(LinkEvent::Fail(message)) => {
                self.open.store(false, Ordering::SeqCst);
                Err(LinkError::Socket(message))
            }
            Some(LinkEvent::Hang) => std::future::pending().await,
            None => {
                self.open.store(false, Ordering::SeqCst);
                Err(LinkError::Closed)
            }
        };
        self.log.lock().unwrap().active[self.slot] -= 1;
        outcome
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
