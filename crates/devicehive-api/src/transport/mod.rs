// Transport layer
//
// One behavioral contract over two wire shapes: request/response plus a
// stream of server events. The URL scheme picks the variant at
// construction; higher layers hold the closed `Transport` enum and stay
// agnostic except where the contract itself differs (HTTP subscriptions
// own poll workers, WebSocket authenticates per-connection).

pub mod http;
pub mod ws;

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::codec::{JsonCodec, PayloadCodec};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::Error;

pub use http::{HttpTransport, PollConfig};
pub use ws::WsTransport;

// ── Events ───────────────────────────────────────────────────────────

/// Events pushed by a transport into the dispatcher queue.
///
/// The queue is a multi-producer unbounded channel: on HTTP the request
/// path and every poll worker produce into it, on WebSocket the receive
/// loop does. A single dispatcher consumes it.
#[derive(Debug)]
pub enum TransportEvent {
    /// The transport is live; fired once per successful connect.
    Connected,
    /// A server event or an uncorrelated response (`send_request`
    /// responses, stray frames).
    Message(ResponseEnvelope),
    /// The transport is gone; the dispatcher should wind down.
    Disconnected,
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

// ── Options ──────────────────────────────────────────────────────────

/// Transport construction options.
#[derive(Clone)]
pub struct TransportOptions {
    /// Bound on synchronous `request` round-trips.
    pub request_timeout: Duration,
    /// When set, the WebSocket transport runs a ping worker and drops
    /// the connection if a pong does not arrive within this window.
    pub pong_timeout: Option<Duration>,
    /// Payload codec; JSON unless the application plugs its own.
    pub codec: Arc<dyn PayloadCodec>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pong_timeout: None,
            codec: Arc::new(JsonCodec),
        }
    }
}

impl std::fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportOptions")
            .field("request_timeout", &self.request_timeout)
            .field("pong_timeout", &self.pong_timeout)
            .finish_non_exhaustive()
    }
}

// ── Worker error slot ────────────────────────────────────────────────

/// First captured background-worker error; `join` re-raises it so worker
/// failures are never silently lost.
#[derive(Default)]
pub(crate) struct ErrorSlot(Mutex<Option<Error>>);

impl ErrorSlot {
    /// Store the error unless one is already held.
    pub(crate) fn record(&self, err: Error) {
        let mut slot = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub(crate) fn take(&self) -> Option<Error> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// The two interchangeable wire transports.
pub enum Transport {
    Http(HttpTransport),
    WebSocket(WsTransport),
}

impl Transport {
    /// Build a transport from the API URL. `http(s)` selects long-poll
    /// HTTP, `ws(s)` selects WebSocket; any other scheme is rejected.
    pub fn create(
        url: &str,
        options: TransportOptions,
        event_tx: EventSender,
    ) -> Result<Self, Error> {
        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self::Http(HttpTransport::new(parsed, &options, event_tx)?)),
            "ws" | "wss" => Ok(Self::WebSocket(WsTransport::new(parsed, options, event_tx))),
            other => Err(Error::Config {
                message: format!("unsupported URL scheme '{other}'"),
            }),
        }
    }

    /// Advertised transport name; higher layers switch auth behavior on it.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::WebSocket(_) => "websocket",
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::WebSocket(_))
    }

    /// The HTTP transport, when that is the active variant. Subscription
    /// poll workers are an HTTP-only concern.
    pub fn as_http(&self) -> Option<&HttpTransport> {
        match self {
            Self::Http(t) => Some(t),
            Self::WebSocket(_) => None,
        }
    }

    /// Start the transport. Fails with [`Error::AlreadyConnected`] if it
    /// is already live.
    pub async fn connect(&self) -> Result<(), Error> {
        match self {
            Self::Http(t) => t.connect(),
            Self::WebSocket(t) => t.connect().await,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Http(t) => t.is_connected(),
            Self::WebSocket(t) => t.is_connected(),
        }
    }

    /// Synchronous round-trip. On HTTP a non-2xx status arrives as an
    /// error envelope, not an `Err`; `Err` is reserved for connectivity
    /// failures, timeouts, and misuse.
    pub async fn request(&self, req: RequestEnvelope) -> Result<ResponseEnvelope, Error> {
        match self {
            Self::Http(t) => t.request(&req).await,
            Self::WebSocket(t) => t.request(req).await,
        }
    }

    /// Fire and forget: the response is delivered through the event
    /// stream. Returns the correlation id.
    pub async fn send_request(&self, req: RequestEnvelope) -> Result<Uuid, Error> {
        match self {
            Self::Http(t) => t.send_request(req).await,
            Self::WebSocket(t) => t.send_request(req).await,
        }
    }

    /// Cooperative shutdown: signal workers, drain them, emit
    /// `Disconnected`. Subsequent operations fail with `NotConnected`.
    pub async fn close(&self) {
        match self {
            Self::Http(t) => t.close().await,
            Self::WebSocket(t) => t.close().await,
        }
    }

    /// Block until every worker has exited, then re-raise the first
    /// captured background error, if any.
    pub async fn join(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let join = async {
            match self {
                Self::Http(t) => t.join().await,
                Self::WebSocket(t) => t.join().await,
            }
        };
        match timeout {
            Some(bound) => tokio::time::timeout(bound, join).await.map_err(|_| {
                Error::Timeout {
                    transport: self.name(),
                    action: "join".into(),
                    after_secs: bound.as_secs(),
                }
            })?,
            None => join.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> EventSender {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[test]
    fn scheme_selects_transport() {
        let http = Transport::create("http://host/api/", TransportOptions::default(), channel());
        assert!(matches!(http, Ok(Transport::Http(_))));

        let ws = Transport::create("ws://host/api/websocket", TransportOptions::default(), channel());
        assert!(matches!(ws, Ok(Transport::WebSocket(_))));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let result = Transport::create("ftp://host/api/", TransportOptions::default(), channel());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn transport_names() {
        let tx = channel();
        let http =
            Transport::create("http://host/api/", TransportOptions::default(), tx.clone()).unwrap_or_else(|_| unreachable!());
        assert_eq!(http.name(), "http");
        assert!(!http.is_websocket());

        let ws = Transport::create("wss://host/api/websocket", TransportOptions::default(), tx)
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(ws.name(), "websocket");
        assert!(ws.is_websocket());
    }

    #[test]
    fn error_slot_keeps_first() {
        let slot = ErrorSlot::default();
        slot.record(Error::NotConnected);
        slot.record(Error::AlreadyConnected);
        assert!(matches!(slot.take(), Some(Error::NotConnected)));
        assert!(slot.take().is_none());
    }
}
