// WebSocket transport
//
// Multiplexes correlated request/response traffic and server-initiated
// events over one socket. A receive worker demultiplexes by `requestId`
// through a pending-request map; frames that match no pending entry are
// forwarded to the event queue so nothing is lost. An optional ping
// worker enforces the heartbeat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::Error;
use crate::transport::{ErrorSlot, EventSender, TransportEvent, TransportOptions};

const TRANSPORT_NAME: &str = "websocket";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

struct WsInner {
    url: Url,
    options: TransportOptions,
    event_tx: EventSender,
    cancel: CancellationToken,
    connected: AtomicBool,
    /// Sends are serialised through this mutex; `None` until connected.
    sink: Mutex<Option<WsSink>>,
    /// Requests awaiting their correlated response.
    pending: StdMutex<HashMap<Uuid, oneshot::Sender<ResponseEnvelope>>>,
    pong_seen: AtomicBool,
    errors: ErrorSlot,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Full-duplex WebSocket transport.
pub struct WsTransport {
    inner: Arc<WsInner>,
}

impl WsTransport {
    pub(crate) fn new(url: Url, options: TransportOptions, event_tx: EventSender) -> Self {
        Self {
            inner: Arc::new(WsInner {
                url,
                options,
                event_tx,
                cancel: CancellationToken::new(),
                connected: AtomicBool::new(false),
                sink: Mutex::new(None),
                pending: StdMutex::new(HashMap::new()),
                pong_seen: AtomicBool::new(false),
                errors: ErrorSlot::default(),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open the socket and spawn the receive worker (plus the ping
    /// worker when a pong timeout is configured).
    pub(crate) async fn connect(&self) -> Result<(), Error> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }

        info!(url = %self.inner.url, "connecting websocket");
        let (stream, _response) = match connect_async(self.inner.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                self.inner.connected.store(false, Ordering::SeqCst);
                return Err(Error::transport(TRANSPORT_NAME, e));
            }
        };

        let (sink, read) = stream.split();
        *self.inner.sink.lock().await = Some(sink);

        let mut workers = self.inner.workers.lock().await;
        workers.push(tokio::spawn(receive_loop(Arc::clone(&self.inner), read)));
        if self.inner.options.pong_timeout.is_some() {
            workers.push(tokio::spawn(ping_worker(Arc::clone(&self.inner))));
        }
        drop(workers);

        debug!("websocket transport connected");
        let _ = self.inner.event_tx.send(TransportEvent::Connected);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Correlated round-trip bounded by the configured request timeout.
    pub(crate) async fn request(&self, req: RequestEnvelope) -> Result<ResponseEnvelope, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let request_id = req.request_id;
        let action = req.action;
        let (tx, rx) = oneshot::channel();
        self.inner.pending_insert(request_id, tx);

        if let Err(e) = self.inner.send_frame(&req).await {
            self.inner.pending_remove(request_id);
            return Err(e);
        }

        let bound = self.inner.options.request_timeout;
        match tokio::time::timeout(bound, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_closed)) => Err(Error::Transport {
                transport: TRANSPORT_NAME,
                message: format!("connection closed before response to '{action}'"),
            }),
            Err(_elapsed) => {
                self.inner.pending_remove(request_id);
                Err(Error::Timeout {
                    transport: TRANSPORT_NAME,
                    action: action.into(),
                    after_secs: bound.as_secs(),
                })
            }
        }
    }

    /// Fire and forget; the response, when it arrives, flows through the
    /// event stream because no pending entry matches it.
    pub(crate) async fn send_request(&self, req: RequestEnvelope) -> Result<Uuid, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let request_id = req.request_id;
        self.inner.send_frame(&req).await?;
        Ok(request_id)
    }

    pub(crate) async fn close(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.inner.pending_clear();

        let handles: Vec<_> = self.inner.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        debug!("websocket transport closed");
        let _ = self.inner.event_tx.send(TransportEvent::Disconnected);
    }

    /// Wait for shutdown, drain workers, and re-raise the first captured
    /// worker error.
    pub(crate) async fn join(&self) -> Result<(), Error> {
        self.inner.cancel.cancelled().await;

        let handles: Vec<_> = self.inner.workers.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        match self.inner.errors.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl WsInner {
    /// Encode and write one frame; text or binary per the codec.
    async fn send_frame(&self, req: &RequestEnvelope) -> Result<(), Error> {
        let value = req.to_ws_value();
        let bytes = self.options.codec.encode(&value)?;
        let message = if self.options.codec.is_text() {
            let text = String::from_utf8(bytes)
                .map_err(|e| Error::codec(e, "<non-utf8 payload>"))?;
            Message::text(text)
        } else {
            Message::binary(bytes)
        };

        let mut sink = self.sink.lock().await;
        let Some(sink) = sink.as_mut() else {
            return Err(Error::NotConnected);
        };
        debug!(action = req.action, request_id = %req.request_id, "websocket request");
        sink.send(message)
            .await
            .map_err(|e| Error::transport(TRANSPORT_NAME, e))
    }

    /// Route a decoded data frame: matching pending request first, event
    /// queue otherwise.
    fn handle_frame(&self, bytes: &[u8]) {
        let value = match self.options.codec.decode(bytes) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "undecodable websocket frame");
                return;
            }
        };
        let envelope = ResponseEnvelope::from_ws_value(value);

        if let Some(request_id) = envelope.request_id {
            if let Some(waiter) = self.pending_remove(request_id) {
                let _ = waiter.send(envelope);
                return;
            }
        }
        let _ = self.event_tx.send(TransportEvent::Message(envelope));
    }

    /// Tear down after a worker observed the connection drop.
    fn shutdown_from_worker(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.cancel.cancel();
            self.pending_clear();
            let _ = self.event_tx.send(TransportEvent::Disconnected);
        }
    }

    fn pending_insert(&self, id: Uuid, tx: oneshot::Sender<ResponseEnvelope>) {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);
    }

    fn pending_remove(&self, id: Uuid) -> Option<oneshot::Sender<ResponseEnvelope>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id)
    }

    /// Dropping the senders fails every in-flight `request` with a
    /// closed-channel error.
    fn pending_clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

// ── Receive worker ───────────────────────────────────────────────────

async fn receive_loop(
    inner: Arc<WsInner>,
    mut read: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
) {
    loop {
        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.handle_frame(text.as_str().as_bytes()),
                Some(Ok(Message::Binary(data))) => inner.handle_frame(&data),
                Some(Ok(Message::Pong(_))) => {
                    inner.pong_seen.store(true, Ordering::SeqCst);
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite replies with pongs automatically
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        info!(code = %cf.code, reason = %cf.reason, "websocket close frame");
                    } else {
                        info!("websocket close frame (no payload)");
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    inner.errors.record(Error::transport(TRANSPORT_NAME, e));
                    break;
                }
                None => {
                    info!("websocket stream ended");
                    break;
                }
            }
        }
    }
    inner.shutdown_from_worker();
}

// ── Ping worker ──────────────────────────────────────────────────────

/// Heartbeat: send a ping, wait the pong window, drop the connection if
/// no pong arrived.
async fn ping_worker(inner: Arc<WsInner>) {
    let Some(window) = inner.options.pong_timeout else {
        return;
    };

    loop {
        {
            let mut sink = inner.sink.lock().await;
            let Some(sink) = sink.as_mut() else { break };
            if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }

        tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return,
            () = tokio::time::sleep(window) => {}
        }

        if !inner.pong_seen.swap(false, Ordering::SeqCst) {
            warn!("pong timeout, dropping connection");
            inner.errors.record(Error::Timeout {
                transport: TRANSPORT_NAME,
                action: "ping".into(),
                after_secs: window.as_secs(),
            });
            if let Some(mut sink) = inner.sink.lock().await.take() {
                let _ = sink.close().await;
            }
            inner.shutdown_from_worker();
            return;
        }
    }
}
