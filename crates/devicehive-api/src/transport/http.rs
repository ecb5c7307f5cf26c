// HTTP transport
//
// Maps each request to one HTTP call and each subscription to a
// background long-poll worker. Response envelopes are synthesized
// locally: the correlation lives in the call stack, and the raw body is
// wrapped under the response key so the layers above see the same shape
// the WebSocket transport delivers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Method;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::envelope::{RequestEnvelope, ResponseEnvelope, SubscriptionId};
use crate::error::Error;
use crate::token::AccessTokenCell;
use crate::transport::{ErrorSlot, EventSender, TransportEvent, TransportOptions};

const TRANSPORT_NAME: &str = "http";

/// Margin added to the server-side long-poll hold before the client
/// gives up on a poll request.
const POLL_GRACE_SECS: u64 = 5;

// ── PollConfig ───────────────────────────────────────────────────────

/// Everything a poll worker needs to run one subscription.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Action name for the synthesized "subscribed" response.
    pub subscribe_action: &'static str,
    /// Action name stamped on each synthesized event envelope.
    pub event_action: &'static str,
    /// Key each polled item is wrapped under in the event payload.
    pub item_key: &'static str,
    /// Poll path relative to the API root.
    pub path: &'static str,
    /// Fixed query parameters (device ids, names, limit).
    pub params: Vec<(String, String)>,
    /// Initial `timestamp` cursor; absent on the first poll unless the
    /// caller seeds it.
    pub timestamp: Option<String>,
    /// Server-side long-poll hold, in seconds.
    pub wait_timeout_secs: u64,
    /// Read handle on the current access token, so polls issued after a
    /// refresh carry the new token.
    pub bearer: AccessTokenCell,
}

// ── HttpTransport ────────────────────────────────────────────────────

struct PollWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct HttpInner {
    http: reqwest::Client,
    base_url: Url,
    event_tx: EventSender,
    cancel: CancellationToken,
    connected: AtomicBool,
    subscriptions: Mutex<HashMap<SubscriptionId, PollWorker>>,
    errors: ErrorSlot,
}

/// Long-poll HTTP transport backed by a shared `reqwest::Client`.
pub struct HttpTransport {
    inner: Arc<HttpInner>,
}

impl HttpTransport {
    pub(crate) fn new(
        base_url: Url,
        options: &TransportOptions,
        event_tx: EventSender,
    ) -> Result<Self, Error> {
        let mut base_url = base_url;
        // Relative joins drop the last path segment unless the base ends
        // with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| Error::transport(TRANSPORT_NAME, e))?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                http,
                base_url,
                event_tx,
                cancel: CancellationToken::new(),
                connected: AtomicBool::new(false),
                subscriptions: Mutex::new(HashMap::new()),
                errors: ErrorSlot::default(),
            }),
        })
    }

    pub(crate) fn connect(&self) -> Result<(), Error> {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }
        debug!(url = %self.inner.base_url, "http transport connected");
        let _ = self.inner.event_tx.send(TransportEvent::Connected);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// One HTTP round-trip, synthesized into a response envelope.
    pub(crate) async fn request(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.inner.perform(req).await
    }

    /// Runs the call and queues the response into the event stream.
    pub(crate) async fn send_request(&self, req: RequestEnvelope) -> Result<Uuid, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let response = self.inner.perform(&req).await?;
        let _ = self.inner.event_tx.send(TransportEvent::Message(response));
        Ok(req.request_id)
    }

    /// Register a subscription: allocate a client-side id, spawn its poll
    /// worker, and synthesize the "subscribed" response.
    pub async fn subscribe(&self, poll: PollConfig) -> Result<SubscriptionId, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let id: SubscriptionId = Uuid::new_v4().to_string();

        // Queue the synthesized "subscribed" response before the worker
        // can deliver its first batch.
        let _ = self.inner.event_tx.send(TransportEvent::Message(
            ResponseEnvelope::success(
                Uuid::new_v4(),
                poll.subscribe_action,
                json!({ "subscriptionId": id }),
            ),
        ));

        let cancel = self.inner.cancel.child_token();
        let worker = poll_worker(
            Arc::clone(&self.inner),
            poll.clone(),
            id.clone(),
            cancel.clone(),
        );
        let handle = tokio::spawn(worker);

        self.inner
            .subscriptions
            .lock()
            .await
            .insert(id.clone(), PollWorker { cancel, handle });

        debug!(subscription_id = %id, path = poll.path, "subscription registered");
        Ok(id)
    }

    /// Remove a subscription, join its worker, and synthesize the
    /// "unsubscribed" response.
    pub async fn unsubscribe(
        &self,
        action: &'static str,
        id: &str,
    ) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let Some(worker) = self.inner.subscriptions.lock().await.remove(id) else {
            return Err(Error::Subscription {
                message: format!("subscription '{id}' not found"),
            });
        };

        worker.cancel.cancel();
        let _ = worker.handle.await;

        debug!(subscription_id = %id, "subscription removed");
        let _ = self.inner.event_tx.send(TransportEvent::Message(
            ResponseEnvelope::success(Uuid::new_v4(), action, Value::Object(Map::new())),
        ));
        Ok(())
    }

    pub(crate) async fn close(&self) {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();

        let mut subscriptions = self.inner.subscriptions.lock().await;
        for (id, worker) in subscriptions.drain() {
            if let Err(e) = worker.handle.await {
                warn!(subscription_id = %id, error = %e, "poll worker join failed");
            }
        }
        drop(subscriptions);

        debug!("http transport closed");
        let _ = self.inner.event_tx.send(TransportEvent::Disconnected);
    }

    /// Wait for shutdown, drain workers, and re-raise the first captured
    /// worker error.
    pub(crate) async fn join(&self) -> Result<(), Error> {
        self.inner.cancel.cancelled().await;

        let mut subscriptions = self.inner.subscriptions.lock().await;
        for (_, worker) in subscriptions.drain() {
            let _ = worker.handle.await;
        }
        drop(subscriptions);

        match self.inner.errors.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl HttpInner {
    /// Build, send, and envelope one HTTP request.
    async fn perform(&self, req: &RequestEnvelope) -> Result<ResponseEnvelope, Error> {
        let path = req.http_path()?;
        let url = self.base_url.join(&path)?;
        debug!(method = %req.http.method, %url, action = req.action, "http request");

        let mut builder = self.http.request(req.http.method.clone(), url);
        if req.http.method == Method::GET || req.http.method == Method::DELETE {
            builder = builder.query(&req.http_query());
        } else {
            builder = builder.json(&req.http_body());
        }
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::transport(TRANSPORT_NAME, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::transport(TRANSPORT_NAME, e))?;

        if status.is_success() {
            // 204 and other empty bodies synthesize an empty payload.
            let raw: Value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .map_err(|e| Error::codec(e, String::from_utf8_lossy(&bytes)))?
            };
            let payload = match req.http.response_key {
                Some(key) => json!({ (key): raw }),
                None if raw.is_null() => Value::Object(Map::new()),
                None => raw,
            };
            Ok(ResponseEnvelope::success(req.request_id, req.action, payload))
        } else {
            let message = error_message(&bytes, status.as_u16());
            Ok(ResponseEnvelope::failure(
                req.request_id,
                req.action,
                status.as_u16(),
                message,
            ))
        }
    }

    /// Mark the transport dead after a worker failure; `join` re-raises
    /// the recorded error.
    fn fail(&self, err: Error) {
        warn!(error = %err, "http worker failed");
        self.errors.record(err);
        if self.connected.swap(false, Ordering::SeqCst) {
            self.cancel.cancel();
            let _ = self.event_tx.send(TransportEvent::Disconnected);
        }
    }
}

/// Server-provided `message`, falling back to a generic one.
fn error_message(bytes: &[u8], code: u16) -> String {
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("HTTP {code}"))
}

// ── Poll worker ──────────────────────────────────────────────────────

/// Long-poll loop for one subscription. Runs until unsubscribed or the
/// transport closes; any failure is captured and takes the transport
/// down so `join` observes it.
async fn poll_worker(
    inner: Arc<HttpInner>,
    poll: PollConfig,
    id: SubscriptionId,
    cancel: CancellationToken,
) {
    let mut cursor = poll.timestamp.clone();
    let poll_bound = Duration::from_secs(poll.wait_timeout_secs + POLL_GRACE_SECS);

    let url = match inner.base_url.join(poll.path) {
        Ok(url) => url,
        Err(e) => {
            inner.fail(Error::InvalidUrl(e));
            return;
        }
    };

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let mut query = poll.params.clone();
        query.push(("waitTimeout".into(), poll.wait_timeout_secs.to_string()));
        if let Some(ts) = &cursor {
            query.push(("timestamp".into(), ts.clone()));
        }

        let mut builder = inner
            .http
            .get(url.clone())
            .query(&query)
            .timeout(poll_bound);
        if let Some(token) = poll.bearer.get() {
            builder = builder.bearer_auth(token);
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = builder.send() => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                inner.fail(Error::transport(TRANSPORT_NAME, e));
                return;
            }
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                inner.fail(Error::transport(TRANSPORT_NAME, e));
                return;
            }
        };

        if !status.is_success() {
            inner.fail(Error::Api {
                transport: TRANSPORT_NAME,
                action: poll.event_action.into(),
                code: status.as_u16(),
                message: error_message(&bytes, status.as_u16()),
            });
            return;
        }

        let items: Vec<Value> = if bytes.is_empty() {
            Vec::new()
        } else {
            match serde_json::from_slice(&bytes) {
                Ok(items) => items,
                Err(e) => {
                    inner.fail(Error::codec(e, String::from_utf8_lossy(&bytes)));
                    return;
                }
            }
        };

        for item in items {
            if let Some(ts) = item.get("timestamp").and_then(Value::as_str) {
                advance_cursor(&mut cursor, ts);
            }
            let event = ResponseEnvelope::event(
                poll.event_action,
                id.clone(),
                json!({ (poll.item_key): item }),
            );
            if inner.event_tx.send(TransportEvent::Message(event)).is_err() {
                // Dispatcher is gone; nothing left to deliver to.
                return;
            }
        }
    }
}

/// Move the cursor forward, never backward. Timestamps are ISO-8601;
/// chrono comparison with a lexicographic fallback for nonstandard
/// precision.
fn advance_cursor(cursor: &mut Option<String>, seen: &str) {
    let newer = match cursor.as_deref() {
        None => true,
        Some(current) => match (parse_timestamp(current), parse_timestamp(seen)) {
            (Some(cur), Some(new)) => new > cur,
            _ => seen > current,
        },
    };
    if newer {
        *cursor = Some(seen.to_owned());
    }
}

fn parse_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()
}
