// ── Client facade ──
//
// Full lifecycle management for one DeviceHive connection: transport
// selection from the URL scheme, authentication on connect, the
// dispatcher task, and cooperative shutdown. Typed API operations live
// in the `api` module as inherent impls, one file per resource.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use devicehive_api::envelope::{RequestEnvelope, ResponseEnvelope};
use devicehive_api::error::Error;
use devicehive_api::token::{Credentials, TokenManager};
use devicehive_api::transport::{Transport, TransportOptions};

use crate::handler::{DeviceHandler, dispatch_loop};
use crate::subscription::SubscriptionRegistry;

// ── ClientConfig ─────────────────────────────────────────────────────

/// Connection configuration.
///
/// The URL scheme picks the transport: `http(s)` long-poll or `ws(s)`
/// WebSocket. Authentication material is optional in any combination;
/// acquisition prefers the refresh token, then login/password.
#[derive(Debug)]
pub struct ClientConfig {
    /// API root, e.g. `http://host/api/` or `ws://host/api/websocket`.
    pub url: String,
    pub login: Option<String>,
    pub password: Option<SecretString>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    /// Bound on synchronous request round-trips.
    pub request_timeout: Duration,
    /// Enables the WebSocket heartbeat worker when set.
    pub pong_timeout: Option<Duration>,
    /// Server-side hold for HTTP long-poll subscriptions, in seconds.
    pub poll_wait_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            login: None,
            password: None,
            refresh_token: None,
            access_token: None,
            request_timeout: Duration::from_secs(30),
            pong_timeout: None,
            poll_wait_timeout_secs: 30,
        }
    }

    pub fn with_credentials(
        mut self,
        login: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.login = Some(login.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = Some(timeout);
        self
    }
}

// ── DeviceHive ───────────────────────────────────────────────────────

pub(crate) struct ClientInner {
    transport: Transport,
    tokens: TokenManager,
    registry: SubscriptionRegistry,
    poll_wait_timeout_secs: u64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Failures from the dispatcher itself (e.g. authentication on
    /// connect); `join` surfaces them alongside worker errors.
    failure: StdMutex<Option<Error>>,
}

/// The main entry point.
///
/// Cheaply cloneable via `Arc`; the clone handed to
/// [`DeviceHandler::handle_connect`] is the same client the application
/// constructed, so subscriptions opened inside callbacks and calls made
/// from other tasks share one connection.
#[derive(Clone)]
pub struct DeviceHive {
    inner: Arc<ClientInner>,
}

impl DeviceHive {
    /// Connect to a DeviceHive server and start dispatching events to
    /// the handler. Returns once the transport is live; authentication
    /// and `handle_connect` run on the dispatcher task.
    pub async fn connect<H: DeviceHandler>(
        config: ClientConfig,
        handler: H,
    ) -> Result<Self, Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let options = TransportOptions {
            request_timeout: config.request_timeout,
            pong_timeout: config.pong_timeout,
            ..TransportOptions::default()
        };
        let transport = Transport::create(&config.url, options, event_tx)?;
        let tokens = TokenManager::new(Credentials {
            login: config.login,
            password: config.password,
            refresh_token: config.refresh_token,
            access_token: config.access_token,
        });

        let client = Self {
            inner: Arc::new(ClientInner {
                transport,
                tokens,
                registry: SubscriptionRegistry::default(),
                poll_wait_timeout_secs: config.poll_wait_timeout_secs,
                dispatcher: Mutex::new(None),
                failure: StdMutex::new(None),
            }),
        };

        client.inner.transport.connect().await?;
        info!(
            transport = client.inner.transport.name(),
            "connected to DeviceHive"
        );

        let dispatcher = tokio::spawn(dispatch_loop(client.clone(), handler, event_rx));
        *client.inner.dispatcher.lock().await = Some(dispatcher);

        Ok(client)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Name of the active transport (`http` or `websocket`).
    pub fn transport_name(&self) -> &'static str {
        self.inner.transport.name()
    }

    /// Cooperative shutdown: clear subscriptions, close the transport
    /// (which fires `handle_disconnect`), and wait for the dispatcher.
    pub async fn disconnect(&self) {
        debug!("disconnecting");
        self.inner.registry.clear();
        self.inner.transport.close().await;

        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Wait for the connection to wind down, then re-raise the first
    /// captured background error, if any.
    pub async fn join(&self) -> Result<(), Error> {
        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.transport.join(None).await
    }

    /// As [`join`](Self::join), bounded by a grace period.
    pub async fn join_timeout(&self, timeout: Duration) -> Result<(), Error> {
        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            let _ = tokio::time::timeout(timeout, handle).await.map_err(|_| {
                Error::Timeout {
                    transport: self.inner.transport.name(),
                    action: "join".into(),
                    after_secs: timeout.as_secs(),
                }
            })?;
        }
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.transport.join(Some(timeout)).await
    }

    // ── Internal plumbing ────────────────────────────────────────

    pub(crate) fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    pub(crate) fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    pub(crate) fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub(crate) fn poll_wait_timeout_secs(&self) -> u64 {
        self.inner.poll_wait_timeout_secs
    }

    pub(crate) async fn authenticate(&self) -> Result<(), Error> {
        self.inner.tokens.authenticate(&self.inner.transport).await
    }

    pub(crate) fn record_failure(&self, err: Error) {
        let mut slot = self
            .inner
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_failure(&self) -> Option<Error> {
        self.inner
            .failure
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Authenticated round-trip; error envelopes become [`Error::Api`].
    pub(crate) async fn authorized_request(
        &self,
        req: RequestEnvelope,
    ) -> Result<ResponseEnvelope, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let response = self
            .inner
            .tokens
            .execute_authorized(&self.inner.transport, req)
            .await?;
        self.check(response)
    }

    /// Round-trip for operations that require no authentication
    /// (`server/info`, `cluster/info`, token acquisition).
    pub(crate) async fn public_request(
        &self,
        req: RequestEnvelope,
    ) -> Result<ResponseEnvelope, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let response = self.inner.transport.request(req).await?;
        self.check(response)
    }

    fn check(&self, response: ResponseEnvelope) -> Result<ResponseEnvelope, Error> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(response.to_api_error(self.inner.transport.name()))
        }
    }
}

impl std::fmt::Debug for DeviceHive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHive")
            .field("transport", &self.inner.transport.name())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
