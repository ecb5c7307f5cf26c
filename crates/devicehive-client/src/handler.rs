// Connection handler
//
// The user-facing callback interface and the dispatcher task that
// serialises all callback invocations. Routing is by envelope shape:
// subscription events go to the typed callbacks when their
// `subscriptionId` is registered, everything else reaches
// `handle_event`. Handler errors are logged and never kill the
// dispatcher.

use devicehive_api::envelope::ResponseEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{Command, Notification};
use devicehive_api::transport::{EventReceiver, TransportEvent};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::client::DeviceHive;
use crate::subscription::SubscriptionKind;

/// Application callbacks, invoked one at a time by the dispatcher.
///
/// Only `handle_connect` is mandatory; it typically opens subscriptions
/// through the [`DeviceHive`] handle it receives. The remaining methods
/// default to no-ops.
pub trait DeviceHandler: Send + 'static {
    /// Called exactly once per connection, after authentication.
    fn handle_connect(
        &mut self,
        api: DeviceHive,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// A command arrived on a registered command-insert subscription.
    fn handle_command_insert(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let _ = command;
        async { Ok(()) }
    }

    /// A command arrived on a registered command-update subscription.
    fn handle_command_update(
        &mut self,
        command: Command,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let _ = command;
        async { Ok(()) }
    }

    /// A notification arrived on a registered subscription.
    fn handle_notification(
        &mut self,
        notification: Notification,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let _ = notification;
        async { Ok(()) }
    }

    /// Any other server frame: `send_request` responses, subscription
    /// bootstrap responses, status frames.
    fn handle_event(
        &mut self,
        event: ResponseEnvelope,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        let _ = event;
        async { Ok(()) }
    }

    /// The transport is gone; fired once, last.
    fn handle_disconnect(&mut self) -> impl Future<Output = Result<(), Error>> + Send {
        async { Ok(()) }
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

/// Consume transport events until disconnect, invoking the handler.
pub(crate) async fn dispatch_loop<H: DeviceHandler>(
    client: DeviceHive,
    mut handler: H,
    mut events: EventReceiver,
) {
    let mut connected_seen = false;

    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Connected => {
                if connected_seen {
                    continue;
                }
                connected_seen = true;

                if let Err(e) = client.authenticate().await {
                    error!(error = %e, "authentication on connect failed");
                    client.record_failure(e);
                    client.transport().close().await;
                    continue;
                }
                if let Err(e) = handler.handle_connect(client.clone()).await {
                    warn!(error = %e, "handle_connect failed");
                }
            }
            TransportEvent::Message(envelope) => {
                dispatch_message(&client, &mut handler, envelope).await;
            }
            TransportEvent::Disconnected => {
                if let Err(e) = handler.handle_disconnect().await {
                    warn!(error = %e, "handle_disconnect failed");
                }
                break;
            }
        }
    }
    debug!("dispatcher exiting");
}

async fn dispatch_message<H: DeviceHandler>(
    client: &DeviceHive,
    handler: &mut H,
    mut envelope: ResponseEnvelope,
) {
    // Only frames carrying a subscriptionId are subscription events;
    // responses to `send_request` share these action names but correlate
    // by requestId and belong to `handle_event`.
    let expected_kind = match envelope.action.as_deref() {
        _ if envelope.subscription_id.is_none() => None,
        Some("command/insert") => Some(SubscriptionKind::CommandInsert),
        Some("command/update") => Some(SubscriptionKind::CommandUpdate),
        Some("notification/insert") => Some(SubscriptionKind::Notification),
        _ => None,
    };

    let Some(expected_kind) = expected_kind else {
        if let Err(e) = handler.handle_event(envelope).await {
            warn!(error = %e, "handle_event failed");
        }
        return;
    };

    // Late events for removed subscriptions are dropped silently.
    let Some(subscription_id) = envelope.subscription_id.clone() else {
        debug!(action = ?envelope.action, "subscription event without id, dropped");
        return;
    };
    let Some(kind) = client.registry().kind_of(&subscription_id) else {
        debug!(subscription_id = %subscription_id, "event for unknown subscription, dropped");
        return;
    };
    if kind != expected_kind {
        debug!(
            subscription_id = %subscription_id,
            "event kind does not match subscription, dropped"
        );
        return;
    }

    let result = match kind {
        SubscriptionKind::CommandInsert => match parse::<Command>(&mut envelope, "command") {
            Some(command) => handler.handle_command_insert(command).await,
            None => return,
        },
        SubscriptionKind::CommandUpdate => match parse::<Command>(&mut envelope, "command") {
            Some(command) => handler.handle_command_update(command).await,
            None => return,
        },
        SubscriptionKind::Notification => {
            match parse::<Notification>(&mut envelope, "notification") {
                Some(notification) => handler.handle_notification(notification).await,
                None => return,
            }
        }
    };
    if let Err(e) = result {
        warn!(error = %e, "subscription callback failed");
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    envelope: &mut ResponseEnvelope,
    key: &str,
) -> Option<T> {
    let value = envelope.take_payload(Some(key));
    if value == Value::Null {
        warn!(key, "subscription event without payload, dropped");
        return None;
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(error = %e, key, "undecodable subscription event, dropped");
            None
        }
    }
}
