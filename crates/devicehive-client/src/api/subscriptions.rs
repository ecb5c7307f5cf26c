// Subscription operations
//
// Uniform surface over two mechanisms: on HTTP each subscription owns a
// long-poll worker and the client generates the id; on WebSocket the
// subscribe action is a correlated request and the server owns the id.
// Either way the registry tracks (kind, device set) → id so events route
// and unsubscribing by device set works.

use std::collections::BTreeSet;

use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use devicehive_api::envelope::{RequestEnvelope, SubscriptionId};
use devicehive_api::error::Error;
use devicehive_api::transport::PollConfig;

use crate::client::DeviceHive;
use crate::subscription::{SubscriptionEntry, SubscriptionKind};

/// Static wiring for one subscription stream.
struct StreamSpec {
    kind: SubscriptionKind,
    subscribe_action: &'static str,
    unsubscribe_action: &'static str,
    event_action: &'static str,
    item_key: &'static str,
    poll_path: &'static str,
    /// `returnUpdatedCommands` — distinguishes the update-command stream
    /// from the insert stream on the shared subscribe action/poll path.
    updates: bool,
}

const COMMAND_INSERT: StreamSpec = StreamSpec {
    kind: SubscriptionKind::CommandInsert,
    subscribe_action: "command/subscribe",
    unsubscribe_action: "command/unsubscribe",
    event_action: "command/insert",
    item_key: "command",
    poll_path: "device/command/poll",
    updates: false,
};

const COMMAND_UPDATE: StreamSpec = StreamSpec {
    kind: SubscriptionKind::CommandUpdate,
    subscribe_action: "command/subscribe",
    unsubscribe_action: "command/unsubscribe",
    event_action: "command/update",
    item_key: "command",
    poll_path: "device/command/poll",
    updates: true,
};

const NOTIFICATION: StreamSpec = StreamSpec {
    kind: SubscriptionKind::Notification,
    subscribe_action: "notification/subscribe",
    unsubscribe_action: "notification/unsubscribe",
    event_action: "notification/insert",
    item_key: "notification",
    poll_path: "device/notification/poll",
    updates: false,
};

impl DeviceHive {
    /// Stream newly inserted commands for a device set to
    /// [`handle_command_insert`](crate::handler::DeviceHandler::handle_command_insert).
    pub async fn subscribe_insert_commands(
        &self,
        device_ids: &[&str],
        names: Option<&[&str]>,
        timestamp: Option<&str>,
        limit: Option<i64>,
    ) -> Result<SubscriptionId, Error> {
        self.subscribe(&COMMAND_INSERT, device_ids, names, timestamp, limit)
            .await
    }

    /// Stream command status/result updates for a device set to
    /// [`handle_command_update`](crate::handler::DeviceHandler::handle_command_update).
    pub async fn subscribe_update_commands(
        &self,
        device_ids: &[&str],
        names: Option<&[&str]>,
        timestamp: Option<&str>,
        limit: Option<i64>,
    ) -> Result<SubscriptionId, Error> {
        self.subscribe(&COMMAND_UPDATE, device_ids, names, timestamp, limit)
            .await
    }

    /// Stream device notifications for a device set to
    /// [`handle_notification`](crate::handler::DeviceHandler::handle_notification).
    pub async fn subscribe_notifications(
        &self,
        device_ids: &[&str],
        names: Option<&[&str]>,
        timestamp: Option<&str>,
        limit: Option<i64>,
    ) -> Result<SubscriptionId, Error> {
        self.subscribe(&NOTIFICATION, device_ids, names, timestamp, limit)
            .await
    }

    /// Stop the insert-command stream covering exactly this device set.
    pub async fn unsubscribe_insert_commands(&self, device_ids: &[&str]) -> Result<(), Error> {
        self.unsubscribe(&COMMAND_INSERT, device_ids).await
    }

    /// Stop the update-command stream covering exactly this device set.
    pub async fn unsubscribe_update_commands(&self, device_ids: &[&str]) -> Result<(), Error> {
        self.unsubscribe(&COMMAND_UPDATE, device_ids).await
    }

    /// Stop the notification stream covering exactly this device set.
    pub async fn unsubscribe_notifications(&self, device_ids: &[&str]) -> Result<(), Error> {
        self.unsubscribe(&NOTIFICATION, device_ids).await
    }

    // ── Shared mechanics ─────────────────────────────────────────

    async fn subscribe(
        &self,
        spec: &StreamSpec,
        device_ids: &[&str],
        names: Option<&[&str]>,
        timestamp: Option<&str>,
        limit: Option<i64>,
    ) -> Result<SubscriptionId, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let device_set: BTreeSet<String> = device_ids.iter().map(|s| (*s).to_owned()).collect();
        if self.registry().find(spec.kind, &device_set).is_some() {
            return Err(Error::Subscription {
                message: "subscription for this device set already exists".into(),
            });
        }

        let id = if let Some(http) = self.transport().as_http() {
            // Poll workers authenticate with the shared token cell; make
            // sure it is populated before the first poll goes out.
            if self.tokens().access_cell().get().is_none() {
                self.authenticate().await?;
            }

            let mut params = vec![("deviceIds".to_owned(), device_ids.join(","))];
            if let Some(names) = names {
                params.push(("names".to_owned(), names.join(",")));
            }
            if let Some(limit) = limit {
                params.push(("limit".to_owned(), limit.to_string()));
            }
            if spec.updates {
                params.push(("returnUpdatedCommands".to_owned(), "true".to_owned()));
            }

            http.subscribe(PollConfig {
                subscribe_action: spec.subscribe_action,
                event_action: spec.event_action,
                item_key: spec.item_key,
                path: spec.poll_path,
                params,
                timestamp: timestamp.map(str::to_owned),
                wait_timeout_secs: self.poll_wait_timeout_secs(),
                bearer: self.tokens().access_cell(),
            })
            .await?
        } else {
            let mut req = RequestEnvelope::new(spec.subscribe_action, Method::GET, "")
                .field("deviceIds", json!(device_ids));
            if let Some(names) = names {
                req = req.field("names", json!(names));
            }
            if let Some(timestamp) = timestamp {
                req = req.field("timestamp", timestamp);
            }
            if let Some(limit) = limit {
                req = req.field("limit", limit);
            }
            if spec.updates {
                req = req.field("returnUpdatedCommands", true);
            }

            let response = self.authorized_request(req).await?;
            // The server owns the id on WebSocket; it is required to
            // demultiplex and to unsubscribe.
            response
                .subscription_id
                .ok_or_else(|| Error::Subscription {
                    message: "server response carried no subscriptionId".into(),
                })?
        };

        debug!(subscription_id = %id, event = spec.event_action, "subscribed");
        self.registry().add(
            id.clone(),
            SubscriptionEntry {
                kind: spec.kind,
                device_ids: device_set,
            },
        )?;
        Ok(id)
    }

    async fn unsubscribe(&self, spec: &StreamSpec, device_ids: &[&str]) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let device_set: BTreeSet<String> = device_ids.iter().map(|s| (*s).to_owned()).collect();
        let Some(id) = self.registry().find(spec.kind, &device_set) else {
            return Err(Error::Subscription {
                message: "no subscription covers this device set".into(),
            });
        };

        if let Some(http) = self.transport().as_http() {
            http.unsubscribe(spec.unsubscribe_action, &id).await?;
        } else {
            let req = RequestEnvelope::new(spec.unsubscribe_action, Method::DELETE, "")
                .field("subscriptionId", subscription_id_value(&id));
            self.authorized_request(req).await?;
        }

        debug!(subscription_id = %id, event = spec.event_action, "unsubscribed");
        self.registry().remove(&id)?;
        Ok(())
    }
}

/// Server-issued ids are numeric on current servers; echo the original
/// type back.
fn subscription_id_value(id: &str) -> Value {
    id.parse::<i64>().map_or_else(|_| Value::String(id.to_owned()), Value::from)
}
