// Notification endpoints

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{Notification, NotificationFilter};

use crate::api::{decode, merge_objects};
use crate::client::DeviceHive;

impl DeviceHive {
    /// Notifications reported by a device inside a time window.
    ///
    /// `GET /device/{deviceId}/notification` / `notification/list`.
    pub async fn list_notifications(
        &self,
        device_id: &str,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, Error> {
        let req = RequestEnvelope::new(
            "notification/list",
            Method::GET,
            "device/{deviceId}/notification",
        )
        .path_param("deviceId", device_id)
        .fields(filter)
        .response_key("notifications");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("notifications")))
    }

    /// Fetch one notification.
    ///
    /// `GET /device/{deviceId}/notification/{notificationId}` /
    /// `notification/get`.
    pub async fn get_notification(
        &self,
        device_id: &str,
        notification_id: i64,
    ) -> Result<Notification, Error> {
        let req = RequestEnvelope::new(
            "notification/get",
            Method::GET,
            "device/{deviceId}/notification/{notificationId}",
        )
        .path_param("deviceId", device_id)
        .path_param("notificationId", notification_id.to_string())
        .response_key("notification");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("notification")))
    }

    /// Report a notification from a device. The returned notification
    /// carries the server-assigned id and timestamp.
    ///
    /// `POST /device/{deviceId}/notification` / `notification/insert`.
    pub async fn send_notification(
        &self,
        device_id: &str,
        notification: &str,
        parameters: Option<Value>,
    ) -> Result<Notification, Error> {
        debug!(device_id, notification, "sending notification");
        let mut req = RequestEnvelope::new(
            "notification/insert",
            Method::POST,
            "device/{deviceId}/notification",
        )
        .path_param("deviceId", device_id)
        .field("notification", notification)
        .request_key("notification")
        .response_key("notification");
        if let Some(parameters) = parameters {
            req = req.field("parameters", parameters);
        }

        let sent = Value::Object(req.body.clone());
        let mut response = self.authorized_request(req).await?;
        let mut merged = merge_objects(sent, response.take_payload(Some("notification")));
        if let Some(obj) = merged.as_object_mut() {
            obj.entry("deviceId")
                .or_insert_with(|| Value::String(device_id.to_owned()));
        }
        decode(merged)
    }
}
