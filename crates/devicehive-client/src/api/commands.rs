// Command endpoints
//
// One-shot operations only; the command subscription streams live in
// `subscriptions.rs`.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{Command, CommandFilter};

use crate::api::{decode, merge_objects};
use crate::client::DeviceHive;

impl DeviceHive {
    /// Commands issued to a device inside a time window.
    ///
    /// `GET /device/{deviceId}/command` / `command/list`.
    pub async fn list_commands(
        &self,
        device_id: &str,
        filter: &CommandFilter,
    ) -> Result<Vec<Command>, Error> {
        let req = RequestEnvelope::new("command/list", Method::GET, "device/{deviceId}/command")
            .path_param("deviceId", device_id)
            .fields(filter)
            .response_key("commands");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("commands")))
    }

    /// Fetch one command.
    ///
    /// `GET /device/{deviceId}/command/{commandId}` / `command/get`.
    pub async fn get_command(&self, device_id: &str, command_id: i64) -> Result<Command, Error> {
        let req = RequestEnvelope::new(
            "command/get",
            Method::GET,
            "device/{deviceId}/command/{commandId}",
        )
        .path_param("deviceId", device_id)
        .path_param("commandId", command_id.to_string())
        .response_key("command");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("command")))
    }

    /// Issue a command to a device. The returned command carries the
    /// server-assigned id and timestamp merged over the sent fields.
    ///
    /// `POST /device/{deviceId}/command` / `command/insert`.
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &str,
        parameters: Option<Value>,
        lifetime: Option<i64>,
    ) -> Result<Command, Error> {
        debug!(device_id, command, "sending command");
        let mut req =
            RequestEnvelope::new("command/insert", Method::POST, "device/{deviceId}/command")
                .path_param("deviceId", device_id)
                .field("command", command)
                .request_key("command")
                .response_key("command");
        if let Some(parameters) = parameters {
            req = req.field("parameters", parameters);
        }
        if let Some(lifetime) = lifetime {
            req = req.field("lifetime", lifetime);
        }

        let sent = Value::Object(req.body.clone());
        let mut response = self.authorized_request(req).await?;
        let mut merged = merge_objects(sent, response.take_payload(Some("command")));
        if let Some(obj) = merged.as_object_mut() {
            obj.entry("deviceId")
                .or_insert_with(|| Value::String(device_id.to_owned()));
        }
        decode(merged)
    }

    /// Report command progress or completion.
    ///
    /// `PUT /device/{deviceId}/command/{commandId}` / `command/update`.
    pub async fn update_command(
        &self,
        device_id: &str,
        command_id: i64,
        status: Option<&str>,
        result: Option<Value>,
    ) -> Result<(), Error> {
        debug!(device_id, command_id, "updating command");
        let mut req = RequestEnvelope::new(
            "command/update",
            Method::PUT,
            "device/{deviceId}/command/{commandId}",
        )
        .path_param("deviceId", device_id)
        .path_param("commandId", command_id.to_string())
        .request_key("command");
        if let Some(status) = status {
            req = req.field("status", status);
        }
        if let Some(result) = result {
            req = req.field("result", result);
        }
        self.authorized_request(req).await?;
        Ok(())
    }
}
