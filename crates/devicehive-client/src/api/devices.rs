// Device endpoints

use reqwest::Method;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{Device, DeviceFilter, DeviceUpdate};

use crate::api::decode;
use crate::client::DeviceHive;

impl DeviceHive {
    /// List devices visible to the current token.
    ///
    /// `GET /device` / `device/list`.
    pub async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, Error> {
        let req = RequestEnvelope::new("device/list", Method::GET, "device")
            .fields(filter)
            .response_key("devices");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("devices")))
    }

    /// Fetch one device. A removed device surfaces the server's 404.
    ///
    /// `GET /device/{deviceId}` / `device/get`.
    pub async fn get_device(&self, device_id: &str) -> Result<Device, Error> {
        let req = RequestEnvelope::new("device/get", Method::GET, "device/{deviceId}")
            .path_param("deviceId", device_id)
            .response_key("device");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("device")))
    }

    /// Create or update a device. The name defaults to the device id
    /// when not provided.
    ///
    /// `PUT /device/{deviceId}` / `device/save`.
    pub async fn put_device(&self, device_id: &str, update: &DeviceUpdate) -> Result<(), Error> {
        debug!(device_id, "saving device");
        let mut req = RequestEnvelope::new("device/save", Method::PUT, "device/{deviceId}")
            .path_param("deviceId", device_id)
            .fields(update)
            .request_key("device");
        if update.name.is_none() {
            req = req.field("name", device_id);
        }
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Delete a device.
    ///
    /// `DELETE /device/{deviceId}` / `device/delete`.
    pub async fn remove_device(&self, device_id: &str) -> Result<(), Error> {
        debug!(device_id, "removing device");
        let req = RequestEnvelope::new("device/delete", Method::DELETE, "device/{deviceId}")
            .path_param("deviceId", device_id);
        self.authorized_request(req).await?;
        Ok(())
    }
}
