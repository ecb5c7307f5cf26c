// Device-type endpoints

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{DeviceType, DeviceTypeFilter};

use crate::api::decode;
use crate::client::DeviceHive;

impl DeviceHive {
    /// List device types visible to the current token.
    ///
    /// `GET /devicetype` / `devicetype/list`.
    pub async fn list_device_types(
        &self,
        filter: &DeviceTypeFilter,
    ) -> Result<Vec<DeviceType>, Error> {
        let req = RequestEnvelope::new("devicetype/list", Method::GET, "devicetype")
            .fields(filter)
            .response_key("deviceTypes");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("deviceTypes")))
    }

    /// Fetch one device type.
    ///
    /// `GET /devicetype/{deviceTypeId}` / `devicetype/get`.
    pub async fn get_device_type(&self, device_type_id: i64) -> Result<DeviceType, Error> {
        let req = RequestEnvelope::new("devicetype/get", Method::GET, "devicetype/{deviceTypeId}")
            .path_param("deviceTypeId", device_type_id.to_string())
            .response_key("deviceType");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("deviceType")))
    }

    /// Create a device type; the server assigns the id.
    ///
    /// `POST /devicetype` / `devicetype/insert`.
    pub async fn create_device_type(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<DeviceType, Error> {
        debug!(name, "creating device type");
        let mut req = RequestEnvelope::new("devicetype/insert", Method::POST, "devicetype")
            .field("name", name)
            .request_key("deviceType")
            .response_key("deviceType");
        if let Some(description) = description {
            req = req.field("description", description);
        }

        let mut response = self.authorized_request(req).await?;
        let created = response.take_payload(Some("deviceType"));
        let id = created.get("id").and_then(Value::as_i64).ok_or_else(|| {
            Error::codec("device type id missing from response", created.to_string())
        })?;
        Ok(DeviceType {
            id,
            name: name.to_owned(),
            description: description.map(str::to_owned),
        })
    }

    /// Rename or re-describe a device type.
    ///
    /// `PUT /devicetype/{deviceTypeId}` / `devicetype/update`.
    pub async fn update_device_type(
        &self,
        device_type_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), Error> {
        debug!(device_type_id, "updating device type");
        let mut req =
            RequestEnvelope::new("devicetype/update", Method::PUT, "devicetype/{deviceTypeId}")
                .path_param("deviceTypeId", device_type_id.to_string())
                .request_key("deviceType");
        if let Some(name) = name {
            req = req.field("name", name);
        }
        if let Some(description) = description {
            req = req.field("description", description);
        }
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Delete a device type.
    ///
    /// `DELETE /devicetype/{deviceTypeId}` / `devicetype/delete`.
    pub async fn remove_device_type(&self, device_type_id: i64) -> Result<(), Error> {
        debug!(device_type_id, "removing device type");
        let req =
            RequestEnvelope::new("devicetype/delete", Method::DELETE, "devicetype/{deviceTypeId}")
                .path_param("deviceTypeId", device_type_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }
}
