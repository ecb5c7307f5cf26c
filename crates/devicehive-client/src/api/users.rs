// User endpoints
//
// Account CRUD plus network and device-type grants. Device-type access
// is either an explicit grant list or the all-types flag.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{User, UserCreate, UserFilter};

use crate::api::{decode, merge_objects};
use crate::client::DeviceHive;

impl DeviceHive {
    /// List users (admin operation).
    ///
    /// `GET /user` / `user/list`.
    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, Error> {
        let req = RequestEnvelope::new("user/list", Method::GET, "user")
            .fields(filter)
            .response_key("users");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("users")))
    }

    /// Fetch one user.
    ///
    /// `GET /user/{userId}` / `user/get`.
    pub async fn get_user(&self, user_id: i64) -> Result<User, Error> {
        let req = RequestEnvelope::new("user/get", Method::GET, "user/{userId}")
            .path_param("userId", user_id.to_string())
            .response_key("user");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("user")))
    }

    /// The user the current token belongs to.
    ///
    /// `GET /user/current` / `user/getCurrent`.
    pub async fn get_current_user(&self) -> Result<User, Error> {
        let req = RequestEnvelope::new("user/getCurrent", Method::GET, "user/current")
            .response_key("current");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("current")))
    }

    /// Create a user; the server assigns the id.
    ///
    /// `POST /user` / `user/insert`.
    pub async fn create_user(&self, user: &UserCreate) -> Result<User, Error> {
        debug!(login = %user.login, "creating user");
        let req = RequestEnvelope::new("user/insert", Method::POST, "user")
            .fields(user)
            .request_key("user")
            .response_key("user");

        let mut sent = req.body.clone();
        // The password never belongs in the returned resource.
        sent.remove("password");
        let mut response = self.authorized_request(req).await?;
        let merged = merge_objects(Value::Object(sent), response.take_payload(Some("user")));
        decode(merged)
    }

    /// Replace a user's password.
    ///
    /// `PUT /user/{userId}` / `user/update`.
    pub async fn update_password(&self, user_id: i64, password: &str) -> Result<(), Error> {
        debug!(user_id, "updating user password");
        let req = RequestEnvelope::new("user/update", Method::PUT, "user/{userId}")
            .path_param("userId", user_id.to_string())
            .field("password", password)
            .request_key("user");
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Delete a user.
    ///
    /// `DELETE /user/{userId}` / `user/delete`.
    pub async fn remove_user(&self, user_id: i64) -> Result<(), Error> {
        debug!(user_id, "removing user");
        let req = RequestEnvelope::new("user/delete", Method::DELETE, "user/{userId}")
            .path_param("userId", user_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    // ── Grants ───────────────────────────────────────────────────

    /// Grant a user access to a network.
    ///
    /// `PUT /user/{userId}/network/{networkId}` / `user/assignNetwork`.
    pub async fn assign_network(&self, user_id: i64, network_id: i64) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/assignNetwork",
            Method::PUT,
            "user/{userId}/network/{networkId}",
        )
        .path_param("userId", user_id.to_string())
        .path_param("networkId", network_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Revoke a user's access to a network.
    ///
    /// `DELETE /user/{userId}/network/{networkId}` /
    /// `user/unassignNetwork`.
    pub async fn unassign_network(&self, user_id: i64, network_id: i64) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/unassignNetwork",
            Method::DELETE,
            "user/{userId}/network/{networkId}",
        )
        .path_param("userId", user_id.to_string())
        .path_param("networkId", network_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Grant a user access to a device type.
    ///
    /// `PUT /user/{userId}/devicetype/{deviceTypeId}` /
    /// `user/assignDeviceType`.
    pub async fn assign_device_type(
        &self,
        user_id: i64,
        device_type_id: i64,
    ) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/assignDeviceType",
            Method::PUT,
            "user/{userId}/devicetype/{deviceTypeId}",
        )
        .path_param("userId", user_id.to_string())
        .path_param("deviceTypeId", device_type_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Revoke a user's access to a device type.
    ///
    /// `DELETE /user/{userId}/devicetype/{deviceTypeId}` /
    /// `user/unassignDeviceType`.
    pub async fn unassign_device_type(
        &self,
        user_id: i64,
        device_type_id: i64,
    ) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/unassignDeviceType",
            Method::DELETE,
            "user/{userId}/devicetype/{deviceTypeId}",
        )
        .path_param("userId", user_id.to_string())
        .path_param("deviceTypeId", device_type_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Give a user access to every device type, current and future.
    ///
    /// `PUT /user/{userId}/devicetype/all` / `user/allowAllDeviceTypes`.
    pub async fn allow_all_device_types(&self, user_id: i64) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/allowAllDeviceTypes",
            Method::PUT,
            "user/{userId}/devicetype/all",
        )
        .path_param("userId", user_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Restrict a user back to explicit device-type grants.
    ///
    /// `DELETE /user/{userId}/devicetype/all` /
    /// `user/disallowAllDeviceTypes`.
    pub async fn disallow_all_device_types(&self, user_id: i64) -> Result<(), Error> {
        let req = RequestEnvelope::new(
            "user/disallowAllDeviceTypes",
            Method::DELETE,
            "user/{userId}/devicetype/all",
        )
        .path_param("userId", user_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }
}
