// Network endpoints

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{Network, NetworkFilter};

use crate::api::decode;
use crate::client::DeviceHive;

impl DeviceHive {
    /// List networks visible to the current token.
    ///
    /// `GET /network` / `network/list`.
    pub async fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<Network>, Error> {
        let req = RequestEnvelope::new("network/list", Method::GET, "network")
            .fields(filter)
            .response_key("networks");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("networks")))
    }

    /// Fetch one network.
    ///
    /// `GET /network/{networkId}` / `network/get`.
    pub async fn get_network(&self, network_id: i64) -> Result<Network, Error> {
        let req = RequestEnvelope::new("network/get", Method::GET, "network/{networkId}")
            .path_param("networkId", network_id.to_string())
            .response_key("network");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("network")))
    }

    /// Create a network; the server assigns the id.
    ///
    /// `POST /network` / `network/insert`.
    pub async fn create_network(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Network, Error> {
        debug!(name, "creating network");
        let mut req = RequestEnvelope::new("network/insert", Method::POST, "network")
            .field("name", name)
            .request_key("network")
            .response_key("network");
        if let Some(description) = description {
            req = req.field("description", description);
        }

        let mut response = self.authorized_request(req).await?;
        let created = response.take_payload(Some("network"));
        let id = created
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::codec("network id missing from response", created.to_string()))?;
        Ok(Network {
            id,
            name: name.to_owned(),
            description: description.map(str::to_owned),
        })
    }

    /// Rename or re-describe a network.
    ///
    /// `PUT /network/{networkId}` / `network/update`.
    pub async fn update_network(
        &self,
        network_id: i64,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), Error> {
        debug!(network_id, "updating network");
        let mut req = RequestEnvelope::new("network/update", Method::PUT, "network/{networkId}")
            .path_param("networkId", network_id.to_string())
            .request_key("network");
        if let Some(name) = name {
            req = req.field("name", name);
        }
        if let Some(description) = description {
            req = req.field("description", description);
        }
        self.authorized_request(req).await?;
        Ok(())
    }

    /// Delete a network.
    ///
    /// `DELETE /network/{networkId}` / `network/delete`.
    pub async fn remove_network(&self, network_id: i64) -> Result<(), Error> {
        debug!(network_id, "removing network");
        let req = RequestEnvelope::new("network/delete", Method::DELETE, "network/{networkId}")
            .path_param("networkId", network_id.to_string());
        self.authorized_request(req).await?;
        Ok(())
    }
}
