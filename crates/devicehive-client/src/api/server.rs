// Server information and configuration properties

use reqwest::Method;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{ClusterInfo, Configuration, ServerInfo};

use crate::api::decode;
use crate::client::DeviceHive;

impl DeviceHive {
    /// Server metadata, including the timestamp used to seed
    /// subscription cursors.
    ///
    /// `GET /info` / `server/info`. No authentication required.
    pub async fn get_info(&self) -> Result<ServerInfo, Error> {
        let req = RequestEnvelope::new("server/info", Method::GET, "info").response_key("info");
        let mut response = self.public_request(req).await?;
        decode(response.take_payload(Some("info")))
    }

    /// Cluster topology.
    ///
    /// `GET /info/config/cluster` / `cluster/info`. No authentication
    /// required.
    pub async fn get_cluster_info(&self) -> Result<ClusterInfo, Error> {
        let req = RequestEnvelope::new("cluster/info", Method::GET, "info/config/cluster")
            .response_key("clusterInfo");
        let mut response = self.public_request(req).await?;
        decode(response.take_payload(Some("clusterInfo")))
    }

    /// Read a server configuration property.
    ///
    /// `GET /configuration/{name}` / `configuration/get`.
    pub async fn get_property(&self, name: &str) -> Result<Configuration, Error> {
        let req = RequestEnvelope::new("configuration/get", Method::GET, "configuration/{name}")
            .path_param("name", name)
            .response_key("configuration");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("configuration")))
    }

    /// Create or update a server configuration property.
    ///
    /// `PUT /configuration/{name}` / `configuration/put`.
    pub async fn set_property(&self, name: &str, value: &str) -> Result<Configuration, Error> {
        let req = RequestEnvelope::new("configuration/put", Method::PUT, "configuration/{name}")
            .path_param("name", name)
            .field("value", value)
            .response_key("configuration");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(Some("configuration")))
    }

    /// Delete a server configuration property.
    ///
    /// `DELETE /configuration/{name}` / `configuration/delete`.
    pub async fn delete_property(&self, name: &str) -> Result<(), Error> {
        let req =
            RequestEnvelope::new("configuration/delete", Method::DELETE, "configuration/{name}")
                .path_param("name", name);
        self.authorized_request(req).await?;
        Ok(())
    }
}
