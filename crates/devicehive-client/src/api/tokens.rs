// Token operations

use reqwest::Method;

use devicehive_api::envelope::RequestEnvelope;
use devicehive_api::error::Error;
use devicehive_api::models::{AccessTokens, TokenPayload};

use crate::api::decode;
use crate::client::DeviceHive;

impl DeviceHive {
    /// Issue a token pair for another user (admin operation).
    ///
    /// `POST /token/create` / `token/create`.
    pub async fn create_token(&self, payload: &TokenPayload) -> Result<AccessTokens, Error> {
        let req = RequestEnvelope::new("token/create", Method::POST, "token/create")
            .fields(payload)
            .request_key("payload");
        let mut response = self.authorized_request(req).await?;
        decode(response.take_payload(None))
    }

    /// Exchange the held refresh token for a new access token. The new
    /// token is applied to every subsequent authenticated request.
    ///
    /// `POST /token/refresh` / `token/refresh`.
    pub async fn refresh_token(&self) -> Result<String, Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.tokens().refresh(self.transport()).await
    }
}
