// Token lifecycle
//
// Holds the refresh/access token pair and the fallback credentials,
// acquires access tokens (`token/refresh`, then `token/login`), and
// decorates authenticated requests: stamp the bearer just before send,
// re-authenticate once on a 401, retry once. Refreshes are serialised
// through the state mutex so concurrent 401s never race the token.

use std::sync::{Arc, RwLock};

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::Error;
use crate::models::AccessTokens;
use crate::transport::Transport;

// ── AccessTokenCell ──────────────────────────────────────────────────

/// Shared read handle on the current access token.
///
/// The token manager writes it; the request path and HTTP poll workers
/// read it, so every request issued after a refresh carries the new
/// token.
#[derive(Clone, Default)]
pub struct AccessTokenCell(Arc<RwLock<Option<String>>>);

impl AccessTokenCell {
    pub fn get(&self) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: String) {
        *self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }
}

impl std::fmt::Debug for AccessTokenCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token itself.
        f.debug_struct("AccessTokenCell")
            .field("present", &self.get().is_some())
            .finish()
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Authentication material supplied at construction. Any combination is
/// allowed; acquisition prefers the refresh token, then login/password.
#[derive(Debug, Default)]
pub struct Credentials {
    pub login: Option<String>,
    pub password: Option<SecretString>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
}

struct TokenState {
    refresh_token: Option<String>,
    login: Option<String>,
    password: Option<SecretString>,
}

// ── TokenManager ─────────────────────────────────────────────────────

/// Owns the token lifecycle for one connection.
pub struct TokenManager {
    state: Mutex<TokenState>,
    access: AccessTokenCell,
}

impl TokenManager {
    pub fn new(credentials: Credentials) -> Self {
        let access = AccessTokenCell::default();
        if let Some(token) = credentials.access_token {
            access.set(token);
        }
        Self {
            state: Mutex::new(TokenState {
                refresh_token: credentials.refresh_token,
                login: credentials.login,
                password: credentials.password,
            }),
            access,
        }
    }

    /// Read handle for poll workers and the request path.
    pub fn access_cell(&self) -> AccessTokenCell {
        self.access.clone()
    }

    /// Acquire an access token and, on WebSocket, authenticate the
    /// connection with it. Idempotent: safe to call on every connect and
    /// on every 401.
    pub async fn authenticate(&self, transport: &Transport) -> Result<(), Error> {
        // Holding the state lock for the whole exchange keeps one
        // refresh in flight at a time.
        let mut state = self.state.lock().await;

        let mut acquired: Option<AccessTokens> = None;

        if let Some(refresh_token) = state.refresh_token.clone() {
            match self.acquire_by_refresh(transport, &refresh_token).await {
                Ok(tokens) => acquired = Some(tokens),
                Err(e) => debug!(error = %e, "token refresh failed, trying login"),
            }
        }

        if acquired.is_none() {
            if let (Some(login), Some(password)) = (state.login.clone(), state.password.clone()) {
                match self.acquire_by_login(transport, &login, &password).await {
                    Ok(tokens) => acquired = Some(tokens),
                    Err(e) => {
                        return Err(Error::Auth {
                            message: format!("token acquisition failed: {e}"),
                        });
                    }
                }
            }
        }

        match acquired {
            Some(tokens) => {
                self.access.set(tokens.access_token);
                if let Some(refresh_token) = tokens.refresh_token {
                    state.refresh_token = Some(refresh_token);
                }
            }
            // A pre-supplied access token with no renewal material is
            // used as-is.
            None if self.access.get().is_some()
                && state.refresh_token.is_none()
                && state.login.is_none() => {}
            None => {
                return Err(Error::Auth {
                    message: "no usable credentials: refresh and login both unavailable or failed"
                        .into(),
                });
            }
        }
        drop(state);

        if transport.is_websocket() {
            self.authenticate_socket(transport).await?;
        }
        Ok(())
    }

    /// Refresh the access token and return the new one (the façade's
    /// `refresh_token` operation).
    pub async fn refresh(&self, transport: &Transport) -> Result<String, Error> {
        let state = self.state.lock().await;
        let Some(refresh_token) = state.refresh_token.clone() else {
            return Err(Error::Auth {
                message: "no refresh token held".into(),
            });
        };
        let tokens = self.acquire_by_refresh(transport, &refresh_token).await?;
        drop(state);

        self.access.set(tokens.access_token.clone());
        Ok(tokens.access_token)
    }

    /// Decorate and send an authenticated request: stamp the bearer, and
    /// on a 401 re-authenticate exactly once and retry. A second 401, or
    /// an authentication failure, surfaces the original 401 envelope.
    pub async fn execute_authorized(
        &self,
        transport: &Transport,
        mut req: RequestEnvelope,
    ) -> Result<ResponseEnvelope, Error> {
        if self.access.get().is_none() {
            self.authenticate(transport).await?;
        }

        req.bearer = self.access.get();
        let response = transport.request(req.clone()).await?;
        if response.code != Some(401) {
            return Ok(response);
        }

        debug!(action = req.action, "access token rejected, re-authenticating");
        if let Err(e) = self.authenticate(transport).await {
            warn!(error = %e, "re-authentication failed");
            return Ok(response);
        }

        req.bearer = self.access.get();
        transport.request(req).await
    }

    // ── Acquisition ──────────────────────────────────────────────

    async fn acquire_by_refresh(
        &self,
        transport: &Transport,
        refresh_token: &str,
    ) -> Result<AccessTokens, Error> {
        let req = RequestEnvelope::new("token/refresh", Method::POST, "token/refresh")
            .field("refreshToken", refresh_token);
        self.token_exchange(transport, req).await
    }

    async fn acquire_by_login(
        &self,
        transport: &Transport,
        login: &str,
        password: &SecretString,
    ) -> Result<AccessTokens, Error> {
        let req = RequestEnvelope::new("token/login", Method::POST, "token/login")
            .field("login", login)
            .field("password", password.expose_secret());
        self.token_exchange(transport, req).await
    }

    async fn token_exchange(
        &self,
        transport: &Transport,
        req: RequestEnvelope,
    ) -> Result<AccessTokens, Error> {
        let mut response = transport.request(req).await?;
        if !response.is_success() {
            return Err(response.to_api_error(transport.name()));
        }
        let payload = response.take_payload(None);
        serde_json::from_value(payload.clone())
            .map_err(|e| Error::codec(e, payload.to_string()))
    }

    /// The explicit `authenticate` action: WebSocket connections are
    /// authorized per-connection, not per-request.
    async fn authenticate_socket(&self, transport: &Transport) -> Result<(), Error> {
        let Some(token) = self.access.get() else {
            return Err(Error::Auth {
                message: "no access token to authenticate the socket with".into(),
            });
        };
        let req = RequestEnvelope::new("authenticate", Method::GET, "")
            .field("token", Value::String(token));
        let response = transport.request(req).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(Error::Auth {
                message: response
                    .error
                    .unwrap_or_else(|| "socket authentication rejected".into()),
            })
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_starts_empty_and_updates() {
        let cell = AccessTokenCell::default();
        assert!(cell.get().is_none());
        cell.set("token-a".into());
        assert_eq!(cell.get().as_deref(), Some("token-a"));

        let shared = cell.clone();
        cell.set("token-b".into());
        assert_eq!(shared.get().as_deref(), Some("token-b"));
    }

    #[test]
    fn manager_seeds_access_token() {
        let manager = TokenManager::new(Credentials {
            access_token: Some("seeded".into()),
            ..Credentials::default()
        });
        assert_eq!(manager.access_cell().get().as_deref(), Some("seeded"));
    }

    #[test]
    fn debug_never_prints_the_token() {
        let manager = TokenManager::new(Credentials {
            access_token: Some("super-secret".into()),
            ..Credentials::default()
        });
        let text = format!("{manager:?}");
        assert!(!text.contains("super-secret"));
    }
}
