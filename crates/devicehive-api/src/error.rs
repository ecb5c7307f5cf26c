use thiserror::Error;

/// Top-level error type for the `devicehive-api` crate.
///
/// Covers every failure mode across both transports, the token manager,
/// and the subscription machinery. `devicehive-client` surfaces these
/// unchanged to the application.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection state ────────────────────────────────────────────
    /// Operation attempted on a transport that is not connected.
    #[error("Not connected")]
    NotConnected,

    /// `connect` called on a transport that is already live.
    #[error("Already connected")]
    AlreadyConnected,

    // ── Transport ───────────────────────────────────────────────────
    /// Connectivity, TLS, socket, or framing failure.
    #[error("{transport} transport error: {message}")]
    Transport {
        transport: &'static str,
        message: String,
    },

    /// Synchronous request exceeded its bound.
    #[error("{transport} request '{action}' timed out after {after_secs}s")]
    Timeout {
        transport: &'static str,
        action: String,
        after_secs: u64,
    },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Server responses ────────────────────────────────────────────
    /// Server returned `status: error`. `code` is the HTTP status or a
    /// server-defined integer.
    #[error("{transport} API error on '{action}' (code {code}): {message}")]
    Api {
        transport: &'static str,
        action: String,
        code: u16,
        message: String,
    },

    // ── Authentication ──────────────────────────────────────────────
    /// Token refresh and login both failed, or no credentials are held.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Subscriptions ───────────────────────────────────────────────
    /// Add/remove against an unknown or duplicate subscription.
    #[error("Subscription error: {message}")]
    Subscription { message: String },

    // ── Configuration ───────────────────────────────────────────────
    /// Unsupported URL scheme or invalid options.
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Payload encode/decode failure, with the raw body for debugging.
    #[error("Codec error: {message}")]
    Codec { message: String, body: String },
}

impl Error {
    /// Transport-level failure with the transport name attached.
    pub fn transport(transport: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            transport,
            message: err.to_string(),
        }
    }

    /// Decode failure carrying the offending body.
    pub fn codec(err: impl std::fmt::Display, body: impl Into<String>) -> Self {
        Self::Codec {
            message: err.to_string(),
            body: body.into(),
        }
    }

    /// Returns `true` if this is a "not found" API error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code: 404, .. })
    }

    /// Returns `true` if this error indicates the access token was
    /// rejected and re-authentication might resolve it.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { code: 401, .. } | Self::Auth { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_carries_context() {
        let err = Error::Api {
            transport: "http",
            action: "device/get".into(),
            code: 404,
            message: "Device not found".into(),
        };
        let text = err.to_string();
        assert!(text.contains("http"));
        assert!(text.contains("device/get"));
        assert!(text.contains("404"));
        assert!(err.is_not_found());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn unauthorized_predicate() {
        let err = Error::Api {
            transport: "websocket",
            action: "device/list".into(),
            code: 401,
            message: "Unauthorized".into(),
        };
        assert!(err.is_unauthorized());
    }
}
