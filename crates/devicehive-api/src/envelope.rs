// Request/response envelopes
//
// One request builder serves both transports: the WebSocket wire form is
// `{action, requestId} ∪ path params ∪ wrapped body`, while the HTTP hints
// (method, path template, wrapper keys) ride along and are ignored by the
// WebSocket transport. Responses are parsed from WebSocket frames or
// synthesized locally by the HTTP transport so both look identical to the
// layers above.

use reqwest::Method;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

/// Server-side subscription identifier.
///
/// Server-assigned on WebSocket (an opaque integer or string), generated
/// client-side (UUID) on HTTP.
pub type SubscriptionId = String;

// ── HttpParams ───────────────────────────────────────────────────────

/// HTTP-only request hints. The WebSocket transport ignores these.
#[derive(Debug, Clone)]
pub struct HttpParams {
    pub method: Method,
    /// Path template with `{placeholder}` segments, relative to the API root.
    pub path: &'static str,
    /// Wraps the body as `{key: body}` before sending.
    pub request_key: Option<&'static str>,
    /// Key under which the raw response body is placed in the synthesized
    /// envelope payload, matching the WebSocket response shape.
    pub response_key: Option<&'static str>,
}

// ── RequestEnvelope ──────────────────────────────────────────────────

/// A single outbound request, tagged with a correlation id and action.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub request_id: Uuid,
    /// Dotted resource/verb string, e.g. `device/list`.
    pub action: &'static str,
    pub body: Map<String, Value>,
    /// Substitutions for `{placeholder}` path segments; sent as top-level
    /// fields on WebSocket.
    pub path_params: Vec<(&'static str, String)>,
    pub http: HttpParams,
    /// Bearer token, stamped just before send by the token manager.
    pub bearer: Option<String>,
}

impl RequestEnvelope {
    pub fn new(action: &'static str, method: Method, path: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            action,
            body: Map::new(),
            path_params: Vec::new(),
            http: HttpParams {
                method,
                path,
                request_key: None,
                response_key: None,
            },
            bearer: None,
        }
    }

    /// Add a `{placeholder}` substitution.
    pub fn path_param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.path_params.push((key, value.into()));
        self
    }

    /// Add a body field. `Null` values are dropped so optional filters
    /// never reach the wire.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.body.insert(key.to_owned(), value);
        }
        self
    }

    /// Merge every field of a serializable params struct into the body.
    /// `None` fields are expected to be skipped by the struct's serde
    /// attributes.
    pub fn fields<T: serde::Serialize>(mut self, params: &T) -> Self {
        if let Ok(Value::Object(map)) = serde_json::to_value(params) {
            for (key, value) in map {
                if !value.is_null() {
                    self.body.insert(key, value);
                }
            }
        }
        self
    }

    /// Wrap the body as `{key: body}` on both transports.
    pub fn request_key(mut self, key: &'static str) -> Self {
        self.http.request_key = Some(key);
        self
    }

    /// Key the raw HTTP response body is wrapped under in the synthesized
    /// envelope (e.g. `devices` for `GET /device`).
    pub fn response_key(mut self, key: &'static str) -> Self {
        self.http.response_key = Some(key);
        self
    }

    /// Concrete HTTP path with every `{placeholder}` substituted.
    pub fn http_path(&self) -> Result<String, Error> {
        let mut path = self.http.path.to_owned();
        for (key, value) in &self.path_params {
            path = path.replace(&format!("{{{key}}}"), value);
        }
        if path.contains('{') {
            return Err(Error::Config {
                message: format!("unresolved placeholder in path '{path}'"),
            });
        }
        Ok(path)
    }

    /// Body for HTTP methods that carry one, with the wrapper key applied.
    pub fn http_body(&self) -> Value {
        match self.http.request_key {
            Some(key) => {
                let mut wrapped = Map::new();
                wrapped.insert(key.to_owned(), Value::Object(self.body.clone()));
                Value::Object(wrapped)
            }
            None => Value::Object(self.body.clone()),
        }
    }

    /// Body fields rendered as query parameters (GET/DELETE on HTTP).
    /// Arrays are comma-joined, scalars stringified.
    pub fn http_query(&self) -> Vec<(String, String)> {
        self.body
            .iter()
            .filter_map(|(key, value)| query_value(value).map(|v| (key.clone(), v)))
            .collect()
    }

    /// The full WebSocket frame value.
    pub fn to_ws_value(&self) -> Value {
        let mut frame = Map::new();
        frame.insert("action".to_owned(), Value::String(self.action.to_owned()));
        frame.insert(
            "requestId".to_owned(),
            Value::String(self.request_id.to_string()),
        );
        for (key, value) in &self.path_params {
            frame.insert((*key).to_owned(), Value::String(value.clone()));
        }
        match self.http.request_key {
            Some(key) => {
                frame.insert(key.to_owned(), Value::Object(self.body.clone()));
            }
            None => {
                for (key, value) in &self.body {
                    frame.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(frame)
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null | Value::Object(_) => None,
    }
}

// ── ResponseEnvelope ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Error,
}

/// A single inbound response or server-initiated event.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Correlation id; absent on server-initiated events.
    pub request_id: Option<Uuid>,
    pub action: Option<String>,
    pub status: ResponseStatus,
    pub code: Option<u16>,
    pub error: Option<String>,
    pub subscription_id: Option<SubscriptionId>,
    /// The full response object; resource fields are extracted by key.
    pub payload: Value,
}

impl ResponseEnvelope {
    /// Parse a decoded WebSocket frame. Frames without a `status` field
    /// (server-initiated events) count as success.
    pub fn from_ws_value(value: Value) -> Self {
        let request_id = value
            .get("requestId")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let status = match value.get("status").and_then(Value::as_str) {
            Some("error") => ResponseStatus::Error,
            _ => ResponseStatus::Success,
        };
        let code = value
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok());
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let subscription_id = value.get("subscriptionId").and_then(normalize_id);

        Self {
            request_id,
            action,
            status,
            code,
            error,
            subscription_id,
            payload: value,
        }
    }

    /// Synthesized success envelope (HTTP transport and subscription
    /// bootstrap responses).
    pub fn success(request_id: Uuid, action: &str, payload: Value) -> Self {
        Self {
            request_id: Some(request_id),
            action: Some(action.to_owned()),
            status: ResponseStatus::Success,
            code: None,
            error: None,
            subscription_id: None,
            payload,
        }
    }

    /// Synthesized error envelope with the HTTP status in `code`.
    pub fn failure(request_id: Uuid, action: &str, code: u16, message: String) -> Self {
        Self {
            request_id: Some(request_id),
            action: Some(action.to_owned()),
            status: ResponseStatus::Error,
            code: Some(code),
            error: Some(message),
            subscription_id: None,
            payload: Value::Null,
        }
    }

    /// Synthesized subscription event (HTTP poll workers).
    pub fn event(action: &str, subscription_id: SubscriptionId, payload: Value) -> Self {
        Self {
            request_id: None,
            action: Some(action.to_owned()),
            status: ResponseStatus::Success,
            code: None,
            error: None,
            subscription_id: Some(subscription_id),
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// The API error an error envelope represents.
    pub fn to_api_error(&self, transport: &'static str) -> Error {
        Error::Api {
            transport,
            action: self.action.clone().unwrap_or_else(|| "unknown".into()),
            code: self.code.unwrap_or(500),
            message: self
                .error
                .clone()
                .unwrap_or_else(|| "unknown server error".into()),
        }
    }

    /// Remove and return `payload[key]`, or the whole payload when no key
    /// is given.
    pub fn take_payload(&mut self, key: Option<&str>) -> Value {
        match key {
            Some(key) => self
                .payload
                .get_mut(key)
                .map_or(Value::Null, Value::take),
            None => self.payload.take(),
        }
    }
}

/// `subscriptionId` arrives as an integer or a string depending on the
/// server version; both normalize to a string key.
fn normalize_id(value: &Value) -> Option<SubscriptionId> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
