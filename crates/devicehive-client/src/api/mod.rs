// Typed API operations
//
// Each resource file adds inherent methods to `DeviceHive` that build
// one envelope (HTTP method/path/keys + WebSocket action), post it, and
// decode the payload. The split mirrors the server's resource surface.

mod commands;
mod device_types;
mod devices;
mod networks;
mod notifications;
mod server;
mod subscriptions;
mod tokens;
mod users;

use serde::de::DeserializeOwned;
use serde_json::Value;

use devicehive_api::error::Error;

/// Decode a payload fragment, keeping the raw value in the error.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::codec(e, value.to_string()))
}

/// Overlay server-assigned fields (`id`, `timestamp`, …) onto the fields
/// the caller sent, so insert operations return the full resource.
pub(crate) fn merge_objects(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn merge_overlays_server_fields() {
        let merged = merge_objects(
            json!({ "command": "ping", "parameters": { "count": 1 } }),
            json!({ "id": 42, "timestamp": "2026-08-07T12:00:00.000000" }),
        );
        assert_eq!(merged["command"], "ping");
        assert_eq!(merged["id"], 42);
        assert_eq!(merged["parameters"]["count"], 1);
    }

    #[test]
    fn merge_keeps_base_on_null_overlay() {
        let merged = merge_objects(json!({ "a": 1 }), Value::Null);
        assert_eq!(merged["a"], 1);
    }
}
