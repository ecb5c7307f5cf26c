// Payload codec
//
// Pluggable encoding boundary between envelope values and wire bytes.
// JSON is the default; the WebSocket transport uses `is_text` to pick
// the data frame opcode.

use serde_json::Value;

use crate::error::Error;

/// Encodes and decodes payloads at the wire boundary.
pub trait PayloadCodec: Send + Sync + 'static {
    /// `true` when the encoded form is text (selects text frames on
    /// WebSocket); `false` selects binary frames.
    fn is_text(&self) -> bool;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, Error>;
}

/// The default JSON codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn is_text(&self) -> bool {
        true
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(value).map_err(|e| Error::codec(e, value.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::codec(e, String::from_utf8_lossy(bytes)))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn json_round_trip() {
        let codec = JsonCodec;
        let value = json!({
            "action": "device/list",
            "requestId": "7b1afc30-7cf6-4a21-b4e6-0d7c2b5a6a4e",
            "take": 10,
            "nested": { "a": [1, 2, 3], "b": null }
        });

        let bytes = codec.encode(&value).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_failure_keeps_body() {
        let codec = JsonCodec;
        let result = codec.decode(b"{not json");
        match result {
            Err(Error::Codec { ref body, .. }) => assert_eq!(body, "{not json"),
            other => panic!("expected Codec error, got: {other:?}"),
        }
    }

    #[test]
    fn json_codec_is_text() {
        assert!(JsonCodec.is_text());
    }
}
