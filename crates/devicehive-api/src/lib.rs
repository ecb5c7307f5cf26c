// devicehive-api: wire-level async Rust client for the DeviceHive
// REST/WebSocket API

pub mod codec;
pub mod envelope;
pub mod error;
pub mod models;
pub mod token;
pub mod transport;

pub use error::Error;
