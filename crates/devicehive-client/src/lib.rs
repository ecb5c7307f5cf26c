//! High-level async client for the DeviceHive IoT platform.
//!
//! One behavioral contract over two interchangeable transports:
//!
//! - **[`DeviceHive`]** — Central facade managing the full lifecycle:
//!   [`connect()`](DeviceHive::connect) picks the transport from the URL
//!   scheme (`http(s)` long-poll or `ws(s)` WebSocket), authenticates, and
//!   spawns the dispatcher. Typed operations (`list_devices`,
//!   `send_command`, `subscribe_notifications`, …) build one request
//!   envelope each and decode the result.
//!
//! - **[`DeviceHandler`]** — Application callbacks, invoked serially by
//!   the dispatcher task: `handle_connect` once per connection, then
//!   typed subscription events and `handle_disconnect`.
//!
//! - **Subscriptions** — Persistent command/notification streams filtered
//!   by device set and name set. Long-poll workers on HTTP, server-pushed
//!   frames on WebSocket; identical routing either way.
//!
//! Tokens refresh transparently: a 401 triggers one re-authentication
//! (refresh token, then login credentials) and a single retry.

pub mod client;
pub mod handler;
pub mod subscription;

mod api;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{ClientConfig, DeviceHive};
pub use handler::DeviceHandler;
pub use subscription::SubscriptionKind;

pub use devicehive_api::envelope::{
    RequestEnvelope, ResponseEnvelope, ResponseStatus, SubscriptionId,
};
pub use devicehive_api::error::Error;

// Re-export wire models at the crate root for ergonomics.
pub use devicehive_api::models::{
    AccessTokens,
    ClusterInfo,
    Command,
    CommandFilter,
    Configuration,
    Device,
    DeviceFilter,
    DeviceType,
    DeviceTypeFilter,
    DeviceUpdate,
    Network,
    NetworkFilter,
    Notification,
    NotificationFilter,
    ServerInfo,
    TokenPayload,
    User,
    UserCreate,
    UserFilter,
};
