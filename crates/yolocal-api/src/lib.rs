// yolocal-api: Async Rust client for the YoLink local hub (HTTP control + MQTT events)

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod mqtt;
pub mod transport;

pub use auth::{HubCredentials, Token, TokenManager};
pub use client::HubClient;
pub use error::Error;
pub use models::{CommandReply, HubDevice, StateReply};
pub use mqtt::{DeviceEvent, EventSubscriber, ReconnectConfig, SubscriptionState};
pub use transport::TransportConfig;
