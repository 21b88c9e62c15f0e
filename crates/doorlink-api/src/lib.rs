// doorlink-api: Async Rust client for the garage door cloud service (REST snapshots + push WebSocket)

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod transport;
pub mod websocket;

pub use auth::TokenSet;
pub use client::CloudClient;
pub use error::Error;
pub use models::{CommandKey, DeviceRecord, DoorRecord};
pub use transport::TransportConfig;
pub use websocket::{
    ConnectionState, MessageHandler, PushConnection, PushMessage, ReconnectConfig, RetryBudget,
};
