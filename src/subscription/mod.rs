//! GraphQL subscriptions over WebSocket

pub mod client;

pub use client::{
    Dialect, HandshakeState, SubscriptionClient, SubscriptionSession, WsMessage,
    DEFAULT_HANDSHAKE_TIMEOUT,
};
