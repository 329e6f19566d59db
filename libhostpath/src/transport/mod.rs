//! QUIC transport layer for CSI messages.
//!
//! This module provides [`CsiClient`](client::CsiClient) and
//! [`CsiServer`](server::CsiServer), which exchange JSON-encoded
//! [`CsiMessage`](crate::message::CsiMessage) values over QUIC
//! bi-directional streams using `quinn`.

pub mod client;
pub mod server;

/// Upper bound for a single serialized message.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
