//! The `transport` module is responsible for handling network communication
//! with clients via WebSockets.
//!
//! It defines the messaging protocol used between clients and the server,
//! validates and dispatches requests to the broker, and implements the
//! WebSocket server itself.

pub mod handler;
pub mod message;
pub mod websocket;
