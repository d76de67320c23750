//! The `client` module implements the interactive terminal client.
//!
//! It connects to the WebSocket server under a username, prints delivered
//! messages as they arrive and drives requests from a numbered menu.

pub mod terminal;
pub use terminal::run_client;
