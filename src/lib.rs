//! # PopChat
//!
//! `popchat` is a minimal, in-memory real-time chat server built with Rust.
//! Clients connect over WebSockets under a username, receive a personal
//! message stream, and talk either directly (personal topics) or through
//! named group chats.
//!
//! ## Core Modules
//!
//! - `broker`: topic registry, per-user delivery channels and message routing.
//! - `client`: the interactive terminal client.
//! - `config`: loading and merging server configuration.
//! - `transport`: the JSON protocol and the WebSocket server.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
