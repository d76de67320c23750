//! Request dispatch
//!
//! Validates a decoded request on behalf of its connected user and turns it
//! into a broker call. Field checks happen here, before the broker is
//! touched; existence and membership checks are left to the broker, which
//! owns topic state.

use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

use crate::broker::Broker;
use crate::broker::message::Message;
use crate::transport::message::{ClientMessage, ServerMessage};
use crate::utils::error::ChatError;

pub fn validate_username(username: &str) -> Result<(), ChatError> {
    if username.is_empty() {
        return Err(ChatError::InvalidArgument("username must not be empty"));
    }
    Ok(())
}

pub fn validate_group(topic: &str) -> Result<(), ChatError> {
    if topic.is_empty() {
        return Err(ChatError::InvalidArgument("group name must not be empty"));
    }
    Ok(())
}

pub fn validate_send(topic: &str, text: &str, username: &str) -> Result<(), ChatError> {
    if topic.is_empty() {
        return Err(ChatError::InvalidArgument("recipient must not be empty"));
    }
    if topic == username {
        return Err(ChatError::InvalidArgument("you can't send message yourself"));
    }
    if text.is_empty() {
        return Err(ChatError::InvalidArgument("message text must not be empty"));
    }
    Ok(())
}

/// Open a session for `username`.
pub fn connect(broker: &Broker, username: &str) -> Result<Receiver<Message>, ChatError> {
    validate_username(username)?;
    let deliveries = broker.connect(username)?;
    info!("Connected a new user: {username}");
    Ok(deliveries)
}

/// Execute one request of an already connected `username` and build the reply.
pub async fn dispatch(broker: &Broker, username: &str, request: ClientMessage) -> ServerMessage {
    let result = match request {
        ClientMessage::Connect { .. } => {
            return ServerMessage::error("already connected");
        }
        ClientMessage::ListTopics => {
            return ServerMessage::Topics {
                topics: broker.list_topics(),
            };
        }
        ClientMessage::CreateGroup { topic } => {
            validate_group(&topic).and_then(|_| broker.create_group(&topic, username)).map(|_| {
                info!("User {username} created and automatically joined group {topic}")
            })
        }
        ClientMessage::JoinGroup { topic } => validate_group(&topic)
            .and_then(|_| broker.join_group(&topic, username))
            .map(|_| info!("User {username} joined group {topic}")),
        ClientMessage::LeaveGroup { topic } => validate_group(&topic)
            .and_then(|_| broker.leave_group(&topic, username))
            .map(|_| info!("User {username} left group {topic}")),
        ClientMessage::SendMessage { topic, text } => {
            match validate_send(&topic, &text, username) {
                Ok(()) => broker
                    .send_message(&topic, &text, username)
                    .await
                    .map(|delivered| {
                        info!("User {username} sent message to {topic} ({delivered} recipients)")
                    }),
                Err(e) => Err(e),
            }
        }
    };

    match result {
        Ok(()) => ServerMessage::Ok {},
        Err(e) => {
            warn!("Request from {username} failed ({}): {e}", e.as_label());
            ServerMessage::error(e)
        }
    }
}
