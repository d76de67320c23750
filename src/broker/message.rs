//! Message definitions for the broker
//!
//! `Message` is built once per send and cloned onto every recipient's
//! delivery channel.
//!
//! Notes on fields:
//! - `id`: UUID v4, unique per send (all recipients see the same id)
//! - `author`: username of the sender
//! - `topic`: descriptor of the topic the message went through
//! - `timestamp`: milliseconds since UNIX epoch, set when the message is built

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::broker::topic::TopicInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: String,
    pub topic: TopicInfo,
    pub timestamp: i64,
}

impl Message {
    pub fn new(text: &str, author: &str, topic: TopicInfo) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            author: author.to_string(),
            topic,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
