//! Wire protocol
//!
//! JSON text frames, tagged by a `"type"` field. The first frame a client
//! sends must be `connect`; everything after that is a request answered by
//! exactly one reply (`ok`, `topics` or `error`). Delivered chat messages
//! arrive as `message` frames interleaved with the replies.

use serde::{Deserialize, Serialize};

use crate::broker::message::Message;
use crate::broker::topic::TopicInfo;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect { username: String },
    ListTopics,
    SendMessage { topic: String, text: String },
    CreateGroup { topic: String },
    JoinGroup { topic: String },
    LeaveGroup { topic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        username: String,
    },
    Ok {},
    Topics {
        topics: Vec<TopicInfo>,
    },
    Error {
        message: String,
    },
    Message {
        id: String,
        text: String,
        author: String,
        topic: TopicInfo,
        timestamp: i64,
    },
}

impl ServerMessage {
    pub fn error(message: impl ToString) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }
}

impl From<Message> for ServerMessage {
    fn from(msg: Message) -> Self {
        ServerMessage::Message {
            id: msg.id,
            text: msg.text,
            author: msg.author,
            topic: msg.topic,
            timestamp: msg.timestamp,
        }
    }
}
