//! Delivery fabric
//!
//! One bounded `mpsc` channel per connected username. The broker pushes
//! into the sending half; the transport drains the receiving half into the
//! client's socket. The fabric never looks at message content.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

use crate::broker::message::Message;

pub trait PubSub: Send + Sync {
    /// Allocate a fresh channel for `username`, replacing any previous one,
    /// and hand back its receiving half.
    fn create(&self, username: &str) -> Receiver<Message>;

    /// Sending half for `username`, or `None` if that user has no channel.
    fn get(&self, username: &str) -> Option<Sender<Message>>;

    /// Drop the channel of `username`. The receiver sees the channel close
    /// once any in-flight send has finished.
    fn delete(&self, username: &str);
}

#[derive(Debug)]
pub struct LocalPubSub {
    capacity: usize,
    subscribers: Mutex<HashMap<String, Sender<Message>>>,
}

impl LocalPubSub {
    pub const DEFAULT_CAPACITY: usize = 64;

    /// `capacity` is clamped to at least one slot, as `mpsc::channel` requires.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.subscribers().contains_key(username)
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, Sender<Message>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for LocalPubSub {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl PubSub for LocalPubSub {
    fn create(&self, username: &str) -> Receiver<Message> {
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.subscribers().insert(username.to_string(), tx).is_some() {
            debug!("Replaced existing delivery channel for {username}");
        }
        rx
    }

    fn get(&self, username: &str) -> Option<Sender<Message>> {
        self.subscribers().get(username).cloned()
    }

    fn delete(&self, username: &str) {
        self.subscribers().remove(username);
    }
}
