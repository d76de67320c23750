//! Broker engine
//!
//! The routing service of the chat. It owns a topic registry and a delivery
//! fabric and implements every chat operation on top of them:
//! - connect / unsubscribe_all: the lifecycle of one connected user
//! - create_group / join_group / leave_group: group membership
//! - send_message: resolve the target, check the author, fan out
//! - list_topics: descriptors of everything registered
//!
//! Concurrency and usage notes:
//! - The broker is shared as `Arc<Broker<..>>`; all methods take `&self`.
//!   Exclusive access is the registry's and the fabric's business.
//! - Only `send_message` is async. Fan-out is sequential and each recipient
//!   gets at most `send_timeout` of waiting on a full channel before the
//!   message is dropped for them, so one stalled reader can delay a group
//!   send by that much per send but never block it forever.

use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, info, warn};

use crate::broker::message::Message;
use crate::broker::pubsub::{LocalPubSub, PubSub};
use crate::broker::storage::{LocalStorage, Retention, Storage};
use crate::broker::topic::{Topic, TopicInfo, User};
use crate::config::BrokerSettings;
use crate::utils::error::ChatError;

#[derive(Debug)]
pub struct Broker<S = LocalStorage, P = LocalPubSub> {
    storage: S,
    pubsub: P,
    send_timeout: Duration,
}

impl Broker {
    /// Broker with in-memory collaborators sized from configuration.
    pub fn from_settings(settings: &BrokerSettings) -> Self {
        Self::new(
            LocalStorage::new(),
            LocalPubSub::new(settings.channel_capacity),
            Duration::from_millis(settings.send_timeout_ms),
        )
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::from_settings(&BrokerSettings::default())
    }
}

impl<S: Storage, P: PubSub> Broker<S, P> {
    pub fn new(storage: S, pubsub: P, send_timeout: Duration) -> Self {
        Self {
            storage,
            pubsub,
            send_timeout,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn pubsub(&self) -> &P {
        &self.pubsub
    }

    /// Register `username` and open its delivery channel.
    ///
    /// The caller must drain the returned receiver and call
    /// [`Broker::unsubscribe_all`] exactly once when the connection ends.
    pub fn connect(&self, username: &str) -> Result<Receiver<Message>, ChatError> {
        self.storage
            .create(Topic::personal(username))
            .map_err(|_| ChatError::UsernameTaken(username.to_string()))?;
        Ok(self.pubsub.create(username))
    }

    /// Create a group chat with `username` as its first member.
    pub fn create_group(&self, topic: &str, username: &str) -> Result<(), ChatError> {
        let mut group = Topic::group(topic);
        group.subscribe(User::new(username));
        self.storage
            .create(group)
            .map_err(|_| ChatError::NameTaken(topic.to_string()))
    }

    pub fn join_group(&self, topic: &str, username: &str) -> Result<(), ChatError> {
        let mut personal = false;
        let outcome = self.storage.update(topic, &mut |t| {
            if t.is_group() {
                t.subscribe(User::new(username));
            } else {
                personal = true;
            }
            Retention::Keep
        });

        match outcome {
            None => Err(ChatError::GroupNotFound(topic.to_string())),
            Some(_) if personal => Err(ChatError::NotAGroup(topic.to_string())),
            Some(_) => Ok(()),
        }
    }

    /// Leave a group chat. The group is deleted once its last member leaves.
    pub fn leave_group(&self, topic: &str, username: &str) -> Result<(), ChatError> {
        let mut personal = false;
        let outcome = self.storage.update(topic, &mut |t| {
            if !t.is_group() {
                personal = true;
                return Retention::Keep;
            }
            t.unsubscribe(username);
            if t.is_empty() {
                Retention::Remove
            } else {
                Retention::Keep
            }
        });

        match outcome {
            None => Err(ChatError::GroupNotFound(topic.to_string())),
            Some(_) if personal => Err(ChatError::NotAGroup(topic.to_string())),
            Some(Retention::Remove) => {
                info!("Group {topic} is empty and was removed");
                Ok(())
            }
            Some(Retention::Keep) => Ok(()),
        }
    }

    /// Send `text` from `username` to `topic`.
    ///
    /// A personal topic delivers to its owner; a group delivers to every
    /// member but the author. Returns how many recipients got the message.
    pub async fn send_message(
        &self,
        topic: &str,
        text: &str,
        username: &str,
    ) -> Result<usize, ChatError> {
        let target = self
            .storage
            .get(topic)
            .ok_or_else(|| ChatError::TopicNotFound(topic.to_string()))?;

        if target.is_group() && !target.is_subscribed(username) {
            return Err(ChatError::NotMember(topic.to_string()));
        }

        let recipients: Vec<String> = if target.is_group() {
            target
                .members()
                .filter(|user| user.name != username)
                .map(|user| user.name.clone())
                .collect()
        } else {
            vec![target.name().to_string()]
        };

        let msg = Message::new(text, username, target.info());
        let mut delivered = 0;
        for recipient in &recipients {
            if self.deliver(recipient, msg.clone()).await {
                delivered += 1;
            }
        }

        Ok(delivered)
    }

    async fn deliver(&self, recipient: &str, msg: Message) -> bool {
        let Some(sender) = self.pubsub.get(recipient) else {
            debug!("No delivery channel for {recipient}, skipping");
            return false;
        };

        match sender.send_timeout(msg, self.send_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(msg)) => {
                warn!(
                    "Delivery channel of {recipient} is full, dropped message {} after {:?}",
                    msg.id, self.send_timeout
                );
                false
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!("Delivery channel of {recipient} is closed, skipping");
                false
            }
        }
    }

    pub fn list_topics(&self) -> Vec<TopicInfo> {
        self.storage.list().iter().map(Topic::info).collect()
    }

    /// Remove every trace of `username`: group memberships, its delivery
    /// channel and its personal topic. Safe to call more than once.
    ///
    /// The personal topic goes last. Until it is gone the name stays taken,
    /// so a reconnect under the same name cannot open a channel that this
    /// cleanup would then drop.
    pub fn unsubscribe_all(&self, username: &str) {
        for topic in self.storage.list() {
            let outcome = self.storage.update(topic.name(), &mut |t| {
                if t.unsubscribe(username) && t.is_group() && t.is_empty() {
                    Retention::Remove
                } else {
                    Retention::Keep
                }
            });

            match outcome {
                None => debug!("Topic {} vanished during cleanup of {username}", topic.name()),
                Some(Retention::Remove) => {
                    info!("Group {} is empty and was removed", topic.name())
                }
                Some(Retention::Keep) => {}
            }
        }

        self.pubsub.delete(username);
        self.storage.delete(username);
        info!("Cleaned up user {username}");
    }
}
