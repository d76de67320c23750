//! Topic management
//!
//! A `Topic` is either a personal inbox (named after its owner, who is its
//! only member) or a group chat with an explicit member set. Membership is
//! keyed by username, so subscribing twice is a no-op overwrite.
//!
//! Concurrency note: a `Topic` value is a plain snapshot. Shared state lives
//! in the registry, which serialises every mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type Username = String;

/// A chat participant, identified only by its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub name: Username,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Personal,
    Group,
}

/// Lightweight descriptor of a topic, as reported by listings and carried
/// inside every delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    pub kind: TopicKind,
}

#[derive(Debug, Clone)]
pub struct Topic {
    name: String,
    kind: TopicKind,
    members: HashMap<Username, User>,
}

impl Topic {
    /// Create the personal inbox of `owner`. The owner is its implicit member.
    pub fn personal(owner: &str) -> Self {
        let mut topic = Self {
            name: owner.to_string(),
            kind: TopicKind::Personal,
            members: HashMap::new(),
        };
        topic.subscribe(User::new(owner));
        topic
    }

    /// Create an empty group chat.
    pub fn group(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TopicKind::Group,
            members: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TopicKind {
        self.kind
    }

    pub fn is_group(&self) -> bool {
        self.kind == TopicKind::Group
    }

    /// Add a member. Re-adding an existing member has no effect.
    pub fn subscribe(&mut self, user: User) {
        self.members.insert(user.name.clone(), user);
    }

    /// Remove a member. Returns whether it was subscribed.
    pub fn unsubscribe(&mut self, username: &str) -> bool {
        self.members.remove(username).is_some()
    }

    pub fn is_subscribed(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &User> {
        self.members.values()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn info(&self) -> TopicInfo {
        TopicInfo {
            name: self.name.clone(),
            kind: self.kind,
        }
    }
}
