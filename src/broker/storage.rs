//! Topic registry
//!
//! The registry is the only owner of topic state. Callers get snapshot
//! clones out of it and write changes back either wholesale (`save`) or
//! through `update`, which runs a closure against the stored topic while the
//! registry is locked.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::broker::topic::Topic;
use crate::utils::error::ChatError;

/// What to do with a topic after `Storage::update` has mutated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep,
    Remove,
}

pub trait Storage: Send + Sync {
    fn get(&self, name: &str) -> Option<Topic>;

    /// Register a new topic. Fails with `NameTaken` if the name is in use.
    fn create(&self, topic: Topic) -> Result<(), ChatError>;

    /// Insert or fully replace the stored topic.
    fn save(&self, topic: Topic);

    fn list(&self) -> Vec<Topic>;

    /// Remove a topic by name. Removing an absent topic is not an error.
    fn delete(&self, name: &str);

    /// Atomically mutate the topic called `name`.
    ///
    /// Returns `None` when no such topic exists, otherwise the retention
    /// decision made by `apply`, which has already been carried out.
    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&mut Topic) -> Retention,
    ) -> Option<Retention>;
}

/// In-memory registry. A single mutex guards the whole map, reads included.
#[derive(Debug, Default)]
pub struct LocalStorage {
    topics: Mutex<HashMap<String, Topic>>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for LocalStorage {
    fn get(&self, name: &str) -> Option<Topic> {
        self.topics().get(name).cloned()
    }

    fn create(&self, topic: Topic) -> Result<(), ChatError> {
        let mut topics = self.topics();
        if topics.contains_key(topic.name()) {
            return Err(ChatError::NameTaken(topic.name().to_string()));
        }
        topics.insert(topic.name().to_string(), topic);
        Ok(())
    }

    fn save(&self, topic: Topic) {
        self.topics().insert(topic.name().to_string(), topic);
    }

    fn list(&self) -> Vec<Topic> {
        self.topics().values().cloned().collect()
    }

    fn delete(&self, name: &str) {
        self.topics().remove(name);
    }

    fn update(
        &self,
        name: &str,
        apply: &mut dyn FnMut(&mut Topic) -> Retention,
    ) -> Option<Retention> {
        let mut topics = self.topics();
        let topic = topics.get_mut(name)?;
        let retention = apply(topic);
        if retention == Retention::Remove {
            topics.remove(name);
        }
        Some(retention)
    }
}
