use super::Broker;
use super::message::Message;
use super::pubsub::{LocalPubSub, PubSub};
use super::storage::{LocalStorage, Retention, Storage};
use super::topic::{Topic, TopicInfo, TopicKind, User};
use crate::utils::error::{ChatError, ErrorKind};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};

fn broker() -> Broker {
    Broker::new(
        LocalStorage::new(),
        LocalPubSub::default(),
        Duration::from_millis(100),
    )
}

fn group_info(name: &str) -> TopicInfo {
    TopicInfo {
        name: name.to_string(),
        kind: TopicKind::Group,
    }
}

#[test]
fn test_topic_personal_has_owner_as_member() {
    let topic = Topic::personal("alice");
    assert_eq!(topic.name(), "alice");
    assert_eq!(topic.kind(), TopicKind::Personal);
    assert!(topic.is_subscribed("alice"));
    assert_eq!(topic.member_count(), 1);
}

#[test]
fn test_topic_subscribe_and_unsubscribe() {
    let mut topic = Topic::group("rust");
    assert!(topic.is_empty());

    topic.subscribe(User::new("alice"));
    topic.subscribe(User::new("alice"));
    assert_eq!(topic.member_count(), 1);

    assert!(topic.unsubscribe("alice"));
    assert!(!topic.unsubscribe("alice"));
    assert!(topic.is_empty());
}

#[test]
fn test_storage_create_rejects_duplicate_name() {
    let storage = LocalStorage::new();
    storage.create(Topic::personal("alice")).unwrap();

    let err = storage.create(Topic::group("alice")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(storage.get("alice").unwrap().kind(), TopicKind::Personal);
}

#[test]
fn test_storage_save_delete_and_list() {
    let storage = LocalStorage::new();
    let mut topic = Topic::group("rust");
    storage.save(topic.clone());
    topic.subscribe(User::new("bob"));
    storage.save(topic);

    assert!(storage.get("rust").unwrap().is_subscribed("bob"));
    assert_eq!(storage.list().len(), 1);

    storage.delete("rust");
    storage.delete("rust");
    assert!(storage.get("rust").is_none());
    assert!(storage.list().is_empty());
}

#[test]
fn test_storage_update() {
    let storage = LocalStorage::new();
    assert_eq!(storage.update("missing", &mut |_| Retention::Keep), None);

    storage.create(Topic::group("rust")).unwrap();
    let kept = storage.update("rust", &mut |t| {
        t.subscribe(User::new("alice"));
        Retention::Keep
    });
    assert_eq!(kept, Some(Retention::Keep));
    assert!(storage.get("rust").unwrap().is_subscribed("alice"));

    let removed = storage.update("rust", &mut |_| Retention::Remove);
    assert_eq!(removed, Some(Retention::Remove));
    assert!(storage.get("rust").is_none());
}

#[tokio::test]
async fn test_pubsub_create_replaces_previous_channel() {
    let pubsub = LocalPubSub::new(4);
    let mut first = pubsub.create("alice");
    let mut second = pubsub.create("alice");

    assert!(first.recv().await.is_none());

    let tx = pubsub.get("alice").unwrap();
    tx.send(Message::new("hi", "bob", group_info("g")))
        .await
        .unwrap();
    assert_eq!(second.recv().await.unwrap().text, "hi");
}

#[tokio::test]
async fn test_pubsub_delete_closes_channel() {
    let pubsub = LocalPubSub::default();
    let mut rx = pubsub.create("alice");
    assert!(pubsub.contains("alice"));

    pubsub.delete("alice");
    assert!(!pubsub.contains("alice"));
    assert!(pubsub.get("alice").is_none());
    assert!(rx.recv().await.is_none());
}

#[test]
fn test_pubsub_zero_capacity_is_clamped() {
    let pubsub = LocalPubSub::new(0);
    let _rx = pubsub.create("alice");
    let tx = pubsub.get("alice").unwrap();

    assert!(tx.try_send(Message::new("one", "bob", group_info("g"))).is_ok());
    assert!(tx.try_send(Message::new("two", "bob", group_info("g"))).is_err());
}

#[test]
fn test_connect_twice_fails_without_touching_state() {
    let broker = broker();
    let _rx = broker.connect("alice").unwrap();

    let err = broker.connect("alice").unwrap_err();
    assert_eq!(err, ChatError::UsernameTaken("alice".to_string()));
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(err.to_string(), "this username alice already exists");

    assert_eq!(broker.list_topics().len(), 1);
    assert!(broker.pubsub().contains("alice"));
}

#[test]
fn test_connect_with_group_name_fails() {
    let broker = broker();
    let _rx = broker.connect("alice").unwrap();
    broker.create_group("rust", "alice").unwrap();

    let err = broker.connect("rust").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn test_create_group_is_listed() {
    let broker = broker();
    let _rx = broker.connect("alice").unwrap();
    broker.create_group("rust", "alice").unwrap();

    let topics = broker.list_topics();
    assert!(topics.contains(&group_info("rust")));
    assert!(topics.contains(&TopicInfo {
        name: "alice".to_string(),
        kind: TopicKind::Personal,
    }));

    let group = broker.storage().get("rust").unwrap();
    assert!(group.is_subscribed("alice"));
}

#[test]
fn test_create_group_with_taken_name() {
    let broker = broker();
    let _rx = broker.connect("alice").unwrap();

    let err = broker.create_group("alice", "alice").unwrap_err();
    assert_eq!(err, ChatError::NameTaken("alice".to_string()));
    assert_eq!(err.to_string(), "chat name \"alice\" already taken");
}

#[test]
fn test_join_unknown_group() {
    let broker = broker();
    let err = broker.join_group("nowhere", "alice").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "group chat \"nowhere\" does not exist");
}

#[test]
fn test_join_twice_is_idempotent() {
    let broker = broker();
    broker.create_group("rust", "alice").unwrap();
    broker.join_group("rust", "bob").unwrap();
    broker.join_group("rust", "bob").unwrap();

    assert_eq!(broker.storage().get("rust").unwrap().member_count(), 2);
}

#[test]
fn test_group_operations_on_personal_topic() {
    let broker = broker();
    let _rx = broker.connect("alice").unwrap();

    let err = broker.join_group("alice", "bob").unwrap_err();
    assert_eq!(err, ChatError::NotAGroup("alice".to_string()));
    let err = broker.leave_group("alice", "alice").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let personal = broker.storage().get("alice").unwrap();
    assert!(personal.is_subscribed("alice"));
    assert!(!personal.is_subscribed("bob"));
}

#[test]
fn test_leave_last_member_deletes_group() {
    let broker = broker();
    broker.create_group("rust", "alice").unwrap();
    broker.join_group("rust", "bob").unwrap();

    broker.leave_group("rust", "alice").unwrap();
    assert!(broker.list_topics().contains(&group_info("rust")));

    broker.leave_group("rust", "bob").unwrap();
    assert!(!broker.list_topics().contains(&group_info("rust")));
    assert!(broker.storage().get("rust").is_none());

    let err = broker.leave_group("rust", "bob").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_group_fan_out_skips_author() {
    let broker = broker();
    let mut a = broker.connect("a").unwrap();
    let mut b = broker.connect("b").unwrap();
    let mut c = broker.connect("c").unwrap();
    broker.create_group("g", "a").unwrap();
    broker.join_group("g", "b").unwrap();
    broker.join_group("g", "c").unwrap();

    let delivered = broker.send_message("g", "hello", "a").await.unwrap();
    assert_eq!(delivered, 2);

    for rx in [&mut b, &mut c] {
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.author, "a");
        assert_eq!(msg.text, "hello");
        assert_eq!(msg.topic, group_info("g"));
        assert!(rx.try_recv().is_err());
    }
    assert!(a.try_recv().is_err());
}

#[tokio::test]
async fn test_personal_message() {
    let broker = broker();
    let _alice = broker.connect("alice").unwrap();
    let mut bob = broker.connect("bob").unwrap();

    broker.send_message("bob", "psst", "alice").await.unwrap();

    let msg = bob.try_recv().unwrap();
    assert_eq!(msg.author, "alice");
    assert_eq!(msg.topic.kind, TopicKind::Personal);
    assert_eq!(msg.topic.name, "bob");
}

#[tokio::test]
async fn test_send_to_unknown_topic() {
    let broker = broker();
    let err = broker.send_message("ghost", "hi", "alice").await.unwrap_err();
    assert_eq!(err, ChatError::TopicNotFound("ghost".to_string()));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_send_to_group_without_membership() {
    let broker = broker();
    let _a = broker.connect("a").unwrap();
    let _b = broker.connect("b").unwrap();
    broker.create_group("g", "a").unwrap();

    let err = broker.send_message("g", "hi", "b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotMember);
    assert_eq!(err.to_string(), "you are not joined to the group chat: \"g\"");
}

#[tokio::test]
async fn test_member_without_channel_is_skipped() {
    let broker = broker();
    let _a = broker.connect("a").unwrap();
    let mut c = broker.connect("c").unwrap();
    broker.create_group("g", "a").unwrap();
    // "ghost" is listed as a member but never connected
    broker.join_group("g", "ghost").unwrap();
    broker.join_group("g", "c").unwrap();

    let delivered = broker.send_message("g", "hi", "a").await.unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(c.try_recv().unwrap().text, "hi");
}

#[tokio::test]
async fn test_full_channel_drops_after_timeout() {
    let broker = Broker::new(
        LocalStorage::new(),
        LocalPubSub::new(1),
        Duration::from_millis(20),
    );
    let _a = broker.connect("a").unwrap();
    let _stalled = broker.connect("b").unwrap();
    let mut c = broker.connect("c").unwrap();
    broker.create_group("g", "a").unwrap();
    broker.join_group("g", "b").unwrap();
    broker.join_group("g", "c").unwrap();

    assert_eq!(broker.send_message("g", "one", "a").await.unwrap(), 2);
    assert_eq!(c.recv().await.unwrap().text, "one");

    assert_eq!(broker.send_message("g", "two", "a").await.unwrap(), 1);
    assert_eq!(c.recv().await.unwrap().text, "two");
}

#[test]
fn test_unsubscribe_all() {
    let broker = broker();
    let _u = broker.connect("u").unwrap();
    let _v = broker.connect("v").unwrap();
    broker.create_group("g1", "u").unwrap();
    broker.create_group("g2", "v").unwrap();
    broker.join_group("g2", "u").unwrap();

    broker.unsubscribe_all("u");

    assert!(broker.storage().get("g1").is_none());
    let g2 = broker.storage().get("g2").unwrap();
    assert!(!g2.is_subscribed("u"));
    assert!(g2.is_subscribed("v"));
    assert!(broker.storage().get("u").is_none());
    assert!(!broker.pubsub().contains("u"));
    assert!(broker.storage().get("v").is_some());

    broker.unsubscribe_all("u");
    assert_eq!(broker.list_topics().len(), 2);

    // the name is free again
    let _u = broker.connect("u").unwrap();
}

#[tokio::test]
async fn test_unsubscribe_all_closes_channel() {
    let broker = broker();
    let mut rx = broker.connect("alice").unwrap();
    broker.unsubscribe_all("alice");
    assert!(rx.recv().await.is_none());
}

#[test]
fn test_concurrent_joins_are_not_lost() {
    let broker = Arc::new(broker());
    broker.create_group("g", "owner").unwrap();

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let broker = broker.clone();
            std::thread::spawn(move || broker.join_group("g", &format!("user-{i}")))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let group = broker.storage().get("g").unwrap();
    assert_eq!(group.member_count(), 33);
    for i in 0..32 {
        assert!(group.is_subscribed(&format!("user-{i}")));
    }
}

#[test]
fn test_concurrent_connects_with_same_name() {
    let broker = Arc::new(broker());
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let broker = broker.clone();
            std::thread::spawn(move || broker.connect("alice").is_ok())
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
}

/// Fabric with no connected users at all.
struct NullPubSub;

impl PubSub for NullPubSub {
    fn create(&self, _username: &str) -> Receiver<Message> {
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        rx
    }

    fn get(&self, _username: &str) -> Option<Sender<Message>> {
        None
    }

    fn delete(&self, _username: &str) {}
}

#[tokio::test]
async fn test_broker_with_injected_fabric() {
    let broker = Broker::new(LocalStorage::new(), NullPubSub, Duration::from_millis(10));
    let _rx = broker.connect("alice").unwrap();
    let _rx = broker.connect("bob").unwrap();

    let delivered = broker.send_message("bob", "hi", "alice").await.unwrap();
    assert_eq!(delivered, 0);
}

/// Registry that stops inside `delete` of one name, once before and once
/// after the entry is removed, until the test lets it go on.
struct GateStorage {
    inner: LocalStorage,
    gated: String,
    paused: Arc<Barrier>,
    resume: Arc<Barrier>,
}

impl GateStorage {
    fn new(gated: &str) -> Self {
        Self {
            inner: LocalStorage::new(),
            gated: gated.to_string(),
            paused: Arc::new(Barrier::new(2)),
            resume: Arc::new(Barrier::new(2)),
        }
    }

    fn hold(&self) {
        self.paused.wait();
        self.resume.wait();
    }
}

impl Storage for GateStorage {
    fn get(&self, name: &str) -> Option<Topic> {
        self.inner.get(name)
    }

    fn create(&self, topic: Topic) -> Result<(), ChatError> {
        self.inner.create(topic)
    }

    fn save(&self, topic: Topic) {
        self.inner.save(topic)
    }

    fn list(&self) -> Vec<Topic> {
        self.inner.list()
    }

    fn delete(&self, name: &str) {
        let gated = name == self.gated;
        if gated {
            self.hold();
        }
        self.inner.delete(name);
        if gated {
            self.hold();
        }
    }

    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(&mut Topic) -> Retention,
    ) -> Option<Retention> {
        self.inner.update(name, f)
    }
}

#[tokio::test]
async fn test_reconnect_during_cleanup_keeps_new_channel() {
    let broker = Arc::new(Broker::new(
        GateStorage::new("alice"),
        LocalPubSub::default(),
        Duration::from_millis(100),
    ));
    let _old = broker.connect("alice").unwrap();
    let _bob = broker.connect("bob").unwrap();
    let mut carol = broker.connect("carol").unwrap();
    broker.create_group("g", "bob").unwrap();
    broker.join_group("g", "carol").unwrap();
    broker.join_group("g", "alice").unwrap();

    let cleanup = {
        let broker = broker.clone();
        std::thread::spawn(move || broker.unsubscribe_all("alice"))
    };

    // personal topic still registered: the name is taken
    broker.storage().paused.wait();
    assert!(!broker.pubsub().contains("alice"));
    let err = broker.connect("alice").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(broker.send_message("g", "first", "bob").await.unwrap(), 1);
    broker.storage().resume.wait();

    // personal topic removed, cleanup has not returned yet
    broker.storage().paused.wait();
    let mut alice = broker.connect("alice").unwrap();
    assert_eq!(broker.send_message("g", "second", "bob").await.unwrap(), 1);
    broker.storage().resume.wait();

    cleanup.join().unwrap();

    assert!(broker.storage().get("alice").is_some());
    assert!(broker.pubsub().contains("alice"));
    assert_eq!(broker.send_message("alice", "welcome back", "bob").await.unwrap(), 1);
    assert_eq!(alice.recv().await.unwrap().text, "welcome back");
    assert_eq!(carol.recv().await.unwrap().text, "first");
    assert_eq!(carol.recv().await.unwrap().text, "second");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cleanup_races_reconnect_and_group_send() {
    let broker = Arc::new(broker());
    let _bob = broker.connect("bob").unwrap();
    let mut carol = broker.connect("carol").unwrap();
    broker.create_group("g", "bob").unwrap();
    broker.join_group("g", "carol").unwrap();

    for i in 0..100 {
        let name = format!("user-{i}");
        let _first = broker.connect(&name).unwrap();
        broker.join_group("g", &name).unwrap();

        let cleanup = {
            let broker = broker.clone();
            let name = name.clone();
            tokio::task::spawn_blocking(move || broker.unsubscribe_all(&name))
        };
        let reconnect = {
            let broker = broker.clone();
            let name = name.clone();
            tokio::task::spawn_blocking(move || loop {
                match broker.connect(&name) {
                    Ok(rx) => return rx,
                    Err(_) => std::thread::yield_now(),
                }
            })
        };

        let delivered = broker.send_message("g", "hi", "bob").await.unwrap();
        assert!(delivered >= 1);

        cleanup.await.unwrap();
        let _second = reconnect.await.unwrap();

        assert!(broker.storage().get(&name).is_some(), "{name} lost its topic");
        assert!(broker.pubsub().contains(&name), "{name} lost its channel");
        assert_eq!(broker.send_message(&name, "direct", "bob").await.unwrap(), 1);

        while carol.try_recv().is_ok() {}
    }
}
