mod common;

use common::{Harness, WAIT};
use futora_service::repository::ConversationRepository;
use futora_service::services::{
    AggregationMode, IdAllocation, ResolutionStrategy, UnreadCounter, UnreadWatcher,
};
use std::sync::Arc;
use tokio::time::timeout;
use uuid::Uuid;

async fn direct(h: &Harness, a: Uuid, b: Uuid) -> Uuid {
    h.resolver
        .resolve(a, b)
        .await
        .unwrap()
        .unwrap()
        .conversation_id
}

#[tokio::test]
async fn absent_user_counts_zero_without_io() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    assert_eq!(h.unread.count(None).await.unwrap(), 0);
    assert_eq!(h.store.operations(), 0);
}

#[tokio::test]
async fn user_without_conversations_has_zero_unread() {
    for mode in [AggregationMode::FanOut, AggregationMode::Aggregate] {
        let h = Harness::with_options(ResolutionStrategy::AtomicPair, IdAllocation::Client, mode, 64);
        assert_eq!(h.unread.count(Some(Uuid::new_v4())).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn own_messages_are_never_unread() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    let friend = Uuid::new_v4();
    let conversation = direct(&h, me, friend).await;

    h.messages.send(conversation, me, "hello").await.unwrap();
    h.messages.send(conversation, me, "anyone?").await.unwrap();

    assert_eq!(h.unread.count(Some(me)).await.unwrap(), 0);
    assert_eq!(h.unread.count(Some(friend)).await.unwrap(), 2);
}

#[tokio::test]
async fn marking_read_resets_only_that_conversation() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let with_first = direct(&h, me, first).await;
    let with_second = direct(&h, me, second).await;

    h.messages.send(with_first, first, "one").await.unwrap();
    h.messages.send(with_first, first, "two").await.unwrap();
    h.messages.send(with_second, second, "three").await.unwrap();
    assert_eq!(h.unread.count(Some(me)).await.unwrap(), 3);

    h.messages.mark_read(with_first, me).await.unwrap();
    assert_eq!(h.unread.count(Some(me)).await.unwrap(), 1);

    // Only messages after the marker count again
    h.messages.send(with_first, first, "four").await.unwrap();
    assert_eq!(h.unread.count(Some(me)).await.unwrap(), 2);
}

#[tokio::test]
async fn fan_out_and_aggregate_agree() {
    let h = Harness::with_options(
        ResolutionStrategy::AtomicPair,
        IdAllocation::Client,
        AggregationMode::FanOut,
        64,
    );
    let me = Uuid::new_v4();
    let mut conversations = Vec::new();
    for i in 0..4 {
        let friend = Uuid::new_v4();
        let conversation = direct(&h, me, friend).await;
        for n in 0..=i {
            h.messages
                .send(conversation, friend, &format!("message {n}"))
                .await
                .unwrap();
        }
        conversations.push(conversation);
    }
    h.messages.mark_read(conversations[1], me).await.unwrap();

    let aggregate = UnreadCounter::new(h.store.clone(), h.store.clone(), AggregationMode::Aggregate);
    let fan_out = h.unread.count(Some(me)).await.unwrap();

    assert_eq!(fan_out, 1 + 3 + 4);
    assert_eq!(aggregate.count(Some(me)).await.unwrap(), fan_out);
}

#[tokio::test]
async fn watcher_tracks_new_messages_and_read_markers() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    let friend = Uuid::new_v4();
    let conversation = direct(&h, me, friend).await;

    let mut watcher = UnreadWatcher::start(h.unread.clone(), &h.feed, me)
        .await
        .unwrap();
    assert_eq!(watcher.current(), 0);
    assert!(watcher.is_running());

    h.messages.send(conversation, friend, "ping").await.unwrap();
    let count = timeout(WAIT, watcher.wait_for(|c| *c == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 1);

    h.messages.mark_read(conversation, me).await.unwrap();
    let count = timeout(WAIT, watcher.wait_for(|c| *c == 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn watcher_ignores_read_markers_of_other_users() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    let friend = Uuid::new_v4();
    let conversation = direct(&h, me, friend).await;
    h.messages.send(conversation, friend, "ping").await.unwrap();

    let watcher = UnreadWatcher::start(h.unread.clone(), &h.feed, me)
        .await
        .unwrap();
    let mut updates = watcher.subscribe();
    updates.borrow_and_update();

    h.messages.mark_read(conversation, friend).await.unwrap();
    let changed = timeout(std::time::Duration::from_millis(100), updates.changed()).await;

    assert!(changed.is_err(), "recount triggered by another user's read marker");
    assert_eq!(watcher.current(), 1);
}

#[tokio::test]
async fn watcher_recovers_from_lag() {
    let h = Harness::with_options(
        ResolutionStrategy::AtomicPair,
        IdAllocation::Client,
        AggregationMode::Aggregate,
        2,
    );
    let me = Uuid::new_v4();
    let friend = Uuid::new_v4();
    let conversation = direct(&h, me, friend).await;

    let mut watcher = UnreadWatcher::start(h.unread.clone(), &h.feed, me)
        .await
        .unwrap();
    for n in 0..10 {
        h.messages
            .send(conversation, friend, &format!("burst {n}"))
            .await
            .unwrap();
    }

    let count = timeout(WAIT, watcher.wait_for(|c| *c == 10))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(count, 10);
}

#[tokio::test]
async fn dropping_watcher_releases_subscription() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    assert_eq!(h.feed.subscriber_count(), 0);

    let watcher = UnreadWatcher::start(h.unread.clone(), &h.feed, me)
        .await
        .unwrap();
    assert_eq!(h.feed.subscriber_count(), 1);

    drop(watcher);
    timeout(WAIT, async {
        while h.feed.subscriber_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("subscription still held after drop");
}

#[tokio::test]
async fn counting_does_not_touch_read_state() {
    let h = Harness::new(ResolutionStrategy::AtomicPair);
    let me = Uuid::new_v4();
    let friend = Uuid::new_v4();
    let conversation = direct(&h, me, friend).await;
    h.messages.send(conversation, friend, "hi").await.unwrap();

    let counter = Arc::clone(&h.unread);
    counter.count(Some(me)).await.unwrap();
    counter.count(Some(me)).await.unwrap();

    let participants = h.store.participants(conversation).await.unwrap();
    assert!(participants.iter().all(|p| p.last_read_at.is_none()));
    assert!(h.store.messages_in(conversation).await.iter().all(|m| m.read_at.is_none()));
}
