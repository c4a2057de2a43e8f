//! Spam job behavior: validation, periodic delivery, per-account failure
//! isolation, and teardown.

mod common;

use tokio::time::{Duration, sleep, timeout};
use uuid::Uuid;

use afkbot_common::Error;
use afkbot_core::SupervisorConfig;
use afkbot_core::eventbus::BotEvent;

use common::{harness, test_settings, wait_until};

#[tokio::test]
async fn start_spam_validates_its_inputs() {
    let h = harness(test_settings(), SupervisorConfig::default()).await;
    let account = h.add_account("steve").await;
    h.connect_and_wait(account.account_id).await;

    for bad_interval in [0u64, 3601] {
        assert!(matches!(
            h.supervisor
                .start_spam(vec![account.account_id], "spam", bad_interval)
                .await,
            Err(Error::SpamValidation(_))
        ));
    }
    assert!(matches!(
        h.supervisor.start_spam(vec![], "spam", 5).await,
        Err(Error::SpamValidation(_))
    ));
    assert!(matches!(
        h.supervisor
            .start_spam(vec![account.account_id], "   ", 5)
            .await,
        Err(Error::SpamValidation(_))
    ));
}

#[tokio::test]
async fn spam_ticks_reach_every_selected_account() {
    let h = harness(test_settings(), SupervisorConfig::default()).await;
    let a = h.add_account("steve").await;
    let b = h.add_account("alex").await;
    h.connect_and_wait(a.account_id).await;
    h.connect_and_wait(b.account_id).await;

    let spam_id = h
        .supervisor
        .start_spam(vec![a.account_id, b.account_id], "buy at /shop", 1)
        .await
        .unwrap();

    let factory = h.factory.clone();
    let (id_a, id_b) = (a.account_id, b.account_id);
    wait_until(
        || !factory.sent_by(id_a).is_empty() && !factory.sent_by(id_b).is_empty(),
        "first spam tick",
    )
    .await;
    assert_eq!(h.factory.sent_by(a.account_id)[0], "buy at /shop");

    h.supervisor.stop_spam(spam_id).await.unwrap();
    let after = h.factory.sent().len();
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.factory.sent().len(), after);
}

#[tokio::test]
async fn a_failing_account_is_dropped_without_stopping_the_job() {
    let h = harness(test_settings(), SupervisorConfig::default()).await;
    let a = h.add_account("steve").await;
    let b = h.add_account("alex").await;
    h.connect_and_wait(a.account_id).await;
    h.connect_and_wait(b.account_id).await;

    let mut events = h.event_bus.subscribe(Some(100)).await;

    h.supervisor
        .start_spam(vec![a.account_id, b.account_id], "hello", 1)
        .await
        .unwrap();

    let factory = h.factory.clone();
    let (id_a, id_b) = (a.account_id, b.account_id);
    wait_until(
        || !factory.sent_by(id_a).is_empty() && !factory.sent_by(id_b).is_empty(),
        "first spam tick",
    )
    .await;

    // Account A drops off the server; the job keeps going for B.
    h.supervisor.disconnect(a.account_id).await.unwrap();
    let a_count = h.factory.sent_by(a.account_id).len();
    let b_count = h.factory.sent_by(b.account_id).len();

    wait_until(
        || factory.sent_by(id_b).len() > b_count,
        "next spam tick for the surviving account",
    )
    .await;
    assert_eq!(h.factory.sent_by(a.account_id).len(), a_count);

    let failed = timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Some(BotEvent::SpamAccountFailed { account_id, .. }) => break account_id,
                Some(_) => continue,
                None => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("a SpamAccountFailed event");
    assert_eq!(failed, a.account_id);
}

#[tokio::test]
async fn spam_job_stops_once_every_account_failed() {
    let h = harness(test_settings(), SupervisorConfig::default()).await;
    let a = h.add_account("steve").await;
    h.connect_and_wait(a.account_id).await;

    h.supervisor
        .start_spam(vec![a.account_id], "hello", 1)
        .await
        .unwrap();

    let factory = h.factory.clone();
    let id = a.account_id;
    wait_until(|| !factory.sent_by(id).is_empty(), "first spam tick").await;

    h.supervisor.disconnect(a.account_id).await.unwrap();
    sleep(Duration::from_millis(2500)).await;

    // The job removed its last account and stopped itself; nothing else
    // was sent after the disconnect.
    assert_eq!(h.factory.sent_by(a.account_id).len(), 1);
}

#[tokio::test]
async fn stopping_an_unknown_job_is_not_found() {
    let h = harness(test_settings(), SupervisorConfig::default()).await;
    assert!(matches!(
        h.supervisor.stop_spam(Uuid::new_v4()).await,
        Err(Error::NotFound(_))
    ));
}
