//! Alert evaluator integration tests: the escalation ladder, recovery
//! bookkeeping, delivery failure retries and channel fan-out, driven with a
//! manual clock against the real database layer and a mock webhook receiver.

mod common;

use chrono::Duration;
use common::fixtures::{
    probe_fail, probe_ok, sample_instance, seed_instance_with_target, t0, ManualClock,
    MockWebhookServer, RecordingSmtpSender,
};
use sitewatch::alerting::AlertEvaluator;
use sitewatch::config::AlertingSettings;
use sitewatch::database::{Database, EventType, SecurityMode, SmtpSettings};
use sitewatch::notify::{Dispatcher, HttpWebhookSender};
use sitewatch::probe::ProbeEngine;
use sitewatch::protector::Protector;
use sitewatch::runtime::RuntimeManager;
use std::sync::Arc;

struct Harness {
    db: Arc<Database>,
    runtime: Arc<RuntimeManager>,
    clock: Arc<ManualClock>,
    smtp: Arc<RecordingSmtpSender>,
    protector: Arc<Protector>,
    evaluator: Arc<AlertEvaluator>,
}

async fn harness() -> Harness {
    let db = Arc::new(Database::new_in_memory().await.unwrap());
    let clock = Arc::new(ManualClock::at(t0()));
    let smtp = Arc::new(RecordingSmtpSender::new());
    let dispatcher = Dispatcher::new(smtp.clone(), Arc::new(HttpWebhookSender::new().unwrap()));
    let protector = Arc::new(Protector::from_key_bytes(&[7u8; 32]).unwrap());
    let runtime = Arc::new(RuntimeManager::new(
        db.clone(),
        Arc::new(ProbeEngine::new().unwrap()),
    ));
    let evaluator = Arc::new(AlertEvaluator::new(
        db.clone(),
        runtime.clone(),
        dispatcher,
        protector.clone(),
        clock.clone(),
        AlertingSettings::default(),
    ));

    Harness {
        db,
        runtime,
        clock,
        smtp,
        protector,
        evaluator,
    }
}

#[tokio::test]
async fn down_alert_fires_only_after_the_threshold() {
    let h = harness().await;
    let webhook = MockWebhookServer::start().await;
    webhook.mock_success().await;

    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();
    h.db.add_webhook_endpoint("acme", &webhook.webhook_url())
        .await
        .unwrap();

    // Outage starts at T.
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();

    // T+60: younger than downAfterSeconds, nothing fires.
    h.clock.set(t0() + Duration::seconds(60));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.request_count(), 0);
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_none());

    // T+180: the first DOWN lands and the bookkeeping anchors.
    h.clock.set(t0() + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 1);

    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert_eq!(state.down_first_notified_utc, Some(t0() + Duration::seconds(180)));
    assert_eq!(state.last_notified_utc, Some(t0() + Duration::seconds(180)));
    assert_eq!(
        state.next_notify_utc,
        Some(t0() + Duration::seconds(180 + 1800))
    );

    let events = h.db.recent_events("acme", 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::AlertDown);

    // A tick before the due time stays silent.
    h.clock.set(t0() + Duration::seconds(1000));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.request_count(), 1);
}

#[tokio::test]
async fn repeats_follow_the_short_cadence_while_young() {
    let h = harness().await;
    let webhook = MockWebhookServer::start().await;
    webhook.mock_success().await;

    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();
    h.db.add_webhook_endpoint("acme", &webhook.webhook_url())
        .await
        .unwrap();
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();

    let first = t0() + Duration::seconds(180);
    h.clock.set(first);
    h.evaluator.evaluate_instance("acme").await.unwrap();

    // Repeats land every 1800 s while the outage is under 24 h old.
    let mut due = first + Duration::seconds(1800);
    for round in 1..=3 {
        h.clock.set(due);
        h.evaluator.evaluate_instance("acme").await.unwrap();
        assert_eq!(webhook.count_of("AlertDownRepeat"), round);

        let state = h.db.get_state(target_id).await.unwrap().unwrap();
        assert_eq!(state.last_notified_utc, Some(due));
        due += Duration::seconds(1800);
        assert_eq!(state.next_notify_utc, Some(due));
    }

    // Once the outage passes 24 h, the cadence stretches to 3600 s.
    let late = t0() + Duration::hours(25);
    h.clock.set(late);
    h.evaluator.evaluate_instance("acme").await.unwrap();
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert_eq!(state.next_notify_utc, Some(late + Duration::seconds(3600)));
}

#[tokio::test]
async fn recovery_notifies_after_stabilization_and_resets_bookkeeping() {
    let h = harness().await;
    let webhook = MockWebhookServer::start().await;
    webhook.mock_success().await;

    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();
    h.db.add_webhook_endpoint("acme", &webhook.webhook_url())
        .await
        .unwrap();

    // Down at T, first alert at T+180.
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();
    h.clock.set(t0() + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 1);

    // Probe flips up at T+1000.
    let up_at = t0() + Duration::seconds(1000);
    h.db.persist_cycle(&[probe_ok(target_id, up_at)]).await.unwrap();

    // First tick after the flip arms the recovery timer; no send yet.
    h.clock.set(up_at + Duration::seconds(10));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertRecovered"), 0);
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert_eq!(state.recovered_due_utc, Some(up_at + Duration::seconds(60)));

    // After recoveredAfterSeconds the RECOVERED lands and the outage
    // bookkeeping resets.
    h.clock.set(up_at + Duration::seconds(70));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertRecovered"), 1);
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_none());
    assert!(state.last_notified_utc.is_none());
    assert!(state.next_notify_utc.is_none());
    assert!(state.recovered_due_utc.is_none());
    assert_eq!(state.recovered_notified_utc, Some(up_at + Duration::seconds(70)));

    // The following tick clears the delivery marker too; everything null.
    h.clock.advance(Duration::seconds(15));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.recovered_notified_utc.is_none());

    // A re-down starts a cold escalation: fresh 180 s before the next DOWN.
    let re_down = t0() + Duration::seconds(5000);
    h.db.persist_cycle(&[probe_fail(target_id, re_down)]).await.unwrap();
    h.clock.set(re_down + Duration::seconds(60));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 1);

    h.clock.set(re_down + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 2);
}

#[tokio::test]
async fn failed_delivery_is_retried_on_the_next_tick() {
    let h = harness().await;
    let webhook = MockWebhookServer::start().await;
    webhook.mock_failure(500).await;

    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();
    h.db.add_webhook_endpoint("acme", &webhook.webhook_url())
        .await
        .unwrap();
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();

    h.clock.set(t0() + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();

    // Nothing got through, so the alert state must not advance.
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_none());
    let events = h.db.recent_events("acme", 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Error);

    // The endpoint comes back; the same due time fires on the next tick.
    webhook.reset().await;
    webhook.mock_success().await;
    h.clock.advance(Duration::seconds(15));
    h.evaluator.evaluate_instance("acme").await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 1);
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_some());
}

#[tokio::test]
async fn email_fanout_reaches_enabled_recipients_only() {
    let h = harness().await;
    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();

    let password = h.protector.protect("smtp-secret").unwrap();
    h.db.upsert_smtp_settings(&SmtpSettings {
        instance_id: "acme".into(),
        host: "mail.example.com".into(),
        port: 587,
        security_mode: SecurityMode::StartTls,
        username: Some("monitor".into()),
        password_protected: Some(password),
        from_address: "monitor@example.com".into(),
    })
    .await
    .unwrap();
    h.db.add_recipient("acme", "ops@example.com").await.unwrap();
    h.db.add_recipient("acme", "off-duty@example.com").await.unwrap();
    h.db.set_recipient_enabled("acme", "off-duty@example.com", false)
        .await
        .unwrap();

    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();
    h.clock.set(t0() + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();

    let sent = h.smtp.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ops@example.com");
    assert!(sent[0].subject.contains("DOWN"));
    assert!(sent[0].text_body.contains("https://shop.example.com/"));

    // Exactly one notification per target per tick.
    let events = h.db.recent_events("acme", 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::AlertDown);
}

#[tokio::test]
async fn unprotectable_smtp_password_drops_the_email_channel() {
    let h = harness().await;
    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();

    // Valid hex, but not a ciphertext this protector produced.
    h.db.upsert_smtp_settings(&SmtpSettings {
        instance_id: "acme".into(),
        host: "mail.example.com".into(),
        port: 587,
        security_mode: SecurityMode::StartTls,
        username: Some("monitor".into()),
        password_protected: Some("00112233445566778899aabbccddeeff0011".into()),
        from_address: "monitor@example.com".into(),
    })
    .await
    .unwrap();
    h.db.add_recipient("acme", "ops@example.com").await.unwrap();

    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();
    h.clock.set(t0() + Duration::seconds(180));
    h.evaluator.evaluate_instance("acme").await.unwrap();

    // Email was the only channel, so nothing advances and nothing sends.
    assert_eq!(h.smtp.sent_count(), 0);
    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_none());
}

#[tokio::test]
async fn unconfigured_instances_are_skipped_entirely() {
    let h = harness().await;
    let target_id = seed_instance_with_target(&h.db, "acme", "https://shop.example.com/")
        .await
        .unwrap();
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();

    h.clock.set(t0() + Duration::seconds(600));
    h.evaluator.evaluate_instance("acme").await.unwrap();

    let state = h.db.get_state(target_id).await.unwrap().unwrap();
    assert!(state.down_first_notified_utc.is_none());
    assert!(h.db.recent_events("acme", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn stopped_workers_halt_alerting_until_restart() {
    let h = harness().await;
    let webhook = MockWebhookServer::start().await;
    webhook.mock_success().await;

    // Paused instance: the worker loop ticks but never probes, so the
    // seeded down state stays untouched while the test drives the clock.
    let mut instance = sample_instance("acme");
    instance.is_paused = true;
    h.db.create_instance(&instance).await.unwrap();
    let target_id = h
        .db
        .create_target(&sitewatch::database::NewTarget::new(
            "acme",
            "https://shop.example.com/",
        ))
        .await
        .unwrap();
    h.db.add_webhook_endpoint("acme", &webhook.webhook_url())
        .await
        .unwrap();
    h.db.persist_cycle(&[probe_fail(target_id, t0())]).await.unwrap();
    h.clock.set(t0() + Duration::seconds(300));

    // No worker yet: evaluate_all sees nothing Running.
    h.evaluator.evaluate_all().await.unwrap();
    assert_eq!(webhook.request_count(), 0);

    // Stopped worker: still nothing.
    h.runtime.start("acme").await.unwrap();
    h.runtime.stop("acme").await.unwrap();
    h.evaluator.evaluate_all().await.unwrap();
    assert_eq!(webhook.request_count(), 0);

    // Running worker: the overdue DOWN fires on the next pass.
    h.runtime.start("acme").await.unwrap();
    h.evaluator.evaluate_all().await.unwrap();
    assert_eq!(webhook.count_of("AlertDown"), 1);

    h.runtime.stop("acme").await.unwrap();
}
