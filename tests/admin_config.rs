//! Admin persistence paths: instance/target CRUD with validation, pause
//! windows, SMTP settings with the protected password, and channel toggles.

mod common;

use chrono::Duration;
use common::fixtures::{sample_instance, t0};
use sitewatch::database::{Database, NewTarget, SecurityMode, SmtpSettings};
use sitewatch::protector::Protector;

#[tokio::test]
async fn instance_validation_rejects_bad_rows() {
    let db = Database::new_in_memory().await.unwrap();

    let bad_id = sample_instance("Bad_Slug");
    assert!(db.create_instance(&bad_id).await.is_err());

    let mut bad_interval = sample_instance("acme");
    bad_interval.check_interval_seconds = 2;
    assert!(db.create_instance(&bad_interval).await.is_err());

    let mut bad_concurrency = sample_instance("acme");
    bad_concurrency.concurrency_limit = 0;
    assert!(db.create_instance(&bad_concurrency).await.is_err());

    assert!(db.create_instance(&sample_instance("acme")).await.is_ok());
}

#[tokio::test]
async fn target_validation_requires_absolute_http_urls() {
    let db = Database::new_in_memory().await.unwrap();
    db.create_instance(&sample_instance("acme")).await.unwrap();

    assert!(db
        .create_target(&NewTarget::new("acme", "not a url"))
        .await
        .is_err());
    assert!(db
        .create_target(&NewTarget::new("acme", "ftp://example.com/"))
        .await
        .is_err());

    let mut inverted = NewTarget::new("acme", "https://example.com/");
    inverted.http_expected_status_min = 400;
    inverted.http_expected_status_max = 200;
    assert!(db.create_target(&inverted).await.is_err());

    let target_id = db
        .create_target(&NewTarget::new("acme", "https://example.com/"))
        .await
        .unwrap();
    let target = db.get_target(target_id).await.unwrap().unwrap();
    assert_eq!(target.url, "https://example.com/");
    assert_eq!(target.http_expected_status_min, 200);
    assert_eq!(target.http_expected_status_max, 399);

    let listed = db.list_targets("acme").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].target_id, target_id);
}

#[tokio::test]
async fn disabling_an_instance_removes_it_from_autostart_scope() {
    let db = Database::new_in_memory().await.unwrap();
    db.create_instance(&sample_instance("acme")).await.unwrap();
    assert_eq!(db.list_enabled_instances().await.unwrap().len(), 1);

    db.set_instance_enabled("acme", false).await.unwrap();
    assert!(db.list_enabled_instances().await.unwrap().is_empty());
    // Still listed for the UI, just not eligible to run.
    assert_eq!(db.list_instances().await.unwrap().len(), 1);
}

#[tokio::test]
async fn pause_window_round_trips() {
    let db = Database::new_in_memory().await.unwrap();
    db.create_instance(&sample_instance("acme")).await.unwrap();

    let until = t0() + Duration::minutes(30);
    db.set_instance_paused("acme", false, Some(until)).await.unwrap();

    let instance = db.get_instance("acme").await.unwrap().unwrap();
    assert!(!instance.is_paused);
    assert_eq!(instance.paused_until_utc, Some(until));
    assert!(instance.is_paused_at(t0()));
    assert!(!instance.is_paused_at(until + Duration::seconds(1)));
}

#[tokio::test]
async fn smtp_settings_store_only_protected_passwords() {
    let db = Database::new_in_memory().await.unwrap();
    db.create_instance(&sample_instance("acme")).await.unwrap();

    let protector = Protector::from_key_bytes(&[9u8; 32]).unwrap();
    let protected = protector.protect("smtp-secret").unwrap();

    db.upsert_smtp_settings(&SmtpSettings {
        instance_id: "acme".to_string(),
        host: "mail.example.com".to_string(),
        port: 465,
        security_mode: SecurityMode::SslTls,
        username: Some("monitor".to_string()),
        password_protected: Some(protected.clone()),
        from_address: "monitor@example.com".to_string(),
    })
    .await
    .unwrap();

    let loaded = db.get_smtp_settings("acme").await.unwrap().unwrap();
    assert_eq!(loaded.security_mode, SecurityMode::SslTls);
    let stored = loaded.password_protected.unwrap();
    assert_ne!(stored, "smtp-secret");
    assert_eq!(protector.unprotect(&stored).unwrap(), "smtp-secret");

    // Upsert replaces in place; the instance keeps exactly one row.
    db.upsert_smtp_settings(&SmtpSettings {
        instance_id: "acme".to_string(),
        host: "mail2.example.com".to_string(),
        port: 587,
        security_mode: SecurityMode::StartTls,
        username: None,
        password_protected: None,
        from_address: "alerts@example.com".to_string(),
    })
    .await
    .unwrap();
    let replaced = db.get_smtp_settings("acme").await.unwrap().unwrap();
    assert_eq!(replaced.host, "mail2.example.com");
    assert!(replaced.username.is_none());
}

#[tokio::test]
async fn channel_toggles_control_the_enabled_sets() {
    let db = Database::new_in_memory().await.unwrap();
    db.create_instance(&sample_instance("acme")).await.unwrap();

    db.add_recipient("acme", "ops@example.com").await.unwrap();
    // Duplicate adds re-enable instead of erroring on the unique key.
    db.add_recipient("acme", "ops@example.com").await.unwrap();
    assert_eq!(db.enabled_recipients("acme").await.unwrap().len(), 1);

    db.add_webhook_endpoint("acme", "https://hooks.example.com/alert")
        .await
        .unwrap();
    db.add_webhook_endpoint("acme", "https://hooks.example.com/alert")
        .await
        .unwrap();
    assert_eq!(db.enabled_webhook_endpoints("acme").await.unwrap().len(), 1);

    db.set_webhook_enabled("acme", "https://hooks.example.com/alert", false)
        .await
        .unwrap();
    assert!(db.enabled_webhook_endpoints("acme").await.unwrap().is_empty());

    db.set_recipient_enabled("acme", "ops@example.com", false)
        .await
        .unwrap();
    assert!(db.enabled_recipients("acme").await.unwrap().is_empty());
}
