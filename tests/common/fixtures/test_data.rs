//! Seed data builders shared across the integration suites.

use chrono::{DateTime, TimeZone, Utc};

use sitewatch::database::{Database, Instance, NewTarget, Target};
use sitewatch::probe::{summary, ProbeResult};

/// A fixed "start of test time" instant.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

pub fn sample_instance(instance_id: &str) -> Instance {
    Instance {
        instance_id: instance_id.to_string(),
        display_name: format!("{instance_id} (test)"),
        enabled: true,
        is_paused: false,
        paused_until_utc: None,
        check_interval_seconds: 60,
        concurrency_limit: 4,
        time_zone_id: "UTC".to_string(),
        created_utc: t0(),
        down_after_seconds: None,
        recovered_after_seconds: None,
        repeat_every_seconds_under_24h: None,
        repeat_every_seconds_24h_to_72h: None,
        daily_after_hours: None,
        daily_hour_local: None,
        daily_minute_local: None,
    }
}

/// A target the probe engine can be pointed at directly, without a database.
pub fn standalone_target(url: &str) -> Target {
    Target {
        target_id: 1,
        instance_id: "test".to_string(),
        url: url.to_string(),
        enabled: true,
        http_expected_status_min: 200,
        http_expected_status_max: 399,
        login_rule: None,
        created_utc: t0(),
    }
}

/// Create an instance plus one enabled target, returning the target id.
pub async fn seed_instance_with_target(
    db: &Database,
    instance_id: &str,
    url: &str,
) -> anyhow::Result<i64> {
    db.create_instance(&sample_instance(instance_id)).await?;
    let target_id = db.create_target(&NewTarget::new(instance_id, url)).await?;
    Ok(target_id)
}

pub fn probe_ok(target_id: i64, at: DateTime<Utc>) -> ProbeResult {
    ProbeResult {
        target_id,
        timestamp_utc: at,
        tcp_ok: true,
        tcp_latency_ms: 10,
        used_ip: Some("192.0.2.1".to_string()),
        http_ok: true,
        http_status_code: Some(200),
        http_latency_ms: 90,
        final_url: Some("https://example.com/".to_string()),
        login_detected: false,
        detected_login_type: None,
        summary: summary(true, 10, true, Some(200), 90),
    }
}

pub fn probe_fail(target_id: i64, at: DateTime<Utc>) -> ProbeResult {
    ProbeResult {
        target_id,
        timestamp_utc: at,
        tcp_ok: false,
        tcp_latency_ms: 3000,
        used_ip: Some("192.0.2.1".to_string()),
        http_ok: false,
        http_status_code: None,
        http_latency_ms: 0,
        final_url: None,
        login_detected: false,
        detected_login_type: None,
        summary: summary(false, 3000, false, None, 0),
    }
}
