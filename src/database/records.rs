//! Database record types (entities).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Monitoring configuration entities
// ============================================================================

/// A monitoring tenant: its own targets, cadence, recipients and webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub is_paused: bool,
    pub paused_until_utc: Option<DateTime<Utc>>,
    pub check_interval_seconds: i64,
    pub concurrency_limit: i64,
    pub time_zone_id: String,
    pub created_utc: DateTime<Utc>,
    // Per-instance alert policy overrides; None falls through to the global
    // defaults from settings.
    pub down_after_seconds: Option<i64>,
    pub recovered_after_seconds: Option<i64>,
    pub repeat_every_seconds_under_24h: Option<i64>,
    pub repeat_every_seconds_24h_to_72h: Option<i64>,
    pub daily_after_hours: Option<i64>,
    pub daily_hour_local: Option<i64>,
    pub daily_minute_local: Option<i64>,
}

impl Instance {
    /// Whether probing is currently suspended, either by the flag or by a
    /// not-yet-expired pause window.
    pub fn is_paused_at(&self, now: DateTime<Utc>) -> bool {
        self.is_paused || self.paused_until_utc.map(|until| until > now).unwrap_or(false)
    }
}

/// A single URL under surveillance within an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub target_id: i64,
    pub instance_id: String,
    pub url: String,
    pub enabled: bool,
    pub http_expected_status_min: i64,
    pub http_expected_status_max: i64,
    pub login_rule: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Parameters for creating a target; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub instance_id: String,
    pub url: String,
    pub enabled: bool,
    pub http_expected_status_min: i64,
    pub http_expected_status_max: i64,
    pub login_rule: Option<String>,
}

impl NewTarget {
    pub fn new(instance_id: &str, url: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            url: url.to_string(),
            enabled: true,
            http_expected_status_min: 200,
            http_expected_status_max: 399,
            login_rule: None,
        }
    }
}

// ============================================================================
// Probe history and state
// ============================================================================

/// One immutable probe outcome row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub check_id: i64,
    pub target_id: i64,
    pub timestamp_utc: DateTime<Utc>,
    pub tcp_ok: bool,
    pub http_ok: bool,
    pub http_status_code: Option<i64>,
    pub tcp_latency_ms: i64,
    pub http_latency_ms: i64,
    pub final_url: Option<String>,
    pub used_ip: Option<String>,
    pub detected_login_type: Option<String>,
    pub login_detected: bool,
    pub summary: String,
}

/// The mutable 1:1 companion of a target, created lazily on the first
/// persisted check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetState {
    pub target_id: i64,
    pub is_up: bool,
    pub last_check_utc: DateTime<Utc>,
    /// Instant of the last up/down flip.
    pub state_since_utc: DateTime<Utc>,
    pub last_change_utc: DateTime<Utc>,
    pub consecutive_failures: i64,
    pub last_summary: Option<String>,
    pub last_final_url: Option<String>,
    pub last_used_ip: Option<String>,
    pub last_detected_login_type: Option<String>,
    pub login_detected_last: bool,
    /// Monotonic: once a login surface was seen, this never clears.
    pub login_detected_ever: bool,
    // Alert bookkeeping; all null while no outage alerting is in flight.
    pub down_first_notified_utc: Option<DateTime<Utc>>,
    pub last_notified_utc: Option<DateTime<Utc>>,
    pub next_notify_utc: Option<DateTime<Utc>>,
    pub recovered_due_utc: Option<DateTime<Utc>>,
    pub recovered_notified_utc: Option<DateTime<Utc>>,
}

/// Display-only classification; `Degraded` never alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayStatus {
    Up,
    Down,
    Degraded,
}

impl TargetState {
    pub fn display_status(&self) -> DisplayStatus {
        if !self.is_up {
            DisplayStatus::Down
        } else if self.login_detected_ever && !self.login_detected_last {
            DisplayStatus::Degraded
        } else {
            DisplayStatus::Up
        }
    }
}

// ============================================================================
// Audit events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    AlertDown,
    AlertDownRepeat,
    AlertRecovered,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AlertDown => "AlertDown",
            EventType::AlertDownRepeat => "AlertDownRepeat",
            EventType::AlertRecovered => "AlertRecovered",
            EventType::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AlertDown" => Some(EventType::AlertDown),
            "AlertDownRepeat" => Some(EventType::AlertDownRepeat),
            "AlertRecovered" => Some(EventType::AlertRecovered),
            "Error" => Some(EventType::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: i64,
    pub instance_id: String,
    pub target_id: Option<i64>,
    pub timestamp_utc: DateTime<Utc>,
    pub event_type: EventType,
    pub message: String,
}

/// An event pending insertion; the id and timestamp column are assigned on
/// commit.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub instance_id: String,
    pub target_id: Option<i64>,
    pub timestamp_utc: DateTime<Utc>,
    pub event_type: EventType,
    pub message: String,
}

// ============================================================================
// Notification configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityMode {
    None,
    SslTls,
    StartTls,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::None => "None",
            SecurityMode::SslTls => "SslTls",
            SecurityMode::StartTls => "StartTls",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "None" => Some(SecurityMode::None),
            "SslTls" => Some(SecurityMode::SslTls),
            "StartTls" => Some(SecurityMode::StartTls),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub instance_id: String,
    pub host: String,
    pub port: i64,
    pub security_mode: SecurityMode,
    pub username: Option<String>,
    /// Opaque protector ciphertext, never the plain password.
    pub password_protected: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub recipient_id: i64,
    pub instance_id: String,
    pub email: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub endpoint_id: i64,
    pub instance_id: String,
    pub url: String,
    pub enabled: bool,
}
