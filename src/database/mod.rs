//! SQLite persistence for the monitoring engine.
//!
//! The store permits many readers but a single writer, so every write
//! transaction goes through a process-wide gate (`with_write`) combined with
//! a retry-with-backoff policy for transient busy/locked errors. Reads never
//! take the gate.
//!
//! Submodules:
//! - `records` - entity types
//! - `instances` / `targets` - tenant configuration
//! - `checks` - the per-cycle persister transaction
//! - `state` - the pure state-advance function and state queries
//! - `events` - append-only audit log
//! - `notify_config` - SMTP settings, recipients, webhook endpoints

mod checks;
mod events;
mod instances;
mod notify_config;
mod records;
mod state;
mod targets;

pub use instances::validate_instance_id;
pub use records::*;
pub use state::{advance_state, AlertFieldsUpdate};

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::store::{WRITE_BACKOFF_CAP_MS, WRITE_BACKOFF_STEP_MS, WRITE_RETRY_ATTEMPTS};

/// Forward-only migrations, applied in order and recorded by name. Each entry
/// is a single statement; names carry an ascending timestamp prefix.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20240105120000_create_instances",
        r#"
        CREATE TABLE IF NOT EXISTS instances (
            instance_id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            is_paused BOOLEAN NOT NULL DEFAULT 0,
            check_interval_seconds INTEGER NOT NULL DEFAULT 60,
            concurrency_limit INTEGER NOT NULL DEFAULT 4,
            time_zone_id TEXT NOT NULL DEFAULT 'UTC',
            created_utc DATETIME NOT NULL,
            down_after_seconds INTEGER,
            recovered_after_seconds INTEGER,
            repeat_every_seconds_under_24h INTEGER,
            repeat_every_seconds_24h_to_72h INTEGER,
            daily_after_hours INTEGER,
            daily_hour_local INTEGER,
            daily_minute_local INTEGER
        )
        "#,
    ),
    (
        "20240105120100_create_targets",
        r#"
        CREATE TABLE IF NOT EXISTS targets (
            target_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id TEXT NOT NULL REFERENCES instances(instance_id),
            url TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            http_expected_status_min INTEGER NOT NULL DEFAULT 200,
            http_expected_status_max INTEGER NOT NULL DEFAULT 399,
            login_rule TEXT,
            created_utc DATETIME NOT NULL
        )
        "#,
    ),
    (
        "20240105120200_index_targets_instance",
        "CREATE INDEX IF NOT EXISTS idx_targets_instance ON targets(instance_id, target_id)",
    ),
    (
        "20240105120300_create_checks",
        r#"
        CREATE TABLE IF NOT EXISTS checks (
            check_id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_id INTEGER NOT NULL,
            timestamp_utc DATETIME NOT NULL,
            tcp_ok BOOLEAN NOT NULL,
            http_ok BOOLEAN NOT NULL,
            http_status_code INTEGER,
            tcp_latency_ms INTEGER NOT NULL,
            http_latency_ms INTEGER NOT NULL,
            final_url TEXT,
            used_ip TEXT,
            detected_login_type TEXT,
            login_detected BOOLEAN NOT NULL,
            summary TEXT NOT NULL
        )
        "#,
    ),
    (
        "20240105120400_index_checks_target_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_checks_target_timestamp ON checks(target_id, timestamp_utc)",
    ),
    (
        "20240105120500_create_target_state",
        r#"
        CREATE TABLE IF NOT EXISTS target_state (
            target_id INTEGER PRIMARY KEY,
            is_up BOOLEAN NOT NULL,
            last_check_utc DATETIME NOT NULL,
            state_since_utc DATETIME NOT NULL,
            last_change_utc DATETIME NOT NULL,
            consecutive_failures INTEGER NOT NULL,
            last_summary TEXT,
            last_final_url TEXT,
            last_used_ip TEXT,
            last_detected_login_type TEXT,
            login_detected_last BOOLEAN NOT NULL DEFAULT 0,
            login_detected_ever BOOLEAN NOT NULL DEFAULT 0,
            down_first_notified_utc DATETIME,
            last_notified_utc DATETIME,
            next_notify_utc DATETIME,
            recovered_due_utc DATETIME,
            recovered_notified_utc DATETIME
        )
        "#,
    ),
    (
        "20240105120600_create_events",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id TEXT NOT NULL,
            target_id INTEGER,
            timestamp_utc DATETIME NOT NULL,
            event_type TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    ),
    (
        "20240105120700_index_events_instance_timestamp",
        "CREATE INDEX IF NOT EXISTS idx_events_instance_timestamp ON events(instance_id, timestamp_utc DESC)",
    ),
    (
        "20240105120800_create_smtp_settings",
        r#"
        CREATE TABLE IF NOT EXISTS smtp_settings (
            instance_id TEXT PRIMARY KEY,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            security_mode TEXT NOT NULL DEFAULT 'StartTls',
            username TEXT,
            password_protected TEXT,
            from_address TEXT NOT NULL
        )
        "#,
    ),
    (
        "20240105120900_create_recipients",
        r#"
        CREATE TABLE IF NOT EXISTS recipients (
            recipient_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id TEXT NOT NULL,
            email TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            UNIQUE(instance_id, email)
        )
        "#,
    ),
    (
        "20240105121000_create_webhook_endpoints",
        r#"
        CREATE TABLE IF NOT EXISTS webhook_endpoints (
            endpoint_id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id TEXT NOT NULL,
            url TEXT NOT NULL,
            enabled BOOLEAN NOT NULL DEFAULT 1,
            UNIQUE(instance_id, url)
        )
        "#,
    ),
    (
        "20250122083000_add_instances_paused_until",
        "ALTER TABLE instances ADD COLUMN paused_until_utc DATETIME",
    ),
];

pub struct Database {
    pool: Pool<Sqlite>,
    write_gate: Mutex<()>,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date.
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(250));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let database = Self {
            pool,
            write_gate: Mutex::new(()),
        };
        database.migrate().await?;

        info!("Database ready at {}", database_path);
        Ok(database)
    }

    /// In-memory database for tests; single connection so the schema is
    /// visible everywhere.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let database = Self {
            pool,
            write_gate: Mutex::new(()),
        };
        database.migrate().await?;
        Ok(database)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_utc DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for (name, sql) in MIGRATIONS {
            let applied: Option<String> =
                sqlx::query_scalar("SELECT name FROM schema_migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?;
            if applied.is_some() {
                continue;
            }

            debug!("Applying migration {}", name);
            sqlx::query(sql).execute(&self.pool).await?;
            sqlx::query("INSERT INTO schema_migrations (name, applied_utc) VALUES (?, ?)")
                .bind(name)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Run a write operation holding the process-wide write gate. Transient
    /// busy/locked errors release the gate, back off quadratically
    /// (min(5000 ms, 100 * attempt^2 ms)) and retry, re-acquiring the gate
    /// each attempt. Non-transient errors surface immediately.
    pub async fn with_write<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let guard = self.write_gate.lock().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < WRITE_RETRY_ATTEMPTS => {
                    drop(guard);
                    let backoff = write_backoff(attempt);
                    warn!(
                        "Store busy on write attempt {}/{}, retrying in {:?}",
                        attempt, WRITE_RETRY_ATTEMPTS, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Busy/locked contention from the single-writer store; everything else is
/// treated as fatal for the current batch.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_lowercase();
            message.contains("locked") || message.contains("busy")
        }
        _ => false,
    }
}

fn write_backoff(attempt: u32) -> Duration {
    let quadratic = WRITE_BACKOFF_STEP_MS.saturating_mul(u64::from(attempt) * u64::from(attempt));
    Duration::from_millis(quadratic.min(WRITE_BACKOFF_CAP_MS))
}
