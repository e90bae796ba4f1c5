//! Instance configuration operations.

use anyhow::{bail, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::records::Instance;
use super::Database;
use crate::constants::limits::{MAX_INSTANCE_ID_LEN, MIN_CHECK_INTERVAL_SECONDS};

pub(super) fn row_to_instance(row: &SqliteRow) -> Result<Instance, sqlx::Error> {
    Ok(Instance {
        instance_id: row.try_get("instance_id")?,
        display_name: row.try_get("display_name")?,
        enabled: row.try_get("enabled")?,
        is_paused: row.try_get("is_paused")?,
        paused_until_utc: row.try_get("paused_until_utc")?,
        check_interval_seconds: row.try_get("check_interval_seconds")?,
        concurrency_limit: row.try_get("concurrency_limit")?,
        time_zone_id: row.try_get("time_zone_id")?,
        created_utc: row.try_get("created_utc")?,
        down_after_seconds: row.try_get("down_after_seconds")?,
        recovered_after_seconds: row.try_get("recovered_after_seconds")?,
        repeat_every_seconds_under_24h: row.try_get("repeat_every_seconds_under_24h")?,
        repeat_every_seconds_24h_to_72h: row.try_get("repeat_every_seconds_24h_to_72h")?,
        daily_after_hours: row.try_get("daily_after_hours")?,
        daily_hour_local: row.try_get("daily_hour_local")?,
        daily_minute_local: row.try_get("daily_minute_local")?,
    })
}

const SELECT_INSTANCE: &str = r#"
    SELECT instance_id, display_name, enabled, is_paused, paused_until_utc,
           check_interval_seconds, concurrency_limit, time_zone_id, created_utc,
           down_after_seconds, recovered_after_seconds,
           repeat_every_seconds_under_24h, repeat_every_seconds_24h_to_72h,
           daily_after_hours, daily_hour_local, daily_minute_local
    FROM instances
"#;

/// Instance ids are URL-safe slugs: 1-64 chars of `[a-z0-9-]`.
pub fn validate_instance_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_INSTANCE_ID_LEN {
        bail!("Instance id must be 1-{} characters", MAX_INSTANCE_ID_LEN);
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        bail!("Instance id may only contain lowercase letters, digits and '-'");
    }
    Ok(())
}

impl Database {
    pub async fn create_instance(&self, instance: &Instance) -> Result<()> {
        validate_instance_id(&instance.instance_id)?;
        if instance.check_interval_seconds < MIN_CHECK_INTERVAL_SECONDS {
            bail!(
                "Check interval must be at least {} seconds",
                MIN_CHECK_INTERVAL_SECONDS
            );
        }
        if instance.concurrency_limit < 1 {
            bail!("Concurrency limit must be at least 1");
        }

        self.with_write(|| async {
            sqlx::query(
                r#"
                INSERT INTO instances (
                    instance_id, display_name, enabled, is_paused, paused_until_utc,
                    check_interval_seconds, concurrency_limit, time_zone_id, created_utc,
                    down_after_seconds, recovered_after_seconds,
                    repeat_every_seconds_under_24h, repeat_every_seconds_24h_to_72h,
                    daily_after_hours, daily_hour_local, daily_minute_local
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&instance.instance_id)
            .bind(&instance.display_name)
            .bind(instance.enabled)
            .bind(instance.is_paused)
            .bind(instance.paused_until_utc)
            .bind(instance.check_interval_seconds)
            .bind(instance.concurrency_limit)
            .bind(&instance.time_zone_id)
            .bind(instance.created_utc)
            .bind(instance.down_after_seconds)
            .bind(instance.recovered_after_seconds)
            .bind(instance.repeat_every_seconds_under_24h)
            .bind(instance.repeat_every_seconds_24h_to_72h)
            .bind(instance.daily_after_hours)
            .bind(instance.daily_hour_local)
            .bind(instance.daily_minute_local)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await?;

        debug!("Instance {} created", instance.instance_id);
        Ok(())
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!("{SELECT_INSTANCE} WHERE instance_id = ?"))
            .bind(instance_id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_instance(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query(&format!("{SELECT_INSTANCE} ORDER BY instance_id"))
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|row| row_to_instance(row).map_err(Into::into))
            .collect()
    }

    pub async fn list_enabled_instances(&self) -> Result<Vec<Instance>> {
        let rows = sqlx::query(&format!(
            "{SELECT_INSTANCE} WHERE enabled = 1 ORDER BY instance_id"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row_to_instance(row).map_err(Into::into))
            .collect()
    }

    pub async fn set_instance_enabled(&self, instance_id: &str, enabled: bool) -> Result<()> {
        self.with_write(|| async {
            sqlx::query("UPDATE instances SET enabled = ? WHERE instance_id = ?")
                .bind(enabled)
                .bind(instance_id)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn set_instance_paused(
        &self,
        instance_id: &str,
        is_paused: bool,
        paused_until_utc: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        self.with_write(|| async {
            sqlx::query(
                "UPDATE instances SET is_paused = ?, paused_until_utc = ? WHERE instance_id = ?",
            )
            .bind(is_paused)
            .bind(paused_until_utc)
            .bind(instance_id)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }
}
