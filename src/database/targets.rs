//! Target configuration operations.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use url::Url;

use super::records::{NewTarget, Target};
use super::Database;

pub(super) fn row_to_target(row: &SqliteRow) -> Result<Target, sqlx::Error> {
    Ok(Target {
        target_id: row.try_get("target_id")?,
        instance_id: row.try_get("instance_id")?,
        url: row.try_get("url")?,
        enabled: row.try_get("enabled")?,
        http_expected_status_min: row.try_get("http_expected_status_min")?,
        http_expected_status_max: row.try_get("http_expected_status_max")?,
        login_rule: row.try_get("login_rule")?,
        created_utc: row.try_get("created_utc")?,
    })
}

const SELECT_TARGET: &str = r#"
    SELECT target_id, instance_id, url, enabled,
           http_expected_status_min, http_expected_status_max,
           login_rule, created_utc
    FROM targets
"#;

impl Database {
    pub async fn create_target(&self, target: &NewTarget) -> Result<i64> {
        let parsed = Url::parse(&target.url)
            .map_err(|e| anyhow::anyhow!("Invalid target url '{}': {}", target.url, e))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            bail!("Target url must be http or https: {}", target.url);
        }
        if target.http_expected_status_min > target.http_expected_status_max {
            bail!("Expected status range is inverted");
        }

        let created = Utc::now();
        let target_id = self
            .with_write(|| async {
                let result = sqlx::query(
                    r#"
                    INSERT INTO targets (
                        instance_id, url, enabled,
                        http_expected_status_min, http_expected_status_max,
                        login_rule, created_utc
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&target.instance_id)
                .bind(&target.url)
                .bind(target.enabled)
                .bind(target.http_expected_status_min)
                .bind(target.http_expected_status_max)
                .bind(&target.login_rule)
                .bind(created)
                .execute(self.pool())
                .await?;
                Ok(result.last_insert_rowid())
            })
            .await?;

        Ok(target_id)
    }

    pub async fn get_target(&self, target_id: i64) -> Result<Option<Target>> {
        let row = sqlx::query(&format!("{SELECT_TARGET} WHERE target_id = ?"))
            .bind(target_id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_target(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_targets(&self, instance_id: &str) -> Result<Vec<Target>> {
        let rows = sqlx::query(&format!(
            "{SELECT_TARGET} WHERE instance_id = ? ORDER BY target_id"
        ))
        .bind(instance_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row_to_target(row).map_err(Into::into))
            .collect()
    }

    /// Targets a probe cycle fans out over, in stable id order.
    pub async fn enabled_targets(&self, instance_id: &str) -> Result<Vec<Target>> {
        let rows = sqlx::query(&format!(
            "{SELECT_TARGET} WHERE instance_id = ? AND enabled = 1 ORDER BY target_id"
        ))
        .bind(instance_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| row_to_target(row).map_err(Into::into))
            .collect()
    }

    pub async fn set_target_enabled(&self, target_id: i64, enabled: bool) -> Result<()> {
        self.with_write(|| async {
            sqlx::query("UPDATE targets SET enabled = ? WHERE target_id = ?")
                .bind(enabled)
                .bind(target_id)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }
}
