//! Notification channel configuration: SMTP settings, recipients, webhooks.

use anyhow::Result;
use sqlx::Row;

use super::records::{Recipient, SecurityMode, SmtpSettings, WebhookEndpoint};
use super::Database;

impl Database {
    /// Save SMTP settings for an instance. `password_protected` must already
    /// be protector ciphertext; the store never sees the plain password.
    pub async fn upsert_smtp_settings(&self, settings: &SmtpSettings) -> Result<()> {
        self.with_write(|| async {
            sqlx::query(
                r#"
                INSERT INTO smtp_settings (
                    instance_id, host, port, security_mode, username,
                    password_protected, from_address
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(instance_id) DO UPDATE SET
                    host = excluded.host,
                    port = excluded.port,
                    security_mode = excluded.security_mode,
                    username = excluded.username,
                    password_protected = excluded.password_protected,
                    from_address = excluded.from_address
                "#,
            )
            .bind(&settings.instance_id)
            .bind(&settings.host)
            .bind(settings.port)
            .bind(settings.security_mode.as_str())
            .bind(&settings.username)
            .bind(&settings.password_protected)
            .bind(&settings.from_address)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn get_smtp_settings(&self, instance_id: &str) -> Result<Option<SmtpSettings>> {
        let row = sqlx::query(
            r#"
            SELECT instance_id, host, port, security_mode, username,
                   password_protected, from_address
            FROM smtp_settings
            WHERE instance_id = ?
            "#,
        )
        .bind(instance_id)
        .fetch_optional(self.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw_mode: String = row.try_get("security_mode")?;
        Ok(Some(SmtpSettings {
            instance_id: row.try_get("instance_id")?,
            host: row.try_get("host")?,
            port: row.try_get("port")?,
            security_mode: SecurityMode::parse(&raw_mode).unwrap_or(SecurityMode::StartTls),
            username: row.try_get("username")?,
            password_protected: row.try_get("password_protected")?,
            from_address: row.try_get("from_address")?,
        }))
    }

    pub async fn add_recipient(&self, instance_id: &str, email: &str) -> Result<()> {
        self.with_write(|| async {
            sqlx::query(
                r#"
                INSERT INTO recipients (instance_id, email, enabled)
                VALUES (?, ?, 1)
                ON CONFLICT(instance_id, email) DO UPDATE SET enabled = 1
                "#,
            )
            .bind(instance_id)
            .bind(email)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn set_recipient_enabled(
        &self,
        instance_id: &str,
        email: &str,
        enabled: bool,
    ) -> Result<()> {
        self.with_write(|| async {
            sqlx::query("UPDATE recipients SET enabled = ? WHERE instance_id = ? AND email = ?")
                .bind(enabled)
                .bind(instance_id)
                .bind(email)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn enabled_recipients(&self, instance_id: &str) -> Result<Vec<Recipient>> {
        let rows = sqlx::query(
            r#"
            SELECT recipient_id, instance_id, email, enabled
            FROM recipients
            WHERE instance_id = ? AND enabled = 1
            ORDER BY email
            "#,
        )
        .bind(instance_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Recipient {
                    recipient_id: row.try_get("recipient_id")?,
                    instance_id: row.try_get("instance_id")?,
                    email: row.try_get("email")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }

    pub async fn add_webhook_endpoint(&self, instance_id: &str, url: &str) -> Result<()> {
        self.with_write(|| async {
            sqlx::query(
                r#"
                INSERT INTO webhook_endpoints (instance_id, url, enabled)
                VALUES (?, ?, 1)
                ON CONFLICT(instance_id, url) DO UPDATE SET enabled = 1
                "#,
            )
            .bind(instance_id)
            .bind(url)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn set_webhook_enabled(
        &self,
        instance_id: &str,
        url: &str,
        enabled: bool,
    ) -> Result<()> {
        self.with_write(|| async {
            sqlx::query("UPDATE webhook_endpoints SET enabled = ? WHERE instance_id = ? AND url = ?")
                .bind(enabled)
                .bind(instance_id)
                .bind(url)
                .execute(self.pool())
                .await
                .map(|_| ())
        })
        .await
    }

    pub async fn enabled_webhook_endpoints(&self, instance_id: &str) -> Result<Vec<WebhookEndpoint>> {
        let rows = sqlx::query(
            r#"
            SELECT endpoint_id, instance_id, url, enabled
            FROM webhook_endpoints
            WHERE instance_id = ? AND enabled = 1
            ORDER BY endpoint_id
            "#,
        )
        .bind(instance_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(WebhookEndpoint {
                    endpoint_id: row.try_get("endpoint_id")?,
                    instance_id: row.try_get("instance_id")?,
                    url: row.try_get("url")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }
}
