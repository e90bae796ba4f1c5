//! Append-only audit event operations.

use anyhow::Result;
use sqlx::Row;

use super::records::{EventRecord, EventType, NewEvent};
use super::Database;

impl Database {
    pub async fn append_event(&self, event: &NewEvent) -> Result<()> {
        self.with_write(|| async {
            sqlx::query(
                r#"
                INSERT INTO events (instance_id, target_id, timestamp_utc, event_type, message)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.instance_id)
            .bind(event.target_id)
            .bind(event.timestamp_utc)
            .bind(event.event_type.as_str())
            .bind(&event.message)
            .execute(self.pool())
            .await
            .map(|_| ())
        })
        .await
    }

    pub async fn recent_events(&self, instance_id: &str, limit: i64) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, instance_id, target_id, timestamp_utc, event_type, message
            FROM events
            WHERE instance_id = ?
            ORDER BY timestamp_utc DESC, event_id DESC
            LIMIT ?
            "#,
        )
        .bind(instance_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw_type: String = row.try_get("event_type")?;
            events.push(EventRecord {
                event_id: row.try_get("event_id")?,
                instance_id: row.try_get("instance_id")?,
                target_id: row.try_get("target_id")?,
                timestamp_utc: row.try_get("timestamp_utc")?,
                event_type: EventType::parse(&raw_type).unwrap_or(EventType::Error),
                message: row.try_get("message")?,
            });
        }
        Ok(events)
    }
}
