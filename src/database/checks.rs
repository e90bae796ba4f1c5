//! The per-cycle persister transaction.
//!
//! One cycle's probe results become append-only `checks` rows plus a
//! `target_state` upsert, in a single transaction so a state transition is
//! never visible without its backing check row.

use anyhow::Result;
use sqlx::QueryBuilder;
use std::collections::HashMap;
use tracing::debug;

use super::state::advance_state;
use super::Database;
use crate::probe::ProbeResult;

impl Database {
    /// Persist one cycle under the write gate with the retry policy.
    pub async fn persist_cycle(&self, results: &[ProbeResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        self.with_write(|| self.apply_cycle(results)).await?;
        debug!("Persisted cycle of {} probe results", results.len());
        Ok(())
    }

    async fn apply_cycle(&self, results: &[ProbeResult]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        // One query for every state row touched by this batch.
        let ids: Vec<i64> = results.iter().map(|r| r.target_id).collect();
        let mut builder = QueryBuilder::new(
            r#"
            SELECT target_id, is_up, last_check_utc, state_since_utc, last_change_utc,
                   consecutive_failures, last_summary, last_final_url, last_used_ip,
                   last_detected_login_type, login_detected_last, login_detected_ever,
                   down_first_notified_utc, last_notified_utc, next_notify_utc,
                   recovered_due_utc, recovered_notified_utc
            FROM target_state
            WHERE target_id IN (
            "#,
        );
        let mut separated = builder.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&mut *tx).await?;
        let mut states = HashMap::with_capacity(rows.len());
        for row in &rows {
            let state = super::state::row_to_state(row)?;
            states.insert(state.target_id, state);
        }

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO checks (
                    target_id, timestamp_utc, tcp_ok, http_ok, http_status_code,
                    tcp_latency_ms, http_latency_ms, final_url, used_ip,
                    detected_login_type, login_detected, summary
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(result.target_id)
            .bind(result.timestamp_utc)
            .bind(result.tcp_ok)
            .bind(result.http_ok)
            .bind(result.http_status_code)
            .bind(result.tcp_latency_ms)
            .bind(result.http_latency_ms)
            .bind(&result.final_url)
            .bind(&result.used_ip)
            .bind(&result.detected_login_type)
            .bind(result.login_detected)
            .bind(&result.summary)
            .execute(&mut *tx)
            .await?;

            let next = advance_state(states.get(&result.target_id), result);
            sqlx::query(
                r#"
                INSERT INTO target_state (
                    target_id, is_up, last_check_utc, state_since_utc, last_change_utc,
                    consecutive_failures, last_summary, last_final_url, last_used_ip,
                    last_detected_login_type, login_detected_last, login_detected_ever,
                    down_first_notified_utc, last_notified_utc, next_notify_utc,
                    recovered_due_utc, recovered_notified_utc
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(target_id) DO UPDATE SET
                    is_up = excluded.is_up,
                    last_check_utc = excluded.last_check_utc,
                    state_since_utc = excluded.state_since_utc,
                    last_change_utc = excluded.last_change_utc,
                    consecutive_failures = excluded.consecutive_failures,
                    last_summary = excluded.last_summary,
                    last_final_url = excluded.last_final_url,
                    last_used_ip = excluded.last_used_ip,
                    last_detected_login_type = excluded.last_detected_login_type,
                    login_detected_last = excluded.login_detected_last,
                    login_detected_ever = excluded.login_detected_ever,
                    down_first_notified_utc = excluded.down_first_notified_utc,
                    last_notified_utc = excluded.last_notified_utc,
                    next_notify_utc = excluded.next_notify_utc,
                    recovered_due_utc = excluded.recovered_due_utc,
                    recovered_notified_utc = excluded.recovered_notified_utc
                "#,
            )
            .bind(next.target_id)
            .bind(next.is_up)
            .bind(next.last_check_utc)
            .bind(next.state_since_utc)
            .bind(next.last_change_utc)
            .bind(next.consecutive_failures)
            .bind(&next.last_summary)
            .bind(&next.last_final_url)
            .bind(&next.last_used_ip)
            .bind(&next.last_detected_login_type)
            .bind(next.login_detected_last)
            .bind(next.login_detected_ever)
            .bind(next.down_first_notified_utc)
            .bind(next.last_notified_utc)
            .bind(next.next_notify_utc)
            .bind(next.recovered_due_utc)
            .bind(next.recovered_notified_utc)
            .execute(&mut *tx)
            .await?;

            states.insert(next.target_id, next);
        }

        tx.commit().await
    }

    /// Most recent check rows for a target, newest first.
    pub async fn recent_checks(
        &self,
        target_id: i64,
        limit: i64,
    ) -> Result<Vec<super::records::CheckRecord>> {
        use sqlx::Row;

        let rows = sqlx::query(
            r#"
            SELECT check_id, target_id, timestamp_utc, tcp_ok, http_ok, http_status_code,
                   tcp_latency_ms, http_latency_ms, final_url, used_ip,
                   detected_login_type, login_detected, summary
            FROM checks
            WHERE target_id = ?
            ORDER BY timestamp_utc DESC
            LIMIT ?
            "#,
        )
        .bind(target_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(super::records::CheckRecord {
                check_id: row.try_get("check_id")?,
                target_id: row.try_get("target_id")?,
                timestamp_utc: row.try_get("timestamp_utc")?,
                tcp_ok: row.try_get("tcp_ok")?,
                http_ok: row.try_get("http_ok")?,
                http_status_code: row.try_get("http_status_code")?,
                tcp_latency_ms: row.try_get("tcp_latency_ms")?,
                http_latency_ms: row.try_get("http_latency_ms")?,
                final_url: row.try_get("final_url")?,
                used_ip: row.try_get("used_ip")?,
                detected_login_type: row.try_get("detected_login_type")?,
                login_detected: row.try_get("login_detected")?,
                summary: row.try_get("summary")?,
            });
        }
        Ok(records)
    }
}
