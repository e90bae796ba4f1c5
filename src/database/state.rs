//! Target state: the pure advance function and state queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::records::{Target, TargetState};
use super::targets::row_to_target;
use super::Database;
use crate::probe::ProbeResult;

/// Advance a target's state with one probe outcome.
///
/// Invariants upheld here and pinned by the unit tests below:
/// - `consecutive_failures == 0` iff `is_up`
/// - `state_since_utc` moves only when `is_up` flips
/// - login fields change only when the probe carried an HTTP status
///   (transport failures must not clobber last-known login state)
/// - `login_detected_ever` never clears
/// - alert bookkeeping is carried through untouched; only the evaluator
///   writes those fields
pub fn advance_state(prev: Option<&TargetState>, result: &ProbeResult) -> TargetState {
    let now_up = result.tcp_ok && result.http_ok;

    let Some(prev) = prev else {
        return TargetState {
            target_id: result.target_id,
            is_up: now_up,
            last_check_utc: result.timestamp_utc,
            state_since_utc: result.timestamp_utc,
            last_change_utc: result.timestamp_utc,
            consecutive_failures: if now_up { 0 } else { 1 },
            last_summary: Some(result.summary.clone()),
            last_final_url: result.final_url.clone(),
            last_used_ip: result.used_ip.clone(),
            last_detected_login_type: result.detected_login_type.clone(),
            login_detected_last: result.login_detected,
            login_detected_ever: result.login_detected,
            down_first_notified_utc: None,
            last_notified_utc: None,
            next_notify_utc: None,
            recovered_due_utc: None,
            recovered_notified_utc: None,
        };
    };

    let mut next = prev.clone();
    next.last_check_utc = result.timestamp_utc;
    next.last_summary = Some(result.summary.clone());
    next.last_final_url = result.final_url.clone().or_else(|| prev.last_final_url.clone());
    next.last_used_ip = result.used_ip.clone().or_else(|| prev.last_used_ip.clone());

    if result.http_status_code.is_some() {
        next.login_detected_last = result.login_detected;
        next.last_detected_login_type = result.detected_login_type.clone();
        next.login_detected_ever = prev.login_detected_ever || result.login_detected;
    }

    if now_up == prev.is_up {
        next.consecutive_failures = if now_up {
            0
        } else {
            prev.consecutive_failures + 1
        };
    } else {
        next.is_up = now_up;
        next.state_since_utc = result.timestamp_utc;
        next.last_change_utc = result.timestamp_utc;
        next.consecutive_failures = if now_up { 0 } else { 1 };
    }

    next
}

pub(super) fn row_to_state(row: &SqliteRow) -> Result<TargetState, sqlx::Error> {
    Ok(TargetState {
        target_id: row.try_get("target_id")?,
        is_up: row.try_get("is_up")?,
        last_check_utc: row.try_get("last_check_utc")?,
        state_since_utc: row.try_get("state_since_utc")?,
        last_change_utc: row.try_get("last_change_utc")?,
        consecutive_failures: row.try_get("consecutive_failures")?,
        last_summary: row.try_get("last_summary")?,
        last_final_url: row.try_get("last_final_url")?,
        last_used_ip: row.try_get("last_used_ip")?,
        last_detected_login_type: row.try_get("last_detected_login_type")?,
        login_detected_last: row.try_get("login_detected_last")?,
        login_detected_ever: row.try_get("login_detected_ever")?,
        down_first_notified_utc: row.try_get("down_first_notified_utc")?,
        last_notified_utc: row.try_get("last_notified_utc")?,
        next_notify_utc: row.try_get("next_notify_utc")?,
        recovered_due_utc: row.try_get("recovered_due_utc")?,
        recovered_notified_utc: row.try_get("recovered_notified_utc")?,
    })
}

const SELECT_STATE: &str = r#"
    SELECT target_id, is_up, last_check_utc, state_since_utc, last_change_utc,
           consecutive_failures, last_summary, last_final_url, last_used_ip,
           last_detected_login_type, login_detected_last, login_detected_ever,
           down_first_notified_utc, last_notified_utc, next_notify_utc,
           recovered_due_utc, recovered_notified_utc
    FROM target_state
"#;

/// Alert-tracking mutation produced by one evaluator tick for one target.
#[derive(Debug, Clone)]
pub struct AlertFieldsUpdate {
    pub target_id: i64,
    pub down_first_notified_utc: Option<DateTime<Utc>>,
    pub last_notified_utc: Option<DateTime<Utc>>,
    pub next_notify_utc: Option<DateTime<Utc>>,
    pub recovered_due_utc: Option<DateTime<Utc>>,
    pub recovered_notified_utc: Option<DateTime<Utc>>,
}

impl AlertFieldsUpdate {
    pub fn from_state(state: &TargetState) -> Self {
        Self {
            target_id: state.target_id,
            down_first_notified_utc: state.down_first_notified_utc,
            last_notified_utc: state.last_notified_utc,
            next_notify_utc: state.next_notify_utc,
            recovered_due_utc: state.recovered_due_utc,
            recovered_notified_utc: state.recovered_notified_utc,
        }
    }
}

impl Database {
    pub async fn get_state(&self, target_id: i64) -> Result<Option<TargetState>> {
        let row = sqlx::query(&format!("{SELECT_STATE} WHERE target_id = ?"))
            .bind(target_id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(row_to_state(&row)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of the instance's enabled targets joined with their states,
    /// in target id order. Targets probed at least once only.
    pub async fn states_with_targets(
        &self,
        instance_id: &str,
    ) -> Result<Vec<(Target, TargetState)>> {
        let rows = sqlx::query(
            r#"
            SELECT t.target_id, t.instance_id, t.url, t.enabled,
                   t.http_expected_status_min, t.http_expected_status_max,
                   t.login_rule, t.created_utc,
                   s.is_up, s.last_check_utc, s.state_since_utc, s.last_change_utc,
                   s.consecutive_failures, s.last_summary, s.last_final_url,
                   s.last_used_ip, s.last_detected_login_type,
                   s.login_detected_last, s.login_detected_ever,
                   s.down_first_notified_utc, s.last_notified_utc, s.next_notify_utc,
                   s.recovered_due_utc, s.recovered_notified_utc
            FROM targets t
            JOIN target_state s ON s.target_id = t.target_id
            WHERE t.instance_id = ? AND t.enabled = 1
            ORDER BY t.target_id
            "#,
        )
        .bind(instance_id)
        .fetch_all(self.pool())
        .await?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in &rows {
            pairs.push((row_to_target(row)?, row_to_state(row)?));
        }
        Ok(pairs)
    }

    /// Commit one evaluator tick: alert-field mutations and the events they
    /// produced land together in a single gated transaction.
    pub async fn commit_alert_outcomes(
        &self,
        updates: &[AlertFieldsUpdate],
        events: &[super::records::NewEvent],
    ) -> Result<()> {
        if updates.is_empty() && events.is_empty() {
            return Ok(());
        }

        self.with_write(|| async {
            let mut tx = self.pool().begin().await?;

            for update in updates {
                sqlx::query(
                    r#"
                    UPDATE target_state
                    SET down_first_notified_utc = ?,
                        last_notified_utc = ?,
                        next_notify_utc = ?,
                        recovered_due_utc = ?,
                        recovered_notified_utc = ?
                    WHERE target_id = ?
                    "#,
                )
                .bind(update.down_first_notified_utc)
                .bind(update.last_notified_utc)
                .bind(update.next_notify_utc)
                .bind(update.recovered_due_utc)
                .bind(update.recovered_notified_utc)
                .bind(update.target_id)
                .execute(&mut *tx)
                .await?;
            }

            for event in events {
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
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        })
        .await
    }
}
