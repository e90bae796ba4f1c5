//! The alert evaluator: a periodic ticker that turns persisted target states
//! into down/repeat/recovered notifications on the escalation ladder.
//!
//! Each tick observes a snapshot of one instance's states, sends at most one
//! notification per target, and commits that tick's alert-field mutations
//! and events together in a single gated transaction. Delivery failures
//! leave the due times untouched so the next tick retries.

mod messages;
mod schedule;

pub use messages::{AlertContext, AlertKind};
pub use schedule::AlertPolicy;

use anyhow::Result;
use chrono::Duration;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AlertingSettings;
use crate::database::{
    AlertFieldsUpdate, Database, EventType, Instance, NewEvent, Target, TargetState,
};
use crate::notify::{Dispatcher, InstanceChannels, SmtpConnection};
use crate::protector::Protector;
use crate::runtime::{RuntimeManager, WorkerState};
use crate::timezone::TimeZoneResolver;

pub struct AlertEvaluator {
    db: Arc<Database>,
    runtime: Arc<RuntimeManager>,
    dispatcher: Dispatcher,
    protector: Arc<Protector>,
    resolver: TimeZoneResolver,
    clock: Arc<dyn Clock>,
    defaults: AlertingSettings,
}

/// What one target contributed to the tick's commit.
#[derive(Default)]
struct TargetOutcome {
    update: Option<AlertFieldsUpdate>,
    events: Vec<NewEvent>,
}

impl AlertEvaluator {
    pub fn new(
        db: Arc<Database>,
        runtime: Arc<RuntimeManager>,
        dispatcher: Dispatcher,
        protector: Arc<Protector>,
        clock: Arc<dyn Clock>,
        defaults: AlertingSettings,
    ) -> Self {
        Self {
            db,
            runtime,
            dispatcher,
            protector,
            resolver: TimeZoneResolver::new(),
            clock,
            defaults,
        }
    }

    /// Ticker loop; runs until the stop channel fires.
    pub async fn run(self: Arc<Self>, mut stop: broadcast::Receiver<()>) {
        let tick = std::time::Duration::from_secs(self.defaults.scheduler_tick_seconds.max(1));
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Alert evaluator started with {:?} tick", tick);

        loop {
            tokio::select! {
                _ = stop.recv() => {
                    info!("Alert evaluator stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.evaluate_all().await {
                        warn!("Alert evaluation pass failed: {}", e);
                    }
                }
            }
        }
    }

    /// Evaluate every instance whose worker is currently running. Stopped
    /// workers halt alerting immediately; there is no catch-up for repeats
    /// missed while paused.
    pub async fn evaluate_all(&self) -> Result<()> {
        for status in self.runtime.get_all().await {
            if status.state != WorkerState::Running {
                continue;
            }
            if let Err(e) = self.evaluate_instance(&status.instance_id).await {
                warn!("Alert evaluation failed for {}: {}", status.instance_id, e);
            }
        }
        Ok(())
    }

    /// One instance, one tick: snapshot states, walk the DOWN/UP paths, and
    /// commit the results together.
    pub async fn evaluate_instance(&self, instance_id: &str) -> Result<()> {
        let Some(instance) = self.db.get_instance(instance_id).await? else {
            return Ok(());
        };

        let channels = self.load_channels(&instance).await?;
        if !channels.is_configured() {
            debug!("No notification channels for {}, skipping", instance_id);
            return Ok(());
        }

        let policy = AlertPolicy::resolve(&instance, &self.defaults);
        let zone = self.resolver.resolve(&instance.time_zone_id);
        let pairs = self.db.states_with_targets(instance_id).await?;

        let mut updates = Vec::new();
        let mut events = Vec::new();
        for (target, state) in &pairs {
            let outcome = self
                .evaluate_target(&instance, target, state, &policy, zone, &channels)
                .await;
            if let Some(update) = outcome.update {
                updates.push(update);
            }
            events.extend(outcome.events);
        }

        self.db.commit_alert_outcomes(&updates, &events).await
    }

    async fn evaluate_target(
        &self,
        instance: &Instance,
        target: &Target,
        state: &TargetState,
        policy: &AlertPolicy,
        zone: Tz,
        channels: &InstanceChannels,
    ) -> TargetOutcome {
        let now = self.clock.now_utc();

        if !state.is_up {
            self.evaluate_down(instance, target, state, policy, zone, channels, now)
                .await
        } else {
            self.evaluate_up(instance, target, state, policy, zone, channels, now)
                .await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_down(
        &self,
        instance: &Instance,
        target: &Target,
        state: &TargetState,
        policy: &AlertPolicy,
        zone: Tz,
        channels: &InstanceChannels,
        now: chrono::DateTime<chrono::Utc>,
    ) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();
        let down_start = state.state_since_utc;
        let down_age = now - down_start;

        if state.down_first_notified_utc.is_none() {
            if down_age < Duration::seconds(policy.down_after_seconds) {
                return outcome;
            }

            let delivery = self
                .send(AlertKind::Down, instance, target, state, zone, channels, now)
                .await;
            if delivery.delivered {
                let mut next = state.clone();
                next.down_first_notified_utc = Some(now);
                next.last_notified_utc = Some(now);
                next.next_notify_utc =
                    Some(policy.next_notify(down_start, now, zone, &self.resolver));
                outcome.update = Some(AlertFieldsUpdate::from_state(&next));
                outcome.events.push(self.event(
                    instance,
                    target,
                    now,
                    EventType::AlertDown,
                    format!("DOWN alert sent for {}", target.url),
                ));
            } else {
                outcome.events.push(self.delivery_error(
                    instance,
                    target,
                    now,
                    &delivery.failures,
                ));
            }
            return outcome;
        }

        let due = state
            .next_notify_utc
            .map(|at| now >= at)
            .unwrap_or(false);
        if !due {
            return outcome;
        }

        let delivery = self
            .send(
                AlertKind::DownRepeat,
                instance,
                target,
                state,
                zone,
                channels,
                now,
            )
            .await;
        if delivery.delivered {
            let mut next = state.clone();
            next.last_notified_utc = Some(now);
            next.next_notify_utc = Some(policy.next_notify(down_start, now, zone, &self.resolver));
            outcome.update = Some(AlertFieldsUpdate::from_state(&next));
            outcome.events.push(self.event(
                instance,
                target,
                now,
                EventType::AlertDownRepeat,
                format!("Repeat DOWN alert sent for {}", target.url),
            ));
        } else {
            outcome
                .events
                .push(self.delivery_error(instance, target, now, &delivery.failures));
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_up(
        &self,
        instance: &Instance,
        target: &Target,
        state: &TargetState,
        policy: &AlertPolicy,
        zone: Tz,
        channels: &InstanceChannels,
        now: chrono::DateTime<chrono::Utc>,
    ) -> TargetOutcome {
        let mut outcome = TargetOutcome::default();

        // No DOWN was emitted for this outage; nothing to recover from.
        if state.down_first_notified_utc.is_none() {
            if state.recovered_due_utc.is_some() || state.recovered_notified_utc.is_some() {
                let mut next = state.clone();
                next.recovered_due_utc = None;
                next.recovered_notified_utc = None;
                outcome.update = Some(AlertFieldsUpdate::from_state(&next));
            }
            return outcome;
        }

        if state.recovered_notified_utc.is_some() {
            return outcome;
        }

        let Some(due) = state.recovered_due_utc else {
            let mut next = state.clone();
            next.recovered_due_utc =
                Some(state.state_since_utc + Duration::seconds(policy.recovered_after_seconds));
            outcome.update = Some(AlertFieldsUpdate::from_state(&next));
            return outcome;
        };

        if now < due {
            return outcome;
        }

        let delivery = self
            .send(
                AlertKind::Recovered,
                instance,
                target,
                state,
                zone,
                channels,
                now,
            )
            .await;
        if delivery.delivered {
            let mut next = state.clone();
            next.recovered_notified_utc = Some(now);
            next.down_first_notified_utc = None;
            next.last_notified_utc = None;
            next.next_notify_utc = None;
            next.recovered_due_utc = None;
            outcome.update = Some(AlertFieldsUpdate::from_state(&next));
            outcome.events.push(self.event(
                instance,
                target,
                now,
                EventType::AlertRecovered,
                format!("RECOVERED alert sent for {}", target.url),
            ));
        } else {
            outcome
                .events
                .push(self.delivery_error(instance, target, now, &delivery.failures));
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        kind: AlertKind,
        instance: &Instance,
        target: &Target,
        state: &TargetState,
        zone: Tz,
        channels: &InstanceChannels,
        now: chrono::DateTime<chrono::Utc>,
    ) -> crate::notify::DeliveryOutcome {
        let ctx = AlertContext {
            kind,
            instance,
            target,
            state,
            now,
            zone,
            public_base_url: self.defaults.public_base_url.as_deref(),
        };
        let email = messages::email_message(&ctx, &self.resolver);
        let payload = messages::webhook_payload(&ctx);
        self.dispatcher.dispatch(channels, &email, &payload).await
    }

    fn event(
        &self,
        instance: &Instance,
        target: &Target,
        now: chrono::DateTime<chrono::Utc>,
        event_type: EventType,
        message: String,
    ) -> NewEvent {
        NewEvent {
            instance_id: instance.instance_id.clone(),
            target_id: Some(target.target_id),
            timestamp_utc: now,
            event_type,
            message,
        }
    }

    fn delivery_error(
        &self,
        instance: &Instance,
        target: &Target,
        now: chrono::DateTime<chrono::Utc>,
        failures: &[String],
    ) -> NewEvent {
        self.event(
            instance,
            target,
            now,
            EventType::Error,
            format!(
                "Notification delivery failed for {}: {}",
                target.url,
                failures.join("; ")
            ),
        )
    }

    /// Resolve the instance's notification channels once per evaluation.
    /// Email needs host, port, from address and at least one enabled
    /// recipient; a protector failure drops the email channel for this pass.
    async fn load_channels(&self, instance: &Instance) -> Result<InstanceChannels> {
        let mut channels = InstanceChannels::default();

        if let Some(smtp) = self.db.get_smtp_settings(&instance.instance_id).await? {
            let recipients = self.db.enabled_recipients(&instance.instance_id).await?;
            if !smtp.host.is_empty()
                && smtp.port > 0
                && !smtp.from_address.is_empty()
                && !recipients.is_empty()
            {
                let mut email_usable = true;
                let mut password = None;
                if let Some(opaque) = &smtp.password_protected {
                    match self.protector.unprotect(opaque) {
                        Ok(plain) => password = Some(plain),
                        Err(e) => {
                            warn!(
                                "SMTP password unprotect failed for {}: {}; email skipped",
                                instance.instance_id, e
                            );
                            email_usable = false;
                        }
                    }
                }

                if email_usable {
                    let connection = SmtpConnection {
                        host: smtp.host.clone(),
                        port: smtp.port as u16,
                        security: smtp.security_mode,
                        username: smtp.username.clone(),
                        password,
                        from_address: smtp.from_address.clone(),
                    };
                    let addresses = recipients.into_iter().map(|r| r.email).collect();
                    channels.email = Some((connection, addresses));
                }
            }
        }

        channels.endpoints = self
            .db
            .enabled_webhook_endpoints(&instance.instance_id)
            .await?
            .into_iter()
            .map(|e| e.url)
            .collect();

        Ok(channels)
    }
}
