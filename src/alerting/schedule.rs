//! Alert policy resolution and the escalation ladder.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::config::AlertingSettings;
use crate::database::Instance;
use crate::timezone::TimeZoneResolver;

/// Effective alert policy for one instance: per-row overrides coalesced with
/// the global defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPolicy {
    pub down_after_seconds: i64,
    pub recovered_after_seconds: i64,
    pub repeat_every_seconds_under_24h: i64,
    pub repeat_every_seconds_24h_to_72h: i64,
    pub daily_after_hours: i64,
    pub daily_hour_local: u32,
    pub daily_minute_local: u32,
}

impl AlertPolicy {
    pub fn resolve(instance: &Instance, defaults: &AlertingSettings) -> Self {
        let hour = instance
            .daily_hour_local
            .map(|h| h.clamp(0, 23) as u32)
            .unwrap_or(defaults.daily_hour_local.min(23));
        let minute = instance
            .daily_minute_local
            .map(|m| m.clamp(0, 59) as u32)
            .unwrap_or(defaults.daily_minute_local.min(59));

        Self {
            down_after_seconds: instance
                .down_after_seconds
                .unwrap_or(defaults.down_after_seconds),
            recovered_after_seconds: instance
                .recovered_after_seconds
                .unwrap_or(defaults.recovered_after_seconds),
            repeat_every_seconds_under_24h: instance
                .repeat_every_seconds_under_24h
                .unwrap_or(defaults.repeat_every_seconds_under_24h),
            repeat_every_seconds_24h_to_72h: instance
                .repeat_every_seconds_24h_to_72h
                .unwrap_or(defaults.repeat_every_seconds_24h_to_72h),
            daily_after_hours: instance
                .daily_after_hours
                .unwrap_or(defaults.daily_after_hours),
            daily_hour_local: hour,
            daily_minute_local: minute,
        }
    }

    /// When the next repeat notification is due, given that one was just
    /// sent at `now`.
    ///
    /// Ladder: under 24 hours of outage the short cadence applies, up to the
    /// daily threshold the hourly cadence, and beyond that one notification
    /// per day at the configured local wall-clock time in the instance's
    /// zone.
    pub fn next_notify(
        &self,
        down_start: DateTime<Utc>,
        now: DateTime<Utc>,
        zone: Tz,
        resolver: &TimeZoneResolver,
    ) -> DateTime<Utc> {
        let age = now - down_start;

        if age < Duration::hours(24) {
            return now + Duration::seconds(self.repeat_every_seconds_under_24h);
        }
        if age < Duration::hours(self.daily_after_hours) {
            return now + Duration::seconds(self.repeat_every_seconds_24h_to_72h);
        }

        let local_today = resolver.to_local(now, zone).date_naive();
        let wall = local_today
            .and_hms_opt(self.daily_hour_local, self.daily_minute_local, 0)
            .unwrap_or_else(|| local_today.and_hms_opt(0, 0, 0).expect("midnight exists"));
        let candidate = resolver.to_utc(wall, zone);
        if candidate <= now {
            candidate + Duration::days(1)
        } else {
            candidate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instance_with_overrides() -> Instance {
        Instance {
            instance_id: "acme".into(),
            display_name: "Acme".into(),
            enabled: true,
            is_paused: false,
            paused_until_utc: None,
            check_interval_seconds: 60,
            concurrency_limit: 4,
            time_zone_id: "Europe/Berlin".into(),
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            down_after_seconds: Some(60),
            recovered_after_seconds: None,
            repeat_every_seconds_under_24h: Some(600),
            repeat_every_seconds_24h_to_72h: None,
            daily_after_hours: None,
            daily_hour_local: Some(8),
            daily_minute_local: None,
        }
    }

    #[test]
    fn resolve_prefers_instance_overrides() {
        let policy = AlertPolicy::resolve(&instance_with_overrides(), &AlertingSettings::default());
        assert_eq!(policy.down_after_seconds, 60);
        assert_eq!(policy.repeat_every_seconds_under_24h, 600);
        assert_eq!(policy.daily_hour_local, 8);
        // Unset fields fall through to the defaults.
        assert_eq!(policy.recovered_after_seconds, 60);
        assert_eq!(policy.repeat_every_seconds_24h_to_72h, 3600);
        assert_eq!(policy.daily_after_hours, 72);
        assert_eq!(policy.daily_minute_local, 0);
    }

    fn default_policy() -> AlertPolicy {
        let mut instance = instance_with_overrides();
        instance.down_after_seconds = None;
        instance.repeat_every_seconds_under_24h = None;
        instance.daily_hour_local = None;
        AlertPolicy::resolve(&instance, &AlertingSettings::default())
    }

    #[test]
    fn under_24h_uses_short_cadence() {
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = down_start + Duration::hours(2);

        let next = policy.next_notify(down_start, now, Tz::UTC, &resolver);
        assert_eq!(next, now + Duration::seconds(1800));
    }

    #[test]
    fn after_24h_switches_to_hourly() {
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = down_start + Duration::hours(30);

        let next = policy.next_notify(down_start, now, Tz::UTC, &resolver);
        assert_eq!(next, now + Duration::seconds(3600));
    }

    #[test]
    fn boundary_at_exactly_24h_is_hourly() {
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = down_start + Duration::hours(24);

        let next = policy.next_notify(down_start, now, Tz::UTC, &resolver);
        assert_eq!(next, now + Duration::seconds(3600));
    }

    #[test]
    fn beyond_daily_threshold_lands_on_local_morning() {
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let zone = resolver.resolve("Europe/Berlin");
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        // Outage is 80 hours old; it's 20:00 UTC on May 4th (22:00 Berlin).
        let now = Utc.with_ymd_and_hms(2024, 5, 4, 20, 0, 0).unwrap();

        let next = policy.next_notify(down_start, now, zone, &resolver);
        // Next 10:00 Berlin (CEST = UTC+2) is May 5th 08:00 UTC.
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 5, 8, 0, 0).unwrap());
    }

    #[test]
    fn daily_today_when_local_time_not_yet_reached() {
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let zone = resolver.resolve("Europe/Berlin");
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        // 05:00 UTC on May 5th is 07:00 Berlin, before the 10:00 slot.
        let now = Utc.with_ymd_and_hms(2024, 5, 5, 5, 0, 0).unwrap();

        let next = policy.next_notify(down_start, now, zone, &resolver);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 5, 8, 0, 0).unwrap());
    }

    #[test]
    fn escalation_sequence_matches_ladder() {
        // First notify at t0, repeats every 1800s while young, then the
        // cadence stretches after the 24h boundary.
        let policy = default_policy();
        let resolver = TimeZoneResolver::new();
        let down_start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let t0 = down_start + Duration::seconds(180);

        let mut last = t0;
        for _ in 0..3 {
            let next = policy.next_notify(down_start, last, Tz::UTC, &resolver);
            assert_eq!(next, last + Duration::seconds(1800));
            last = next;
        }

        let late = down_start + Duration::hours(25);
        let next = policy.next_notify(down_start, late, Tz::UTC, &resolver);
        assert_eq!(next, late + Duration::seconds(3600));
    }
}
