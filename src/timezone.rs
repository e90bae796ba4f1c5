//! Time-zone resolution with Windows-ID fallback.
//!
//! Instances store an IANA zone identifier, but settings imported from other
//! systems occasionally carry Windows display ids ("W. Europe Standard
//! Time"). Resolution order: direct IANA lookup, then the Windows mapping
//! table, then UTC with a warning.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Windows time-zone display ids mapped to their canonical IANA zone.
/// Covers the zones seen in real tenant configurations; anything else falls
/// back to UTC.
const WINDOWS_ZONE_MAP: &[(&str, &str)] = &[
    ("Dateline Standard Time", "Etc/GMT+12"),
    ("UTC", "Etc/UTC"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("Romance Standard Time", "Europe/Paris"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("Turkey Standard Time", "Europe/Istanbul"),
    ("Israel Standard Time", "Asia/Jerusalem"),
    ("Arabian Standard Time", "Asia/Dubai"),
    ("India Standard Time", "Asia/Kolkata"),
    ("SE Asia Standard Time", "Asia/Bangkok"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    ("Azores Standard Time", "Atlantic/Azores"),
    ("Cape Verde Standard Time", "Atlantic/Cape_Verde"),
    ("South Africa Standard Time", "Africa/Johannesburg"),
    ("Egypt Standard Time", "Africa/Cairo"),
    ("Morocco Standard Time", "Africa/Casablanca"),
    ("E. South America Standard Time", "America/Sao_Paulo"),
    ("Argentina Standard Time", "America/Buenos_Aires"),
    ("SA Pacific Standard Time", "America/Bogota"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("Eastern Standard Time", "America/New_York"),
    ("US Eastern Standard Time", "America/Indianapolis"),
    ("Central Standard Time", "America/Chicago"),
    ("Canada Central Standard Time", "America/Regina"),
    ("Mountain Standard Time", "America/Denver"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
];

#[derive(Debug, Clone, Default)]
pub struct TimeZoneResolver;

impl TimeZoneResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a zone identifier to a concrete zone, falling back to UTC.
    pub fn resolve(&self, id: &str) -> Tz {
        if let Ok(tz) = id.parse::<Tz>() {
            return tz;
        }

        if let Some((_, iana)) = WINDOWS_ZONE_MAP.iter().find(|(win, _)| *win == id) {
            if let Ok(tz) = iana.parse::<Tz>() {
                return tz;
            }
        }

        warn!("Unknown time zone id '{}', falling back to UTC", id);
        Tz::UTC
    }

    pub fn to_local(&self, utc: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
        utc.with_timezone(&zone)
    }

    /// Interpret a wall-clock time as local time in `zone`. DST gaps and
    /// folds resolve to the earliest valid instant.
    pub fn to_utc(&self, local: NaiveDateTime, zone: Tz) -> DateTime<Utc> {
        match zone.from_local_datetime(&local).earliest() {
            Some(dt) => dt.with_timezone(&Utc),
            // Inside a spring-forward gap: shift an hour and retry.
            None => match zone
                .from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()
            {
                Some(dt) => dt.with_timezone(&Utc),
                None => Utc.from_utc_datetime(&local),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn resolves_iana_ids_directly() {
        let resolver = TimeZoneResolver::new();
        assert_eq!(resolver.resolve("Europe/Berlin"), Tz::Europe__Berlin);
        assert_eq!(resolver.resolve("America/New_York"), Tz::America__New_York);
    }

    #[test]
    fn resolves_windows_ids_via_mapping() {
        let resolver = TimeZoneResolver::new();
        assert_eq!(
            resolver.resolve("W. Europe Standard Time"),
            Tz::Europe__Berlin
        );
        assert_eq!(
            resolver.resolve("Pacific Standard Time"),
            Tz::America__Los_Angeles
        );
    }

    #[test]
    fn unknown_ids_fall_back_to_utc() {
        let resolver = TimeZoneResolver::new();
        assert_eq!(resolver.resolve("Not/AZone"), Tz::UTC);
        assert_eq!(resolver.resolve(""), Tz::UTC);
    }

    #[test]
    fn wall_clock_round_trip() {
        let resolver = TimeZoneResolver::new();
        let zone = resolver.resolve("Europe/Berlin");
        // 10:00 Berlin wall clock in January is 09:00 UTC.
        let local = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let utc = resolver.to_utc(local, zone);
        assert_eq!(utc.to_rfc3339(), "2024-01-15T09:00:00+00:00");
        assert_eq!(resolver.to_local(utc, zone).naive_local(), local);
    }

    #[test]
    fn dst_gap_resolves_forward() {
        let resolver = TimeZoneResolver::new();
        let zone = resolver.resolve("Europe/Berlin");
        // 02:30 on the spring-forward night does not exist locally.
        let local = NaiveDate::from_ymd_opt(2024, 3, 31)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let utc = resolver.to_utc(local, zone);
        // Resolved instant lands inside the same night, not at UTC==local.
        assert_eq!(utc.to_rfc3339(), "2024-03-31T01:30:00+00:00");
    }
}
