//! Application-wide constants for timeouts, limits, and default values.
//!
//! Organized by subsystem so there is a single source of truth for every
//! magic number the engine relies on.

use std::time::Duration;

/// Probe pipeline constants
pub mod probe {
    use super::Duration;

    /// Hard cap on the combined DNS + TCP + HTTP work for one target
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(45);

    /// Timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Maximum number of redirect hops followed manually
    pub const MAX_REDIRECTS: usize = 12;

    /// Maximum number of body bytes sampled for heuristics
    pub const BODY_SAMPLE_LIMIT: usize = 512 * 1024;

    /// User agent sent on every probe request
    pub const USER_AGENT: &str = "WebsiteMonitor";

    /// Browser-ish accept header so login pages render their real markup
    pub const ACCEPT: &str =
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

    /// Encodings the body sampler can undo
    pub const ACCEPT_ENCODING: &str = "gzip, deflate, br";
}

/// Write-serialization gate constants
pub mod store {
    /// Total attempts for a write transaction hitting busy/locked errors
    pub const WRITE_RETRY_ATTEMPTS: u32 = 10;

    /// Quadratic backoff step in milliseconds (100 * attempt^2)
    pub const WRITE_BACKOFF_STEP_MS: u64 = 100;

    /// Backoff ceiling in milliseconds
    pub const WRITE_BACKOFF_CAP_MS: u64 = 5000;
}

/// Alert escalation defaults (overridable globally via settings, then per
/// instance via nullable columns)
pub mod alerts {
    /// Outage age before the first DOWN notification
    pub const DOWN_AFTER_SECONDS: i64 = 180;

    /// Up-time required before the RECOVERED notification
    pub const RECOVERED_AFTER_SECONDS: i64 = 60;

    /// Repeat cadence while the outage is younger than 24 hours
    pub const REPEAT_EVERY_SECONDS_UNDER_24H: i64 = 1800;

    /// Repeat cadence between 24 hours and the daily threshold
    pub const REPEAT_EVERY_SECONDS_24H_TO_72H: i64 = 3600;

    /// Outage age in hours after which repeats become once daily
    pub const DAILY_AFTER_HOURS: i64 = 72;

    /// Local wall-clock hour for the daily repeat
    pub const DAILY_HOUR_LOCAL: u32 = 10;

    /// Local wall-clock minute for the daily repeat
    pub const DAILY_MINUTE_LOCAL: u32 = 0;

    /// Evaluator tick cadence in seconds
    pub const SCHEDULER_TICK_SECONDS: u64 = 15;

    /// Webhook request timeout
    pub const WEBHOOK_TIMEOUT_SECONDS: u64 = 10;
}

/// Scheduler loop constants
pub mod runtime {
    use super::Duration;

    /// Delay before re-reading a missing or disabled instance row
    pub const MISSING_INSTANCE_RETRY_SECONDS: u64 = 30;

    /// How long `stop` waits for a worker task before giving up on it
    pub const STOP_WAIT: Duration = Duration::from_secs(5);
}

/// Protector (SMTP password at rest) constants
pub mod protector {
    /// Purpose string bound into every ciphertext as associated data
    pub const PURPOSE: &str = "ITWebsiteMonitor.SmtpPassword.v1";

    /// Key material file name under the data root
    pub const KEY_FILE: &str = "protector.key";
}

/// Instance validation limits
pub mod limits {
    /// Shortest allowed check interval in seconds
    pub const MIN_CHECK_INTERVAL_SECONDS: i64 = 5;

    /// Longest allowed instance id slug
    pub const MAX_INSTANCE_ID_LEN: usize = 64;
}
