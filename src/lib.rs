pub mod alerting;
pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod notify;
pub mod probe;
pub mod protector;
pub mod runtime;
pub mod timezone;
pub mod web;

// Re-export commonly used types
pub use alerting::{AlertEvaluator, AlertPolicy};
pub use clock::{Clock, SystemClock};
pub use config::{AlertingSettings, Settings};
pub use database::Database;
pub use notify::{Dispatcher, HttpWebhookSender, LettreSmtpSender};
pub use probe::ProbeEngine;
pub use protector::Protector;
pub use runtime::RuntimeManager;
pub use timezone::TimeZoneResolver;
