pub mod manual_clock;
pub mod mock_smtp;
pub mod mock_webhook;
pub mod test_data;

// Re-export commonly used items
pub use manual_clock::ManualClock;
pub use mock_smtp::RecordingSmtpSender;
pub use mock_webhook::MockWebhookServer;
pub use test_data::*;
