//! Intake Infrastructure Library
//!
//! Shared infrastructure for the intake service:
//! - Telemetry initialization
//! - Notification topic with fan-out delivery
//! - Subscribers (log, webhook, email)

pub mod notify;
pub mod telemetry;

// Re-export commonly used types
pub use notify::{LogSubscriber, Subscriber, Topic, TopicMessage};
#[cfg(feature = "email")]
pub use notify::EmailSubscriber;
#[cfg(feature = "webhook")]
pub use notify::WebhookSubscriber;
pub use telemetry::{init_telemetry, shutdown_telemetry};
