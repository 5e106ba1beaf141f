//! Outbound schedule notifications: message text and the transport seam.

pub mod format;
pub mod transport;

pub use format::{format_feed_now, format_group, format_schedule, split_parts, strip_non_ascii};
#[cfg(test)]
pub use transport::RecordingTransport;
pub use transport::{ConsoleTransport, NotificationOutcome, NotificationTransport, dispatch};
