//! Outbound delivery of formatted messages.

use std::fmt;
use std::io::Write;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{info, warn};

use super::format::split_parts;

/// Delivers text to a destination such as a phone number.
///
/// Implementations must deliver the parts of a multipart message in order.
pub trait NotificationTransport: Send + Sync {
    fn check_send_permission(&self) -> bool;
    fn send_text(&self, destination: &str, body: &str) -> anyhow::Result<()>;
    fn send_multipart(&self, destination: &str, parts: &[String]) -> anyhow::Result<()>;
}

/// What happened to the notification that follows a schedule change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent { parts: usize },
    /// The fish has no phone number; nothing was sent.
    NoDestination,
    PermissionDenied,
    Failed(String),
}

impl NotificationOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, NotificationOutcome::Sent { .. })
    }
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationOutcome::Sent { parts: 1 } => write!(f, "sent"),
            NotificationOutcome::Sent { parts } => write!(f, "sent in {parts} parts"),
            NotificationOutcome::NoDestination => write!(f, "not sent: no phone number"),
            NotificationOutcome::PermissionDenied => write!(f, "not sent: permission denied"),
            NotificationOutcome::Failed(reason) => write!(f, "send failed: {reason}"),
        }
    }
}

/// Send `body` to `destination`, splitting it when it does not fit in one
/// message. Never fails; the outcome says what happened.
pub fn dispatch(
    transport: &dyn NotificationTransport,
    destination: Option<&str>,
    body: &str,
) -> NotificationOutcome {
    let Some(destination) = destination else {
        return NotificationOutcome::NoDestination;
    };
    if !transport.check_send_permission() {
        warn!(destination, "send permission denied");
        return NotificationOutcome::PermissionDenied;
    }

    let parts = split_parts(body);
    let sent = if parts.len() == 1 {
        transport.send_text(destination, body)
    } else {
        transport.send_multipart(destination, &parts)
    };
    match sent {
        Ok(()) => {
            info!(destination, parts = parts.len(), "notification sent");
            NotificationOutcome::Sent { parts: parts.len() }
        }
        Err(err) => {
            warn!(destination, "notification failed: {err:#}");
            NotificationOutcome::Failed(format!("{err:#}"))
        }
    }
}

/// Writes every outgoing part to a stream instead of a radio.
pub struct ConsoleTransport<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
    enabled: bool,
}

impl ConsoleTransport {
    pub fn stdout(enabled: bool) -> Self {
        Self::new(std::io::stdout(), enabled)
    }
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub fn new(out: W, enabled: bool) -> Self {
        Self {
            out: Mutex::new(out),
            enabled,
        }
    }

    fn write_part(&self, destination: &str, label: &str, body: &str) -> anyhow::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("console transport lock poisoned"))?;
        writeln!(out, "--- to {destination} {label}---")
            .and_then(|()| out.write_all(body.as_bytes()))
            .and_then(|()| out.flush())
            .context("writing message to console")
    }
}

impl<W: Write + Send> NotificationTransport for ConsoleTransport<W> {
    fn check_send_permission(&self) -> bool {
        self.enabled
    }

    fn send_text(&self, destination: &str, body: &str) -> anyhow::Result<()> {
        self.write_part(destination, "", body)
    }

    fn send_multipart(&self, destination: &str, parts: &[String]) -> anyhow::Result<()> {
        for (i, part) in parts.iter().enumerate() {
            self.write_part(destination, &format!("({}/{}) ", i + 1, parts.len()), part)?;
        }
        Ok(())
    }
}

/// Transport that records what it was asked to send.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTransport {
    pub denied: bool,
    pub fail_with: Option<String>,
    pub sent: Mutex<Vec<(String, Vec<String>)>>,
}

#[cfg(test)]
impl RecordingTransport {
    pub fn messages(&self) -> Vec<(String, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl NotificationTransport for RecordingTransport {
    fn check_send_permission(&self) -> bool {
        !self.denied
    }

    fn send_text(&self, destination: &str, body: &str) -> anyhow::Result<()> {
        self.send_multipart(destination, &[body.to_owned()])
    }

    fn send_multipart(&self, destination: &str, parts: &[String]) -> anyhow::Result<()> {
        if let Some(reason) = &self.fail_with {
            anyhow::bail!("{reason}");
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_owned(), parts.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_goes_out_whole() {
        let transport = RecordingTransport::default();
        let outcome = dispatch(&transport, Some("+63900"), "hello\n");
        assert_eq!(outcome, NotificationOutcome::Sent { parts: 1 });
        assert_eq!(
            transport.messages(),
            [("+63900".to_owned(), vec!["hello\n".to_owned()])]
        );
    }

    #[test]
    fn long_body_goes_out_in_order() {
        let transport = RecordingTransport::default();
        let body: String = (0..30).map(|i| format!("line {i:02}\n")).collect();
        let outcome = dispatch(&transport, Some("+63900"), &body);
        let sent = transport.messages();
        assert_eq!(outcome, NotificationOutcome::Sent { parts: sent[0].1.len() });
        assert!(sent[0].1.len() > 1);
        assert_eq!(sent[0].1.concat(), body);
    }

    #[test]
    fn missing_destination_and_denied_permission() {
        let transport = RecordingTransport::default();
        assert_eq!(dispatch(&transport, None, "x"), NotificationOutcome::NoDestination);

        let denied = RecordingTransport {
            denied: true,
            ..RecordingTransport::default()
        };
        assert_eq!(
            dispatch(&denied, Some("1"), "x"),
            NotificationOutcome::PermissionDenied
        );
        assert!(denied.messages().is_empty());
    }

    #[test]
    fn transport_failure_is_reported() {
        let transport = RecordingTransport {
            fail_with: Some("no signal".to_owned()),
            ..RecordingTransport::default()
        };
        match dispatch(&transport, Some("1"), "x") {
            NotificationOutcome::Failed(reason) => assert!(reason.contains("no signal")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn console_transport_labels_parts() {
        let console = ConsoleTransport::new(Vec::new(), true);
        console
            .send_multipart("555", &["a\n".to_owned(), "b\n".to_owned()])
            .unwrap();
        let written = String::from_utf8(console.out.into_inner().unwrap()).unwrap();
        assert_eq!(written, "--- to 555 (1/2) ---\na\n--- to 555 (2/2) ---\nb\n");
    }

    #[test]
    fn disabled_console_denies_permission() {
        assert!(!ConsoleTransport::new(Vec::new(), false).check_send_permission());
    }
}
