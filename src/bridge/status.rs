//! Bridge Status projection
//!
//! The session lane is the only writer; any number of readers poll the
//! latest value through a `watch` channel without holding a lock.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Coarse connection state shown to the presentation layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum BridgeState {
    #[default]
    Idle,
    Searching,
    Connected,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Idle => write!(f, "Idle"),
            BridgeState::Searching => write!(f, "Searching"),
            BridgeState::Connected => write!(f, "Connected"),
        }
    }
}

/// How the last session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionOutcome {
    /// No matching controller within the scan timeout
    NotFound,
    /// Connect timed out or was refused
    ConnectFailed,
    /// The controller went away
    Disconnected,
    /// `stop()` was requested
    Stopped,
    /// Scan, subscription or notification stream failed
    LinkError,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::NotFound => write!(f, "controller not found"),
            SessionOutcome::ConnectFailed => write!(f, "connection failed"),
            SessionOutcome::Disconnected => write!(f, "controller disconnected"),
            SessionOutcome::Stopped => write!(f, "stopped"),
            SessionOutcome::LinkError => write!(f, "link error"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub controller_name: Option<String>,
    /// Reports of valid length received in the current session
    pub reports_received: u64,
    pub connected_since: Option<DateTime<Local>>,
    pub last_report_at: Option<DateTime<Local>>,
    pub last_outcome: Option<SessionOutcome>,
}

/// Write side of the status projection, held by the session lane
#[derive(Clone, Debug)]
pub struct StatusPublisher {
    sender: Arc<watch::Sender<BridgeStatus>>,
}

impl StatusPublisher {
    pub fn new() -> (Self, watch::Receiver<BridgeStatus>) {
        let (sender, receiver) = watch::channel(BridgeStatus::default());
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.sender.subscribe()
    }

    #[cfg(test)]
    pub fn current(&self) -> BridgeStatus {
        self.sender.borrow().clone()
    }

    /// New session started scanning; per-session fields are reset.
    pub fn searching(&self) {
        self.sender.send_modify(|status| {
            status.state = BridgeState::Searching;
            status.controller_name = None;
            status.reports_received = 0;
            status.connected_since = None;
            status.last_report_at = None;
        });
    }

    pub fn connected(&self, name: &str) {
        self.sender.send_modify(|status| {
            status.state = BridgeState::Connected;
            status.controller_name = Some(name.to_string());
            status.connected_since = Some(Local::now());
        });
    }

    pub fn report_received(&self) {
        self.sender.send_modify(|status| {
            status.reports_received += 1;
            status.last_report_at = Some(Local::now());
        });
    }

    /// Back to idle. The report counter is kept so the last session can
    /// still be inspected.
    pub fn idle(&self, outcome: SessionOutcome) {
        self.sender.send_modify(|status| {
            status.state = BridgeState::Idle;
            status.controller_name = None;
            status.connected_since = None;
            status.last_outcome = Some(outcome);
        });
    }
}
