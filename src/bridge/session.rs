//! Connection State Machine
//!
//! One run of the machine is one session with the controller:
//!
//! ```text
//! Idle ──► Searching ──► Connecting ──► Connected ──► Disconnecting ──► Idle
//!              │              │
//!              └──────────────┴──► Idle (not found / connect failed / stopped)
//! ```
//!
//! States are statum typed states, every transition consumes the machine.
//! Leaving `Connected` always releases every held key before the link is
//! torn down, whatever the reason.

use crate::bluetooth::{ControllerAdapter, ControllerLink, DiscoveredController};
use crate::bridge::status::{SessionOutcome, StatusPublisher};
use crate::config::BridgeSettings;
use crate::controller::report::decode;
use crate::mapping::KeyStateTracker;
use statum::{machine, state};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Idle,
    Searching,
    Connecting(DiscoveredController),
    Connected(DiscoveredController),
    Disconnecting(SessionOutcome),
}

#[machine]
pub struct ConnectionMachine<S: SessionState> {
    adapter: Arc<dyn ControllerAdapter>,
    settings: BridgeSettings,
    status: StatusPublisher,
    cancel: CancellationToken,
    link: Option<Box<dyn ControllerLink>>,
}

/// Result of the search phase
pub enum Discovery {
    Found(ConnectionMachine<Connecting>),
    Finished(SessionEnd),
}

/// Result of the connect phase
pub enum Connection {
    Established(ConnectionMachine<Connected>),
    Failed(SessionEnd),
}

/// The machine back in `Idle` together with the reason it got there
pub struct SessionEnd {
    pub machine: ConnectionMachine<Idle>,
    pub outcome: SessionOutcome,
}

impl ConnectionMachine<Idle> {
    pub fn create(
        adapter: Arc<dyn ControllerAdapter>,
        settings: BridgeSettings,
        status: StatusPublisher,
        cancel: CancellationToken,
    ) -> Self {
        debug!("Creating connection machine with settings: {:?}", settings);
        Self::new(adapter, settings, status, cancel, None)
    }

    pub fn search(self) -> ConnectionMachine<Searching> {
        info!("Searching for controller");
        self.status.searching();
        self.transition()
    }
}

impl ConnectionMachine<Searching> {
    /// Runs one bounded scan. The first matching device wins.
    pub async fn discover(self) -> Discovery {
        let timeout = self.settings.scan_timeout();

        match self.adapter.discover(timeout).await {
            Ok(Some(controller)) => {
                if self.cancel.is_cancelled() {
                    info!("Stop requested during scan, not connecting");
                    return Discovery::Finished(self.finish(SessionOutcome::Stopped));
                }
                info!("Matched controller '{}' ({})", controller.name, controller.address);
                Discovery::Found(self.transition_with(controller))
            }
            Ok(None) => {
                info!("No controller found within {} ms", timeout.as_millis());
                Discovery::Finished(self.finish(SessionOutcome::NotFound))
            }
            Err(e) => {
                error!("Scan failed: {}", e);
                Discovery::Finished(self.finish(SessionOutcome::LinkError))
            }
        }
    }

    fn finish(self, outcome: SessionOutcome) -> SessionEnd {
        self.status.idle(outcome);
        SessionEnd {
            machine: self.transition(),
            outcome,
        }
    }
}

impl ConnectionMachine<Connecting> {
    /// Opens the link within the connect timeout. A running attempt is not
    /// interrupted by a stop request.
    pub async fn connect(mut self) -> Connection {
        let Some(controller) = self.get_state_data().cloned() else {
            error!("Connecting without a discovered controller");
            return Connection::Failed(self.finish(SessionOutcome::ConnectFailed));
        };

        let timeout = self.settings.connect_timeout();
        info!("Connecting to {} (timeout {} ms)", controller.address, timeout.as_millis());

        let mut link = match tokio::time::timeout(timeout, self.adapter.connect(&controller)).await
        {
            Ok(Ok(link)) => link,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", controller.address, e);
                return Connection::Failed(self.finish(SessionOutcome::ConnectFailed));
            }
            Err(_) => {
                warn!("Connection to {} timed out", controller.address);
                return Connection::Failed(self.finish(SessionOutcome::ConnectFailed));
            }
        };

        if !link.is_connected().await {
            warn!("Link to {} dropped right after connecting", controller.address);
            if let Err(e) = link.disconnect().await {
                debug!("Ignoring disconnect error: {}", e);
            }
            return Connection::Failed(self.finish(SessionOutcome::ConnectFailed));
        }

        info!("Connected to '{}'", controller.name);
        self.status.connected(&controller.name);
        self.link = Some(link);
        Connection::Established(self.transition_with(controller))
    }

    fn finish(self, outcome: SessionOutcome) -> SessionEnd {
        self.status.idle(outcome);
        SessionEnd {
            machine: self.transition(),
            outcome,
        }
    }
}

impl ConnectionMachine<Connected> {
    /// Feeds reports into `tracker` until the peer disconnects, the stream
    /// fails or a stop is requested, then releases all held keys.
    pub async fn run(mut self, tracker: &mut KeyStateTracker) -> ConnectionMachine<Disconnecting> {
        let outcome = self.pump_reports(tracker).await;

        let released = tracker.release_all();
        info!(
            "Session ended ({}), released {} keys",
            outcome, released
        );

        self.transition_with(outcome)
    }

    async fn pump_reports(&mut self, tracker: &mut KeyStateTracker) -> SessionOutcome {
        let Some(link) = self.link.as_mut() else {
            error!("Connected state without a link");
            return SessionOutcome::LinkError;
        };

        if self.cancel.is_cancelled() {
            info!("Stop requested before subscribing");
            return SessionOutcome::Stopped;
        }

        let mut reports = match link.subscribe().await {
            Ok(reports) => reports,
            Err(e) => {
                error!("Failed to subscribe to input reports: {}", e);
                return SessionOutcome::LinkError;
            }
        };
        info!("Subscribed to input reports");

        let mut keep_alive = tokio::time::interval(self.settings.keep_alive_interval());
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                report = reports.recv() => match report {
                    Some(report) => handle_report(&self.status, tracker, &report),
                    None => {
                        warn!("Notification stream closed");
                        break SessionOutcome::LinkError;
                    }
                },

                _ = keep_alive.tick() => {
                    if self.cancel.is_cancelled() {
                        info!("Stop requested");
                        break SessionOutcome::Stopped;
                    }
                    if !link.is_connected().await {
                        info!("Controller disconnected");
                        break SessionOutcome::Disconnected;
                    }
                }
            }
        }
    }
}

fn handle_report(status: &StatusPublisher, tracker: &mut KeyStateTracker, report: &[u8]) {
    let Some(snapshot) = decode(report) else {
        return;
    };
    status.report_received();

    let emitted = tracker.apply(&snapshot);
    if emitted > 0 {
        debug!(
            "Report applied: {} key events, axes {:?}",
            emitted, snapshot.raw_axes
        );
    }
}

impl ConnectionMachine<Disconnecting> {
    /// Best-effort unsubscribe and disconnect. Errors are logged and
    /// ignored; this always ends in `Idle`.
    pub async fn teardown(mut self) -> SessionEnd {
        let outcome = self
            .get_state_data()
            .copied()
            .unwrap_or(SessionOutcome::Disconnected);

        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.unsubscribe().await {
                warn!("Unsubscribe failed: {}", e);
            }

            if link.is_connected().await {
                match tokio::time::timeout(self.settings.connect_timeout(), link.disconnect()).await
                {
                    Ok(Ok(())) => debug!("Disconnected"),
                    Ok(Err(e)) => warn!("Disconnect failed: {}", e),
                    Err(_) => warn!("Disconnect timed out"),
                }
            }
        }

        self.status.idle(outcome);
        info!("Back to idle: {}", outcome);
        SessionEnd {
            machine: self.transition(),
            outcome,
        }
    }
}

/// Drives one full session from `Idle` back to `Idle`.
pub async fn run_session(
    machine: ConnectionMachine<Idle>,
    tracker: &mut KeyStateTracker,
) -> SessionEnd {
    let connecting = match machine.search().discover().await {
        Discovery::Found(connecting) => connecting,
        Discovery::Finished(end) => return end,
    };

    let connected = match connecting.connect().await {
        Connection::Established(connected) => connected,
        Connection::Failed(end) => return end,
    };

    connected.run(tracker).await.teardown().await
}
