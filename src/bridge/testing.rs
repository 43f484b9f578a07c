//! In-memory transport doubles for the session and facade tests

use crate::bluetooth::{ControllerAdapter, ControllerLink, DiscoveredController, LinkError};
use crate::config::{BridgeSettings, KeyboardBackend};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// 11-byte report with no buttons and both sticks centered
pub fn neutral_report() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x80, 0x00, 0x08, 0x80]
}

#[derive(Clone, Copy, Debug)]
enum ConnectBehaviour {
    Accept,
    Refuse,
    Delay(Duration),
}

/// How the fake link reacts to unsubscribe and disconnect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownBehaviour {
    Clean,
    /// Both calls return an error
    Failing,
    /// Disconnect never completes
    Hanging,
}

/// Shared view into what the fake link saw, plus the report feed
#[derive(Clone)]
pub struct LinkProbe {
    pub connected: Arc<AtomicBool>,
    pub unsubscribed: Arc<AtomicBool>,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    reports: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
}

impl LinkProbe {
    fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            unsubscribed: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            reports: Arc::new(Mutex::new(None)),
        }
    }

    /// Queues a notification. Reports sent before subscribing are buffered.
    pub async fn send(&self, report: Vec<u8>) {
        let sender = self.reports.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(report).await;
        }
    }

    /// Ends the notification stream as a failing transport would.
    pub async fn close_reports(&self) {
        self.reports.lock().unwrap().take();
    }
}

pub struct FakeAdapter {
    controller: Option<DiscoveredController>,
    behaviour: ConnectBehaviour,
    fail_subscribe: bool,
    fail_scan: bool,
    teardown: TeardownBehaviour,
    scan_delay: Duration,
    pending: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    probe: LinkProbe,
}

impl FakeAdapter {
    /// Fast timings so tests finish quickly
    pub fn settings() -> BridgeSettings {
        BridgeSettings {
            scan_timeout_ms: 50,
            connect_timeout_ms: 100,
            keep_alive_interval_ms: 10,
            keyboard_backend: KeyboardBackend::Log,
        }
    }

    fn build(controller: Option<DiscoveredController>, behaviour: ConnectBehaviour) -> Self {
        let probe = LinkProbe::new();
        let (sender, receiver) = mpsc::channel(64);
        *probe.reports.lock().unwrap() = Some(sender);
        Self {
            controller,
            behaviour,
            fail_subscribe: false,
            fail_scan: false,
            teardown: TeardownBehaviour::Clean,
            scan_delay: Duration::ZERO,
            pending: Mutex::new(Some(receiver)),
            probe,
        }
    }

    fn controller() -> DiscoveredController {
        DiscoveredController {
            address: "98:B6:E9:00:00:01".to_string(),
            name: "Pro Controller".to_string(),
        }
    }

    /// Nothing advertises
    pub fn empty() -> Self {
        Self::build(None, ConnectBehaviour::Accept)
    }

    pub fn connectable() -> (Self, LinkProbe) {
        let adapter = Self::build(Some(Self::controller()), ConnectBehaviour::Accept);
        let probe = adapter.probe.clone();
        (adapter, probe)
    }

    pub fn refusing() -> (Self, LinkProbe) {
        let adapter = Self::build(Some(Self::controller()), ConnectBehaviour::Refuse);
        let probe = adapter.probe.clone();
        (adapter, probe)
    }

    pub fn slow(delay: Duration) -> (Self, LinkProbe) {
        let adapter = Self::build(Some(Self::controller()), ConnectBehaviour::Delay(delay));
        let probe = adapter.probe.clone();
        (adapter, probe)
    }

    pub fn failing_subscribe() -> (Self, LinkProbe) {
        let mut adapter = Self::build(Some(Self::controller()), ConnectBehaviour::Accept);
        adapter.fail_subscribe = true;
        let probe = adapter.probe.clone();
        (adapter, probe)
    }

    /// The radio reports an error instead of scan results
    pub fn failing_scan() -> Self {
        let mut adapter = Self::build(None, ConnectBehaviour::Accept);
        adapter.fail_scan = true;
        adapter
    }

    pub fn with_teardown(mut self, teardown: TeardownBehaviour) -> Self {
        self.teardown = teardown;
        self
    }

    /// Makes every scan take `delay` before reporting its result.
    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = delay;
        self
    }

    fn take_reports(&self) -> mpsc::Receiver<Vec<u8>> {
        if let Some(receiver) = self.pending.lock().unwrap().take() {
            return receiver;
        }
        // Later sessions get a fresh feed
        let (sender, receiver) = mpsc::channel(64);
        *self.probe.reports.lock().unwrap() = Some(sender);
        receiver
    }
}

#[async_trait]
impl ControllerAdapter for FakeAdapter {
    async fn discover(&self, _timeout: Duration) -> Result<Option<DiscoveredController>, LinkError> {
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        if self.fail_scan {
            return Err(LinkError::ScanError("adapter powered off".to_string()));
        }
        Ok(self.controller.clone())
    }

    async fn connect(
        &self,
        controller: &DiscoveredController,
    ) -> Result<Box<dyn ControllerLink>, LinkError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            ConnectBehaviour::Refuse => {
                return Err(LinkError::ConnectError(format!(
                    "{} refused the connection",
                    controller.address
                )))
            }
            ConnectBehaviour::Delay(delay) => tokio::time::sleep(delay).await,
            ConnectBehaviour::Accept => {}
        }

        Ok(Box::new(FakeLink {
            reports: Some(self.take_reports()),
            fail_subscribe: self.fail_subscribe,
            teardown: self.teardown,
            probe: self.probe.clone(),
        }))
    }
}

struct FakeLink {
    reports: Option<mpsc::Receiver<Vec<u8>>>,
    fail_subscribe: bool,
    teardown: TeardownBehaviour,
    probe: LinkProbe,
}

#[async_trait]
impl ControllerLink for FakeLink {
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, LinkError> {
        if self.fail_subscribe {
            return Err(LinkError::SubscribeError("notify not permitted".to_string()));
        }
        self.reports
            .take()
            .ok_or_else(|| LinkError::SubscribeError("already subscribed".to_string()))
    }

    async fn is_connected(&self) -> bool {
        self.probe.connected.load(Ordering::SeqCst)
    }

    async fn unsubscribe(&mut self) -> Result<(), LinkError> {
        self.probe.unsubscribed.store(true, Ordering::SeqCst);
        if self.teardown == TeardownBehaviour::Failing {
            return Err(LinkError::DisconnectError("unsubscribe rejected".to_string()));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.probe.disconnects.fetch_add(1, Ordering::SeqCst);
        match self.teardown {
            TeardownBehaviour::Clean => {
                self.probe.connected.store(false, Ordering::SeqCst);
                Ok(())
            }
            TeardownBehaviour::Failing => {
                Err(LinkError::DisconnectError("peer not responding".to_string()))
            }
            TeardownBehaviour::Hanging => std::future::pending().await,
        }
    }
}
