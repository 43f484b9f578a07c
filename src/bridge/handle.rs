//! Öffentliches Interface für die Bridge
//!
//! [`BridgeHandle`] is what the front-end talks to. `start()` spawns one
//! session on its own tokio task and returns immediately; the caller
//! follows progress through the status projection.
//!
//! ```text
//! caller lane                    session lane (tokio task)
//! ───────────                    ─────────────────────────
//! start() ──spawn──────────────► run_session(machine, tracker)
//! stop()  ──CancellationToken──►   checked every keep-alive tick
//! status()◄──watch::Receiver────   StatusPublisher (single writer)
//! ```

use crate::bluetooth::ControllerAdapter;
use crate::bridge::session::{run_session, ConnectionMachine, Idle};
use crate::bridge::status::{BridgeState, BridgeStatus, SessionOutcome, StatusPublisher};
use crate::config::BridgeSettings;
use crate::mapping::{KeyStateTracker, VirtualKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct BridgeHandle {
    adapter: Arc<dyn ControllerAdapter>,
    settings: BridgeSettings,

    /// Exklusiv für die laufende Session gesperrt
    tracker: Arc<AsyncMutex<KeyStateTracker>>,

    status: StatusPublisher,
    status_receiver: watch::Receiver<BridgeStatus>,

    running: Arc<AtomicBool>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<SessionOutcome>>>,
}

// Resets the running flag even if the session task panics
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BridgeHandle {
    pub fn new(
        adapter: Arc<dyn ControllerAdapter>,
        settings: BridgeSettings,
        tracker: KeyStateTracker,
    ) -> Self {
        let (status, status_receiver) = StatusPublisher::new();
        Self {
            adapter,
            settings,
            tracker: Arc::new(AsyncMutex::new(tracker)),
            status,
            status_receiver,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Starts a session unless one is already running. Never blocks.
    pub fn start(&self) -> bool {
        self.start_with_callback(|_| {})
    }

    /// Like [`start`](Self::start); `on_finished` runs on the session lane
    /// once the machine is back in `Idle`.
    pub fn start_with_callback<F>(&self, on_finished: F) -> bool
    where
        F: FnOnce(SessionOutcome) + Send + 'static,
    {
        // running und Token ändern sich nur gemeinsam unter diesem Lock
        let mut cancel_slot = lock(&self.cancel);
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Session already running, ignoring start");
            return false;
        }

        let cancel = CancellationToken::new();
        *cancel_slot = Some(cancel.clone());
        let machine = ConnectionMachine::<Idle>::create(
            self.adapter.clone(),
            self.settings.clone(),
            self.status.clone(),
            cancel,
        );
        let tracker = self.tracker.clone();
        let guard = RunningGuard(self.running.clone());

        let task = tokio::spawn(async move {
            let mut tracker = tracker.lock_owned().await;
            let end = run_session(machine, &mut tracker).await;
            drop(tracker);

            // Erst freigeben, damit der Callback neu starten kann
            drop(guard);
            on_finished(end.outcome);
            end.outcome
        });

        *lock(&self.task) = Some(task);
        drop(cancel_slot);
        info!("Bridge session started");
        true
    }

    /// Requests the running session to stop. Harmless while idle.
    pub fn stop(&self) {
        let cancel_slot = lock(&self.cancel);
        if !self.is_running() {
            debug!("No session running, nothing to stop");
            return;
        }
        if let Some(cancel) = cancel_slot.as_ref() {
            info!("Stopping bridge session");
            cancel.cancel();
        }
    }

    /// Waits for the current session to end and returns how it ended.
    /// `None` if no session was started since the last call.
    pub async fn wait_finished(&self) -> Option<SessionOutcome> {
        let task = lock(&self.task).take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!("Session task failed: {}", e);
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.status_receiver.clone()
    }

    pub fn status(&self) -> BridgeStatus {
        self.status_receiver.borrow().clone()
    }

    pub fn state(&self) -> BridgeState {
        self.status_receiver.borrow().state
    }

    pub fn controller_name(&self) -> Option<String> {
        self.status_receiver.borrow().controller_name.clone()
    }

    pub fn reports_received(&self) -> u64 {
        self.status_receiver.borrow().reports_received
    }

    /// Held keys, or `None` while a session owns the tracker.
    pub fn held_keys(&self) -> Option<Vec<VirtualKey>> {
        let tracker = self.tracker.try_lock().ok()?;
        Some(tracker.held().iter().copied().collect())
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.cancel).as_ref() {
            cancel.cancel();
        }
    }
}
