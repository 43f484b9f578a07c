pub mod bluetooth;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod mapping;

use crate::bluetooth::BluestAdapter;
use crate::bridge::{BridgeHandle, BridgeState};
use crate::config::BridgeSettings;
use crate::mapping::{open_sink, KeyStateTracker, KeyboardConfig};
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let settings = BridgeSettings::load()?;
    info!("Using settings: {:?}", settings);

    // Tastaturbelegung prüfen und ausgeben
    let keyboard = KeyboardConfig::default_config();
    keyboard
        .validate()
        .map_err(|e| eyre!("Invalid keyboard layout: {}", e))?;
    keyboard.log_layout();

    let sink = open_sink(settings.keyboard_backend, &keyboard);
    let tracker = KeyStateTracker::new(keyboard, sink);

    let adapter = BluestAdapter::open()
        .await
        .map_err(|e| eyre!("Failed to open Bluetooth adapter: {}", e))?;

    let bridge = BridgeHandle::new(Arc::new(adapter), settings, tracker);
    let mut status = bridge.subscribe();

    bridge.start_with_callback(|outcome| info!("Session finished: {}", outcome));

    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);
    let mut last_state = BridgeState::Idle;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                bridge.stop();
                break;
            }

            changed = status.changed() => {
                if changed.is_err() {
                    warn!("Status channel closed");
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.state != last_state {
                    match bridge.controller_name() {
                        Some(name) => info!("Status: {} ({})", current.state, name),
                        None => info!("Status: {}", current.state),
                    }
                    last_state = current.state;
                }
                // Session ist beendet
                if current.state == BridgeState::Idle && current.last_outcome.is_some() {
                    break;
                }
            }

            _ = poll.tick() => {
                if bridge.state() == BridgeState::Connected {
                    info!("Packets: {}", bridge.reports_received());
                }
            }
        }
    }

    if let Some(outcome) = bridge.wait_finished().await {
        info!("Bridge stopped: {}", outcome);
    }
    debug!("Final status: {:?}", bridge.status());
    if let Some(held) = bridge.held_keys().filter(|keys| !keys.is_empty()) {
        warn!("Keys still held after shutdown: {:?}", held);
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
