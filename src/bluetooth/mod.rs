//! Bluetooth LE transport
//!
//! The connection state machine talks to the radio only through the two
//! traits below, so it can run against the real adapter
//! ([`bluest_adapter::BluestAdapter`]) or an in-memory double in tests.
//!
//! ```text
//! ControllerAdapter ── discover() ──► DiscoveredController
//!                   └─ connect()  ──► Box<dyn ControllerLink>
//!                                        ├─ subscribe()  ──► mpsc::Receiver<Vec<u8>>
//!                                        ├─ is_connected()
//!                                        ├─ unsubscribe()
//!                                        └─ disconnect()
//! ```

pub mod bluest_adapter;

use async_trait::async_trait;
use bluest::Uuid;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub use bluest_adapter::BluestAdapter;

/// GATT characteristic carrying the input reports
pub const INPUT_CHARACTERISTIC: Uuid = Uuid::from_u128(0x7492866c_ec3e_4619_8258_32755ffcc0f9);

/// Byte patterns in the manufacturer data that identify the controller
pub const MANUFACTURER_SIGNATURES: [[u8; 2]; 2] = [[0x7E, 0x05], [0x69, 0x20]];

/// Name used when the advertisement carries none
pub const DEFAULT_CONTROLLER_NAME: &str = "Switch 2 Pro Controller";

/// Buffer between the notification pump and the session lane
pub const NOTIFICATION_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    #[error("Scan failed: {0}")]
    ScanError(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Connection failed: {0}")]
    ConnectError(String),

    #[error("Input characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("Subscription failed: {0}")]
    SubscribeError(String),

    #[error("Disconnect failed: {0}")]
    DisconnectError(String),

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),
}

/// A device whose advertisement matched one of the signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredController {
    pub address: String,
    pub name: String,
}

/// True if `data` contains one of [`MANUFACTURER_SIGNATURES`] at any offset.
pub fn matches_signature(data: &[u8]) -> bool {
    data.windows(2)
        .any(|window| MANUFACTURER_SIGNATURES.iter().any(|sig| window == sig))
}

/// Discovery and connection
#[async_trait]
pub trait ControllerAdapter: Send + Sync {
    /// Scans for at most `timeout`. Returns the first matching device in scan
    /// order, or `None` if nothing matched in time.
    async fn discover(&self, timeout: Duration) -> Result<Option<DiscoveredController>, LinkError>;

    /// Opens a link to a previously discovered device.
    async fn connect(
        &self,
        controller: &DiscoveredController,
    ) -> Result<Box<dyn ControllerLink>, LinkError>;
}

/// One open connection to the controller
#[async_trait]
pub trait ControllerLink: Send + Sync {
    /// Starts notifications on [`INPUT_CHARACTERISTIC`]. Reports arrive on the
    /// returned queue in the order the radio delivered them; the queue closes
    /// when the notification stream ends.
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, LinkError>;

    async fn is_connected(&self) -> bool;

    async fn unsubscribe(&mut self) -> Result<(), LinkError>;

    async fn disconnect(&mut self) -> Result<(), LinkError>;
}
