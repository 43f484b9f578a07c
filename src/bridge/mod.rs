//! Connection lifecycle and the public bridge facade
//!
//! ```text
//!            start()
//!   Idle ─────────────► Searching ──► Connecting ──► Connected ──► Disconnecting
//!    ▲                     │              │              │               │
//!    └─────────────────────┴──────────────┴──────────────┘◄──────────────┘
//!                                            release_all() on every exit
//! ```
//!
//! [`session`] holds the typed state machine, [`status`] the projection the
//! front-end polls, and [`handle`] ties both to a tokio task.

pub mod handle;
pub mod session;
pub mod status;

#[cfg(test)]
pub mod testing;

pub use handle::BridgeHandle;
pub use session::{run_session, ConnectionMachine, SessionEnd};
pub use status::{BridgeState, BridgeStatus, SessionOutcome, StatusPublisher};
