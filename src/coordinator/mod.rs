//! Producer lifecycle coordination
//!
//! The coordinator decides which producer feeds the hub. It guarantees that at
//! most one of the synthetic generator and an external process is
//! broadcasting, and that once the stream has been requested there is always
//! one of them running: an external process that exits, crashes or is stopped
//! hands the stream back to the generator.
//!
//! # Transitions
//!
//! ```text
//!   caller ──► StreamCoordinator ──lock──► ProducerSlot
//!                                            │
//!                     ┌──────────────────────┴──────────────────────┐
//!                     ▼                                             ▼
//!            SyntheticGenerator                           ProcessSupervisor
//!            (ProducerTask)                               (ExternalProducer)
//!                     │                                             │
//!                     └──────────► TelemetryHub::broadcast ◄────────┘
//!                                                                   │
//!                      process exit ──► on_external_exit(epoch) ◄───┘
//! ```
//!
//! Exit notifications carry the epoch of the process that ended. A
//! notification for anything but the current epoch is ignored, which makes
//! the fallback run exactly once even when an explicit stop races a natural
//! exit.

pub mod core;
pub mod state;

pub use self::core::StreamCoordinator;
pub use self::state::ProducerState;
