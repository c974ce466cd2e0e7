//! Live telemetry fan-out
//!
//! `telemetry-hub` distributes one live stream of telemetry samples to any
//! number of subscribers. Samples come from a synthetic generator or from the
//! stdout of an external process; the [`StreamCoordinator`] keeps exactly one
//! of them running and falls back to the generator whenever the external
//! process is missing, fails to start or exits.
//!
//! Slow subscribers never stall the stream: each subscriber has a bounded
//! queue that drops its oldest sample when full.
//!
//! # Example
//!
//! ```no_run
//! use telemetry_hub::{ExternalCommand, StreamConfig, StreamCoordinator};
//!
//! # async fn example() -> telemetry_hub::Result<()> {
//! let coordinator = StreamCoordinator::new(StreamConfig::default());
//! let subscription = coordinator.subscribe();
//! coordinator.ensure_default_running().await;
//!
//! let robot = ExternalCommand::new("python3")
//!     .arg("robot_bridge.py")
//!     .current_dir("/opt/robot");
//! coordinator.start_external(&robot).await?;
//!
//! while let Some(sample) = subscription.recv().await {
//!     println!("{}", sample.to_json());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod hub;
pub mod producer;
pub mod sample;
pub mod stats;

pub use config::{StreamConfig, SyntheticConfig};
pub use coordinator::{ProducerState, StreamCoordinator};
pub use error::{HubError, RecordError, Result};
pub use hub::{Subscription, TelemetryHub};
pub use producer::ExternalCommand;
pub use sample::{Reading, RecordPolicy, Sample};
pub use stats::HubStats;
