//! Operational counters for the hub

pub mod metrics;

pub use metrics::{HubMetrics, HubStats};
