//! Stream configuration

use std::time::Duration;

use crate::sample::RecordPolicy;

/// Default per-subscriber queue capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default number of telemetry channels per reading
pub const DEFAULT_CHANNELS: usize = 6;

/// Default grace period before an external process is killed
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Shortest tick period the synthetic generator accepts
pub const MIN_SYNTHETIC_PERIOD: Duration = Duration::from_millis(1);

/// Synthetic generator parameters
///
/// Channel `i` at time `t` is `baseline + amplitude * sin(frequency * t + i)`,
/// clamped to zero and rounded to `precision` decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Time between samples
    pub period: Duration,

    /// Value every channel oscillates around
    pub baseline: f64,

    /// Peak deviation from the baseline
    pub amplitude: f64,

    /// Angular frequency in radians per second
    pub frequency: f64,

    /// Decimal places kept after rounding
    pub precision: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            baseline: 100.0,
            amplitude: 40.0,
            frequency: 0.6,
            precision: 2,
        }
    }
}

impl SyntheticConfig {
    /// Set the tick period
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period.max(MIN_SYNTHETIC_PERIOD);
        self
    }

    /// Set the waveform baseline and amplitude
    pub fn waveform(mut self, baseline: f64, amplitude: f64) -> Self {
        self.baseline = baseline;
        self.amplitude = amplitude;
        self
    }

    /// Set the angular frequency
    pub fn frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set rounding precision
    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }
}

/// Stream configuration options
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Capacity of each subscriber queue
    pub channel_capacity: usize,

    /// Channels per reading, for both the generator and record decoding
    pub channels: usize,

    /// How long a terminated process may take before it is killed
    pub stop_timeout: Duration,

    /// How external output that is not a well-shaped reading is treated
    pub record_policy: RecordPolicy,

    /// Synthetic generator parameters
    pub synthetic: SyntheticConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            channels: DEFAULT_CHANNELS,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            record_policy: RecordPolicy::Permissive,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Set subscriber queue capacity (at least 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Set channels per reading (at least 1)
    pub fn channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Set the graceful termination timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Only forward external records that match the reading shape
    pub fn strict_records(mut self) -> Self {
        self.record_policy = RecordPolicy::Strict;
        self
    }

    /// Set the record policy
    pub fn record_policy(mut self, policy: RecordPolicy) -> Self {
        self.record_policy = policy;
        self
    }

    /// Set the synthetic tick period
    pub fn synthetic_period(mut self, period: Duration) -> Self {
        self.synthetic = self.synthetic.period(period);
        self
    }

    /// Replace the synthetic generator parameters
    pub fn synthetic(mut self, synthetic: SyntheticConfig) -> Self {
        self.synthetic = synthetic;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();

        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.channels, 6);
        assert_eq!(config.stop_timeout, Duration::from_secs(2));
        assert_eq!(config.record_policy, RecordPolicy::Permissive);
        assert_eq!(config.synthetic.period, Duration::from_millis(100));
        assert_eq!(config.synthetic.precision, 2);
    }

    #[test]
    fn test_builder_capacity_floor() {
        let config = StreamConfig::default().channel_capacity(0).channels(0);

        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.channels, 1);
    }

    #[test]
    fn test_builder_period_floor() {
        let config = StreamConfig::default().synthetic_period(Duration::ZERO);

        assert_eq!(config.synthetic.period, MIN_SYNTHETIC_PERIOD);
    }

    #[test]
    fn test_builder_chaining() {
        let config = StreamConfig::default()
            .channel_capacity(2)
            .channels(3)
            .stop_timeout(Duration::from_millis(250))
            .strict_records()
            .synthetic(SyntheticConfig::default().waveform(0.0, 1.0).precision(4));

        assert_eq!(config.channel_capacity, 2);
        assert_eq!(config.channels, 3);
        assert_eq!(config.stop_timeout, Duration::from_millis(250));
        assert_eq!(config.record_policy, RecordPolicy::Strict);
        assert_eq!(config.synthetic.baseline, 0.0);
        assert_eq!(config.synthetic.amplitude, 1.0);
        assert_eq!(config.synthetic.precision, 4);
    }
}
