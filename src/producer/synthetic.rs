//! Synthetic telemetry generator
//!
//! Emits phase-shifted sinusoids so subscribers always have data when no
//! external producer is attached.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SyntheticConfig;
use crate::hub::TelemetryHub;
use crate::sample::Sample;

use super::ProducerTask;

/// Generates readings at a fixed period
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
    config: SyntheticConfig,
    channels: usize,
}

impl SyntheticGenerator {
    /// Create a generator producing `channels` values per reading
    pub fn new(config: SyntheticConfig, channels: usize) -> Self {
        Self {
            config,
            channels: channels.max(1),
        }
    }

    /// The reading for the `tick`-th period after start
    pub fn sample_at(&self, tick: u64) -> Sample {
        let t = round_to(tick as f64 * self.config.period.as_secs_f64(), 6);

        let channels: Vec<f64> = (0..self.channels)
            .map(|i| {
                let v = self.config.baseline
                    + self.config.amplitude * (self.config.frequency * t + i as f64).sin();
                round_to(v.max(0.0), self.config.precision)
            })
            .collect();

        Sample::reading(t, channels)
    }

    /// Start broadcasting into `hub`
    ///
    /// The first reading goes out immediately with `t = 0`.
    pub fn spawn(self, hub: Arc<TelemetryHub>) -> ProducerTask {
        tracing::debug!(
            period_ms = self.config.period.as_millis() as u64,
            channels = self.channels,
            "Starting synthetic generator"
        );
        ProducerTask::spawn("synthetic", move |token| self.run(hub, token))
    }

    async fn run(self, hub: Arc<TelemetryHub>, token: CancellationToken) {
        let mut tick = 0u64;

        loop {
            if token.is_cancelled() {
                break;
            }
            hub.broadcast(&self.sample_at(tick));
            tick += 1;

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.period) => {}
            }
        }

        tracing::debug!(ticks = tick, "Synthetic generator stopped");
    }
}

fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn fast_generator() -> SyntheticGenerator {
        SyntheticGenerator::new(
            SyntheticConfig::default().period(Duration::from_millis(10)),
            6,
        )
    }

    async fn next_timestamp(sub: &crate::hub::Subscription) -> f64 {
        tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .and_then(|s| s.timestamp())
            .unwrap()
    }

    #[test]
    fn test_sample_at_origin() {
        let generator = SyntheticGenerator::new(SyntheticConfig::default(), 6);
        let sample = generator.sample_at(0);
        let reading = sample.as_reading().unwrap();

        assert_eq!(reading.timestamp(), 0.0);
        assert_eq!(reading.arity(), 6);
        assert_eq!(reading.channels()[0], 100.0);
        // 100 + 40 * sin(1) = 133.6588...
        assert_eq!(reading.channels()[1], 133.66);
    }

    #[test]
    fn test_timestamps_do_not_drift() {
        let generator = SyntheticGenerator::new(SyntheticConfig::default(), 6);

        assert_eq!(generator.sample_at(3).timestamp(), Some(0.3));
        assert_eq!(generator.sample_at(1000).timestamp(), Some(100.0));
    }

    #[test]
    fn test_values_clamped_and_rounded() {
        let config = SyntheticConfig::default().waveform(0.0, 1.0).precision(1);
        let generator = SyntheticGenerator::new(config, 6);
        let sample = generator.sample_at(0);
        let channels = sample.as_reading().unwrap().channels();

        // sin(4) and sin(5) are negative
        assert_eq!(channels[4], 0.0);
        assert_eq!(channels[5], 0.0);
        // sin(1) = 0.84147...
        assert_eq!(channels[1], 0.8);
        assert!(channels.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_deterministic() {
        let generator = SyntheticGenerator::new(SyntheticConfig::default(), 6);
        assert_eq!(generator.sample_at(17), generator.sample_at(17));
    }

    #[tokio::test]
    async fn test_spawn_and_stop() {
        let hub = Arc::new(TelemetryHub::new(100));
        let sub = hub.subscribe();

        let task = fast_generator().spawn(Arc::clone(&hub));

        assert_eq!(next_timestamp(&sub).await, 0.0);
        assert_eq!(next_timestamp(&sub).await, 0.01);
        assert_eq!(next_timestamp(&sub).await, 0.02);

        task.stop().await;
        while sub.try_recv().is_some() {}

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_restart_begins_at_zero() {
        let hub = Arc::new(TelemetryHub::new(100));
        let sub = hub.subscribe();

        let task = fast_generator().spawn(Arc::clone(&hub));
        next_timestamp(&sub).await;
        next_timestamp(&sub).await;
        task.stop().await;
        while sub.try_recv().is_some() {}

        let task = fast_generator().spawn(Arc::clone(&hub));
        assert_eq!(next_timestamp(&sub).await, 0.0);
        task.stop().await;
    }
}
