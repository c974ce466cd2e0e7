//! Stream coordinator implementation

use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::config::StreamConfig;
use crate::error::Result;
use crate::hub::{Subscription, TelemetryHub};
use crate::producer::{ExternalCommand, ExternalProducer, ProcessSupervisor, ProducerTask, SyntheticGenerator};
use crate::sample::{RecordDecoder, Sample};
use crate::stats::{HubMetrics, HubStats};

use super::state::ProducerState;

/// Owner of the single active producer
///
/// Cheap to clone; clones share the same hub and producer. All producer
/// transitions are serialized through one async mutex, so at most one
/// producer broadcasts at any time.
#[derive(Clone)]
pub struct StreamCoordinator {
    shared: Arc<Shared>,
}

struct Shared {
    config: StreamConfig,
    hub: Arc<TelemetryHub>,
    supervisor: ProcessSupervisor,
    slot: Mutex<ProducerSlot>,
    state_tx: watch::Sender<ProducerState>,
}

struct ProducerSlot {
    active: ActiveProducer,
    /// Bumped for every external start; lets a late exit notice that its
    /// process is no longer the current one
    epoch: u64,
}

enum ActiveProducer {
    Idle,
    Synthetic(ProducerTask),
    External {
        epoch: u64,
        producer: ExternalProducer,
    },
}

impl ActiveProducer {
    fn state(&self) -> ProducerState {
        match self {
            ActiveProducer::Idle => ProducerState::NoProducer,
            ActiveProducer::Synthetic(_) => ProducerState::SyntheticActive,
            ActiveProducer::External { .. } => ProducerState::ExternalActive,
        }
    }
}

impl StreamCoordinator {
    /// Create a coordinator with its own hub
    pub fn new(config: StreamConfig) -> Self {
        let metrics = Arc::new(HubMetrics::new());
        let hub = Arc::new(TelemetryHub::with_metrics(config.channel_capacity, metrics));
        Self::with_hub(config, hub)
    }

    /// Create a coordinator feeding an existing hub
    pub fn with_hub(config: StreamConfig, hub: Arc<TelemetryHub>) -> Self {
        let decoder = RecordDecoder::new(config.channels, config.record_policy);
        let supervisor = ProcessSupervisor::new(Arc::clone(&hub), decoder, config.stop_timeout);
        let (state_tx, _) = watch::channel(ProducerState::NoProducer);

        Self {
            shared: Arc::new(Shared {
                config,
                hub,
                supervisor,
                slot: Mutex::new(ProducerSlot {
                    active: ActiveProducer::Idle,
                    epoch: 0,
                }),
                state_tx,
            }),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    pub fn hub(&self) -> &Arc<TelemetryHub> {
        &self.shared.hub
    }

    /// Current producer state
    pub fn state(&self) -> ProducerState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver that observes every producer transition
    pub fn state_changes(&self) -> watch::Receiver<ProducerState> {
        self.shared.state_tx.subscribe()
    }

    /// Snapshot of counters, subscriber count and state
    pub fn stats(&self) -> HubStats {
        HubStats::collect(
            self.shared.hub.metrics(),
            self.state(),
            self.shared.hub.subscriber_count(),
        )
    }

    /// Register a subscriber on the shared stream
    pub fn subscribe(&self) -> Subscription {
        self.shared.hub.subscribe()
    }

    /// Remove a subscriber; a no-op if it is already gone
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.shared.hub.unsubscribe(subscription.id())
    }

    /// Inject a sample directly, bypassing the active producer
    pub fn publish(&self, sample: &Sample) -> usize {
        self.shared.hub.broadcast(sample)
    }

    /// Decode a JSON reading and inject it
    ///
    /// Unlike external process output this is strict: the line must be a
    /// reading with the configured channel count.
    pub fn publish_line(&self, line: &str) -> Result<usize> {
        let sample = RecordDecoder::strict(self.shared.config.channels).decode(line)?;
        Ok(self.publish(&sample))
    }

    /// Make sure some producer is running
    ///
    /// Starts the synthetic generator unless it is already running or an
    /// external process is active.
    pub async fn ensure_default_running(&self) {
        let mut slot = self.shared.slot.lock().await;

        match &slot.active {
            ActiveProducer::External { .. } => return,
            ActiveProducer::Synthetic(task) if !task.is_finished() => return,
            _ => {}
        }

        self.shared.stop_active(&mut slot).await;
        self.shared.start_synthetic(&mut slot);
    }

    /// Replace the current producer with an external process
    ///
    /// The process is spawned before anything else changes: if it cannot be
    /// spawned the error is returned and the current producer keeps running.
    /// An already running external process is superseded.
    pub async fn start_external(&self, command: &ExternalCommand) -> Result<()> {
        let mut slot = self.shared.slot.lock().await;

        let pending = match self.shared.supervisor.spawn(command) {
            Ok(pending) => pending,
            Err(e) => {
                self.shared.hub.metrics().incr_spawn_failures();
                tracing::warn!(
                    command = %command,
                    error = %e,
                    state = %slot.active.state(),
                    "External producer failed to start, keeping current producer"
                );
                return Err(e);
            }
        };

        let previous = slot.active.state();
        self.shared.stop_active(&mut slot).await;

        slot.epoch += 1;
        let epoch = slot.epoch;
        let weak = Arc::downgrade(&self.shared);
        let producer = pending.start(move |_report| {
            // The fallback needs the slot lock, which a concurrent stop may
            // hold while it waits for this very task
            tokio::spawn(async move {
                if let Some(shared) = weak.upgrade() {
                    shared.on_external_exit(epoch).await;
                }
            });
        });

        tracing::info!(
            command = %command,
            pid = ?producer.pid(),
            epoch,
            previous = %previous,
            "External producer started"
        );

        slot.active = ActiveProducer::External { epoch, producer };
        self.shared.hub.metrics().incr_external_starts();
        self.shared.publish_state(&slot);
        Ok(())
    }

    /// Stop the external process and fall back to the synthetic generator
    ///
    /// Does nothing unless an external process is active.
    pub async fn stop_external(&self) {
        let mut slot = self.shared.slot.lock().await;

        if !slot.active.state().is_external() {
            tracing::debug!(state = %slot.active.state(), "No external producer to stop");
            return;
        }

        self.shared.stop_active(&mut slot).await;
        self.shared.start_synthetic(&mut slot);
    }

    /// Stop whatever producer is running
    pub async fn shutdown(&self) {
        let mut slot = self.shared.slot.lock().await;
        self.shared.stop_active(&mut slot).await;
        self.shared.publish_state(&slot);
        tracing::info!("Stream coordinator shut down");
    }

    /// Run until `shutdown` resolves, then stop the active producer
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        self.ensure_default_running().await;
        shutdown.await;
        tracing::info!("Shutdown signal received");
        self.shutdown().await;
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("state", &self.state())
            .field("subscribers", &self.shared.hub.subscriber_count())
            .finish()
    }
}

impl Shared {
    /// Stop the active producer and wait for it to exit. Leaves the slot idle
    /// without publishing, so observers see the next state directly.
    async fn stop_active(&self, slot: &mut ProducerSlot) {
        match std::mem::replace(&mut slot.active, ActiveProducer::Idle) {
            ActiveProducer::Idle => {}
            ActiveProducer::Synthetic(task) => {
                task.stop().await;
                tracing::debug!("Synthetic generator stopped");
            }
            ActiveProducer::External { epoch, producer } => {
                let pid = producer.pid();
                let report = producer.stop().await;
                tracing::info!(
                    pid = ?pid,
                    epoch,
                    status = ?report.as_ref().and_then(|r| r.status),
                    forced = report.as_ref().map(|r| r.forced).unwrap_or(false),
                    "External producer stopped"
                );
            }
        }
    }

    fn start_synthetic(&self, slot: &mut ProducerSlot) {
        let generator = SyntheticGenerator::new(self.config.synthetic.clone(), self.config.channels);
        slot.active = ActiveProducer::Synthetic(generator.spawn(Arc::clone(&self.hub)));
        self.hub.metrics().incr_synthetic_starts();
        self.publish_state(slot);

        tracing::info!(
            period_ms = self.config.synthetic.period.as_millis() as u64,
            "Synthetic producer active"
        );
    }

    fn publish_state(&self, slot: &ProducerSlot) {
        self.state_tx.send_replace(slot.active.state());
    }

    /// Fallback after an external process exits on its own
    ///
    /// Runs at most once per epoch: if the process was already stopped or
    /// superseded, the slot no longer holds this epoch and nothing happens.
    async fn on_external_exit(&self, epoch: u64) {
        let mut slot = self.slot.lock().await;

        let current = matches!(
            slot.active,
            ActiveProducer::External { epoch: active, .. } if active == epoch
        );
        if !current {
            tracing::debug!(epoch, "Ignoring exit of a retired external producer");
            return;
        }

        self.stop_active(&mut slot).await;
        self.hub.metrics().incr_external_exits();
        tracing::info!(epoch, "External producer ended, falling back to synthetic");
        self.start_synthetic(&mut slot);
    }
}
