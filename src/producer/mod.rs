//! Sample producers
//!
//! A producer is a background task that feeds the hub: either the
//! [`SyntheticGenerator`] or a [`ProcessSupervisor`]-managed external process.
//! Both run as a [`ProducerTask`], which pairs the tokio task with the
//! cancellation token it watches.

pub mod command;
pub mod process;
pub mod synthetic;

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use command::ExternalCommand;
pub use process::{ExitReport, ExternalProducer, PendingProcess, ProcessSupervisor};
pub use synthetic::SyntheticGenerator;

/// A running producer task
///
/// Dropping the handle cancels the task. [`stop`](ProducerTask::stop) cancels
/// it and waits until it has actually exited, so no sample from this producer
/// can reach the hub after `stop` returns.
pub struct ProducerTask<T = ()> {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<T>,
    _guard: DropGuard,
}

impl<T: Send + 'static> ProducerTask<T> {
    /// Spawn `run` with a fresh cancellation token
    pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(token.clone()));

        Self {
            name,
            _guard: token.clone().drop_guard(),
            token,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task has already returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it to exit
    ///
    /// Returns the task's output, or `None` if it panicked.
    pub async fn stop(self) -> Option<T> {
        let ProducerTask {
            name,
            token,
            handle,
            _guard,
        } = self;

        token.cancel();
        match handle.await {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(producer = name, error = %e, "Producer task ended abnormally");
                None
            }
        }
    }
}

impl<T> std::fmt::Debug for ProducerTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerTask")
            .field("name", &self.name)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
