//! Periodic background tasks (heartbeat and watch cycles)

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// A tokio task running `tick` once per period until stopped or until a tick
/// returns [`ControlFlow::Break`].
///
/// The first tick fires one full period after spawning.
#[derive(Debug)]
pub(crate) struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub(crate) fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            debug!(task = name, ?period, "Starting background task");
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(task = name, "Background task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if tick().await.is_break() {
                            debug!(task = name, "Background task finished");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            name,
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait until it has exited.
    ///
    /// A tick already in flight runs to completion first, so no store call
    /// issued by this task can land after `stop` returns.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await
            && e.is_panic()
        {
            warn!(task = self.name, error = %e, "Background task panicked");
        }
    }
}
