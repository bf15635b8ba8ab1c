//! Queue-to-fan-out pump and the idle-session reaper.
//!
//! Both loops are cancellable scheduled tasks with an explicit
//! start/stop lifecycle: [`spawn_dispatcher`] and [`spawn_reaper`]
//! return a [`TaskHandle`] whose `stop` flips a watch token and awaits
//! the task, so nothing is left to die silently with the runtime.
//!
//! The dispatcher acks a broker message once delivery has been
//! *attempted* to every current subscriber; per-session delivery is
//! best effort and at most once, independent of the queue's
//! at-least-once contract to the dispatcher itself.

use std::sync::Arc;
use std::time::Duration;

use taskpulse_queue::PriorityQueue;
use taskpulse_types::ServerFrame;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

/// Configuration for the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Lease duration passed to every dequeue.
    pub visibility_timeout: Duration,
    /// Sleep between polls when every subscribed topic is drained.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Handle to a spawned background loop.
pub struct TaskHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Request cooperative shutdown and wait for the loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if self.handle.await.is_err() {
            warn!("Background loop ended abnormally");
        }
    }

    /// Whether the loop has already exited on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawn the dispatcher loop: dequeue for every subscribed topic and
/// fan each message out to its subscribers.
pub fn spawn_dispatcher(
    registry: Arc<SessionRegistry>,
    queue: PriorityQueue,
    config: DispatcherConfig,
) -> TaskHandle {
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(run_dispatcher(registry, queue, config, rx));
    TaskHandle { shutdown, handle }
}

async fn run_dispatcher(
    registry: Arc<SessionRegistry>,
    queue: PriorityQueue,
    config: DispatcherConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Fan-out dispatcher started");

    'outer: loop {
        if *shutdown.borrow() {
            break;
        }

        let topics = registry.topics().await;
        let mut delivered_any = false;

        for topic in topics {
            if *shutdown.borrow() {
                break 'outer;
            }
            match queue.dequeue(&topic, config.visibility_timeout).await {
                Ok(Some(message)) => {
                    let id = message.id;
                    let frame = ServerFrame::Progress {
                        payload: message.payload,
                    };
                    let delivered = registry.fanout(&topic, &frame).await;
                    debug!(%id, topic = %topic, delivered, "Fanned out message");

                    // Delivery has been attempted for every current
                    // subscriber; the broker message is done either way.
                    if let Err(e) = queue.ack(&topic, id).await {
                        warn!(%id, topic = %topic, error = %e, "Ack failed");
                    }
                    delivered_any = true;
                }
                Ok(None) => {}
                Err(e) => {
                    // Contained: a broker hiccup on one topic never
                    // crashes the loop.
                    warn!(topic = %topic, error = %e, "Dequeue failed");
                }
            }
        }

        if !delivered_any {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(config.poll_interval) => {}
            }
        }
    }

    info!("Fan-out dispatcher stopped");
}

/// Spawn the reaper loop: force-close sessions whose heartbeat silence
/// exceeds `idle_timeout`, scanning every `interval`.
pub fn spawn_reaper(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
) -> TaskHandle {
    let (shutdown, rx) = watch::channel(false);
    let handle = tokio::spawn(run_reaper(registry, idle_timeout, interval, rx));
    TaskHandle { shutdown, handle }
}

async fn run_reaper(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(?idle_timeout, "Session reaper started");
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let reaped = registry.reap_idle(idle_timeout).await;
                if !reaped.is_empty() {
                    info!(count = reaped.len(), "Reaped idle sessions");
                }
            }
        }
    }

    info!("Session reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionHandle;

    #[tokio::test]
    async fn reaper_closes_idle_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let session = SessionHandle::new(4);
        registry.register(Arc::clone(&session)).await;
        registry
            .subscribe(session.id(), &["task-1".to_owned()])
            .await;

        let reaper = spawn_reaper(
            Arc::clone(&registry),
            Duration::from_millis(20),
            Duration::from_millis(10),
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        reaper.stop().await;

        assert!(session.is_closed());
        assert!(registry.get(session.id()).await.is_none());
        assert!(registry.topics().await.is_empty());
    }

    #[tokio::test]
    async fn reaper_spares_heartbeating_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let session = SessionHandle::new(4);
        registry.register(Arc::clone(&session)).await;

        let reaper = spawn_reaper(
            Arc::clone(&registry),
            Duration::from_millis(60),
            Duration::from_millis(10),
        );

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.touch();
        }
        reaper.stop().await;

        assert!(!session.is_closed());
        assert!(registry.get(session.id()).await.is_some());
    }

    #[tokio::test]
    async fn stop_is_prompt() {
        let registry = Arc::new(SessionRegistry::new());
        let reaper = spawn_reaper(registry, Duration::from_secs(60), Duration::from_secs(60));
        // Stopping must not wait out the 60-second scan interval.
        let stopped = tokio::time::timeout(Duration::from_secs(1), reaper.stop()).await;
        assert!(stopped.is_ok(), "reaper did not stop promptly");
    }
}
