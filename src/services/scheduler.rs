//! Periodic and on-demand sync scheduling
//!
//! The timer task never runs a cycle itself. It only enqueues a trigger into
//! a single-slot queue that one worker task drains, so cycles run strictly
//! one at a time. A trigger arriving while a cycle is queued or running is
//! skipped and counted. Shutdown aborts an in-flight cycle; the registry only
//! changes at the reconcile step, so an aborted cycle leaves it as it was or
//! fully reconciled.

use crate::domain::types::Credentials;
use crate::infra::metrics::Metrics;
use crate::services::sync::SyncPipeline;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Smallest accepted interval; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// What asked for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Startup,
    Timer,
    Manual,
}

/// Cloneable control surface for a running scheduler
#[derive(Clone)]
pub struct SyncHandle {
    trigger_tx: mpsc::Sender<TriggerSource>,
    running: Arc<AtomicBool>,
    credentials: Arc<RwLock<Arc<Credentials>>>,
    metrics: Arc<Metrics>,
}

impl SyncHandle {
    /// Request a cycle now
    ///
    /// Returns false when the request was skipped because a cycle is already
    /// queued or running.
    pub fn trigger(&self) -> bool {
        self.enqueue(TriggerSource::Manual)
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Replace the credential set; the next cycle picks it up
    pub fn update_credentials(&self, credentials: Credentials) {
        *self.credentials.write() = Arc::new(credentials);
        info!("credentials_updated");
    }

    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.read().clone()
    }

    fn enqueue(&self, source: TriggerSource) -> bool {
        if self.running.load(Ordering::Acquire) {
            self.metrics.record_trigger_skipped();
            debug!(source = ?source, "sync_trigger_skipped_running");
            return false;
        }
        match self.trigger_tx.try_send(source) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.record_trigger_skipped();
                debug!(source = ?source, "sync_trigger_skipped_queued");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Owns the timer and worker tasks
pub struct SyncScheduler {
    handle: SyncHandle,
    shutdown_tx: watch::Sender<bool>,
    timer: JoinHandle<()>,
    worker: JoinHandle<()>,
}

impl SyncScheduler {
    /// Start scheduling; the first cycle runs immediately
    pub fn spawn(pipeline: SyncPipeline, credentials: Credentials, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = SyncHandle {
            trigger_tx,
            running: Arc::new(AtomicBool::new(false)),
            credentials: Arc::new(RwLock::new(Arc::new(credentials))),
            metrics: pipeline.metrics().clone(),
        };

        let worker = tokio::spawn(run_worker(
            pipeline,
            trigger_rx,
            handle.clone(),
            shutdown_rx.clone(),
        ));
        let timer = tokio::spawn(run_timer(handle.clone(), interval, shutdown_rx));

        info!(interval_secs = interval.as_secs(), "sync_scheduler_started");

        Self { handle, shutdown_tx, timer, worker }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stop both tasks, aborting a cycle in flight
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.timer.await;
        let _ = self.worker.await;
        info!("sync_scheduler_stopped");
    }
}

async fn run_timer(handle: SyncHandle, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut source = TriggerSource::Startup;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                handle.enqueue(source);
                source = TriggerSource::Timer;
            }
        }
    }
}

async fn run_worker(
    pipeline: SyncPipeline,
    mut rx: mpsc::Receiver<TriggerSource>,
    handle: SyncHandle,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let source = tokio::select! {
            biased;
            _ = shutdown.changed() => return,
            msg = rx.recv() => match msg {
                Some(source) => source,
                None => return,
            },
        };

        handle.running.store(true, Ordering::Release);
        let credentials = handle.credentials();
        debug!(source = ?source, "sync_cycle_dequeued");

        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                handle.metrics.record_cycle_aborted();
                warn!(source = ?source, "sync_cycle_aborted");
                handle.running.store(false, Ordering::Release);
                return;
            }
            result = pipeline.run_cycle(&credentials) => match result {
                Ok(report) => info!(
                    cycle_id = %report.cycle_id,
                    source = ?source,
                    endpoint = %report.endpoint,
                    pages_ok = report.pages_ok,
                    pages_failed = report.pages_failed,
                    rooms = report.rooms_seen,
                    created = report.created,
                    updated = report.updated,
                    changed = report.changed,
                    registry_size = report.registry_size,
                    duration_ms = report.duration_ms,
                    "sync_cycle_completed"
                ),
                Err(e) => warn!(source = ?source, error = %e, "sync_cycle_failed"),
            },
        }

        handle.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Endpoint;
    use crate::io::http::fake::FakeTransport;
    use crate::io::http::HttpResponse;
    use crate::services::reconciler::RoomStateRegistry;
    use crate::services::sink::LogSink;
    use serde_json::json;

    fn credentials(username: &str) -> Credentials {
        Credentials {
            host_url: "https://ohip.example.com".to_string(),
            app_key: "app-key".to_string(),
            hotel_id: "HOTEL1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: username.to_string(),
            password: "pass".to_string(),
        }
    }

    fn floor_body() -> String {
        json!({
            "housekeepingRoomInfo": { "housekeepingRooms": { "room": [
                { "roomId": "101",
                  "housekeeping": { "housekeepingRoomStatus": { "housekeepingStatus": "Vacant" } } }
            ] } }
        })
        .to_string()
    }

    /// Token succeeds only for user "good"
    fn ohip() -> FakeTransport {
        FakeTransport::new(|req| {
            if req.method == "POST" {
                let good = req.form.iter().any(|(k, v)| k == "username" && v == "good");
                if good {
                    Ok(HttpResponse::new(200, r#"{"access_token":"T"}"#))
                } else {
                    Ok(HttpResponse::new(401, "denied"))
                }
            } else {
                Ok(HttpResponse::new(200, floor_body()))
            }
        })
    }

    struct Setup {
        transport: Arc<FakeTransport>,
        registry: Arc<RoomStateRegistry>,
        metrics: Arc<Metrics>,
        pipeline: SyncPipeline,
    }

    fn setup(transport: FakeTransport) -> Setup {
        let transport = Arc::new(transport);
        let registry = Arc::new(RoomStateRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let pipeline = SyncPipeline::new(
            transport.clone(),
            Endpoint::HousekeepingOverview,
            vec![1, 2, 3],
            registry.clone(),
            Arc::new(LogSink),
            metrics.clone(),
        );
        Setup { transport, registry, metrics, pipeline }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_at_startup() {
        let s = setup(ohip());
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("good"), Duration::from_secs(900));

        wait_until(|| metrics.cycles_succeeded() == 1).await;
        assert_eq!(s.registry.len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_repeat_on_interval() {
        let s = setup(ohip());
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("good"), Duration::from_secs(900));

        wait_until(|| metrics.cycles_succeeded() == 1).await;
        tokio::time::sleep(Duration::from_secs(901)).await;
        wait_until(|| metrics.cycles_succeeded() == 2).await;

        // One token request per cycle
        let posts = s.transport.requests().iter().filter(|r| r.method == "POST").count();
        assert_eq!(posts, 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        // Each request takes longer than the interval
        let s = setup(ohip().with_delay(Duration::from_secs(5)));
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("good"), Duration::from_secs(1));
        let handle = scheduler.handle();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(handle.state(), SchedulerState::Running);
        assert!(!handle.trigger());

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(s.transport.max_in_flight(), 1);
        assert!(metrics.cycles_succeeded() >= 2);
        assert!(metrics.triggers_skipped() > 0);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_returns_to_idle() {
        let s = setup(ohip());
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("bad"), Duration::from_secs(900));
        let handle = scheduler.handle();

        wait_until(|| metrics.cycles_failed() == 1 && handle.state() == SchedulerState::Idle).await;
        assert_eq!(metrics.auth_failures(), 1);
        assert!(s.registry.is_empty());
        // Only the token request went out
        assert_eq!(s.transport.requests().len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_credentials_applies_to_next_cycle() {
        let s = setup(ohip());
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("bad"), Duration::from_secs(900));
        let handle = scheduler.handle();

        wait_until(|| metrics.cycles_failed() == 1 && handle.state() == SchedulerState::Idle).await;

        handle.update_credentials(credentials("good"));
        assert_eq!(handle.credentials().username, "good");
        assert!(handle.trigger());

        wait_until(|| metrics.cycles_succeeded() == 1).await;
        assert_eq!(s.registry.len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_in_flight_cycle() {
        let s = setup(ohip().with_delay(Duration::from_secs(60)));
        let metrics = s.metrics.clone();
        let scheduler =
            SyncScheduler::spawn(s.pipeline, credentials("good"), Duration::from_secs(900));
        let handle = scheduler.handle();

        wait_until(|| handle.state() == SchedulerState::Running).await;
        scheduler.shutdown().await;

        assert_eq!(metrics.summary().cycles_aborted, 1);
        assert_eq!(metrics.cycles_succeeded(), 0);
        assert!(s.registry.is_empty());
        assert_eq!(handle.state(), SchedulerState::Idle);
        assert!(!handle.trigger());
    }
}
