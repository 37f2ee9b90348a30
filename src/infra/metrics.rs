//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for every recording operation so the sync worker never
//! waits on the reporter or the Prometheus endpoint.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical counters
//! only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Cycle duration bucket boundaries (milliseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Compute bucket index for a duration value using binary search
#[inline]
fn bucket_index(duration_ms: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < duration_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    // Rank of the sample, 1-based
    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        if count == 0 {
            continue;
        }
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// Counters are monotonic. `report()` additionally swaps the "since last
/// report" fields for the periodic log line; `summary()` never resets
/// anything and is what the Prometheus endpoint reads.
pub struct Metrics {
    /// Sync cycles started (monotonic)
    cycles_started: AtomicU64,
    /// Sync cycles that reconciled at least one page (monotonic)
    cycles_succeeded: AtomicU64,
    /// Sync cycles that ended in an error (monotonic)
    cycles_failed: AtomicU64,
    /// Sync cycles aborted by shutdown (monotonic)
    cycles_aborted: AtomicU64,
    /// Token requests that failed (monotonic)
    auth_failures: AtomicU64,
    /// Pages fetched successfully (monotonic)
    pages_ok: AtomicU64,
    /// Pages that failed (monotonic)
    page_failures: AtomicU64,
    /// Page failures caused by a timeout (monotonic)
    page_timeouts: AtomicU64,
    /// Triggers dropped because a cycle was already queued (monotonic)
    triggers_skipped: AtomicU64,
    /// Rooms created in the registry (monotonic)
    rooms_created: AtomicU64,
    /// Room updates pushed (monotonic)
    rooms_updated: AtomicU64,
    /// Room updates whose status actually changed (monotonic)
    rooms_changed: AtomicU64,
    /// Room events dropped because the sink channel was full (monotonic)
    sink_events_dropped: AtomicU64,
    /// Current registry size (gauge)
    registry_size: AtomicU64,
    /// Epoch ms of the last successful cycle (gauge, 0 = never)
    last_success_epoch_ms: AtomicU64,
    /// Cycle duration histogram buckets (monotonic)
    cycle_duration_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of cycle durations (monotonic)
    cycle_duration_sum_ms: AtomicU64,
    /// Max cycle duration (reset on report)
    cycle_duration_max_ms: AtomicU64,
    /// Cycles since last report (reset on report)
    cycles_since_report: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            cycles_started: AtomicU64::new(0),
            cycles_succeeded: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            cycles_aborted: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            pages_ok: AtomicU64::new(0),
            page_failures: AtomicU64::new(0),
            page_timeouts: AtomicU64::new(0),
            triggers_skipped: AtomicU64::new(0),
            rooms_created: AtomicU64::new(0),
            rooms_updated: AtomicU64::new(0),
            rooms_changed: AtomicU64::new(0),
            sink_events_dropped: AtomicU64::new(0),
            registry_size: AtomicU64::new(0),
            last_success_epoch_ms: AtomicU64::new(0),
            cycle_duration_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            cycle_duration_sum_ms: AtomicU64::new(0),
            cycle_duration_max_ms: AtomicU64::new(0),
            cycles_since_report: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished cycle (success or failure) and its duration
    #[inline]
    pub fn record_cycle_finished(&self, succeeded: bool, duration_ms: u64, epoch_ms: u64) {
        if succeeded {
            self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
            self.last_success_epoch_ms.store(epoch_ms, Ordering::Relaxed);
        } else {
            self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.cycles_since_report.fetch_add(1, Ordering::Relaxed);
        self.cycle_duration_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.cycle_duration_buckets[bucket_index(duration_ms)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.cycle_duration_max_ms, duration_ms);
    }

    #[inline]
    pub fn record_cycle_aborted(&self) {
        self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pages(&self, ok: u64, failed: u64, timeouts: u64) {
        self.pages_ok.fetch_add(ok, Ordering::Relaxed);
        self.page_failures.fetch_add(failed, Ordering::Relaxed);
        self.page_timeouts.fetch_add(timeouts, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_trigger_skipped(&self) {
        self.triggers_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconcile(&self, created: u64, updated: u64, changed: u64, registry_size: u64) {
        self.rooms_created.fetch_add(created, Ordering::Relaxed);
        self.rooms_updated.fetch_add(updated, Ordering::Relaxed);
        self.rooms_changed.fetch_add(changed, Ordering::Relaxed);
        self.registry_size.store(registry_size, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sink_event_dropped(&self) {
        self.sink_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    pub fn cycles_succeeded(&self) -> u64 {
        self.cycles_succeeded.load(Ordering::Relaxed)
    }

    pub fn cycles_failed(&self) -> u64 {
        self.cycles_failed.load(Ordering::Relaxed)
    }

    pub fn triggers_skipped(&self) -> u64 {
        self.triggers_skipped.load(Ordering::Relaxed)
    }

    pub fn auth_failures(&self) -> u64 {
        self.auth_failures.load(Ordering::Relaxed)
    }

    pub fn sink_events_dropped(&self) -> u64 {
        self.sink_events_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot of every counter without resetting anything
    pub fn summary(&self) -> MetricsSummary {
        let buckets = load_buckets(&self.cycle_duration_buckets);
        let finished: u64 = buckets.iter().sum();
        let sum = self.cycle_duration_sum_ms.load(Ordering::Relaxed);

        MetricsSummary {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_succeeded: self.cycles_succeeded.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            pages_ok: self.pages_ok.load(Ordering::Relaxed),
            page_failures: self.page_failures.load(Ordering::Relaxed),
            page_timeouts: self.page_timeouts.load(Ordering::Relaxed),
            triggers_skipped: self.triggers_skipped.load(Ordering::Relaxed),
            rooms_created: self.rooms_created.load(Ordering::Relaxed),
            rooms_updated: self.rooms_updated.load(Ordering::Relaxed),
            rooms_changed: self.rooms_changed.load(Ordering::Relaxed),
            sink_events_dropped: self.sink_events_dropped.load(Ordering::Relaxed),
            registry_size: self.registry_size.load(Ordering::Relaxed),
            last_success_epoch_ms: self.last_success_epoch_ms.load(Ordering::Relaxed),
            cycle_buckets: buckets,
            cycle_duration_sum_ms: sum,
            cycle_avg_ms: if finished > 0 { sum / finished } else { 0 },
            cycle_max_ms: self.cycle_duration_max_ms.load(Ordering::Relaxed),
            cycle_p50_ms: percentile_from_buckets(&buckets, 0.50),
            cycle_p99_ms: percentile_from_buckets(&buckets, 0.99),
            cycles_since_report: self.cycles_since_report.load(Ordering::Relaxed),
            report_window_secs: self.last_report_time.lock().elapsed().as_secs_f64(),
        }
    }

    /// Snapshot for the periodic log line; resets the per-window fields
    pub fn report(&self) -> MetricsSummary {
        let mut summary = self.summary();
        summary.cycles_since_report = self.cycles_since_report.swap(0, Ordering::Relaxed);
        summary.cycle_max_ms = self.cycle_duration_max_ms.swap(0, Ordering::Relaxed);

        let mut last = self.last_report_time.lock();
        summary.report_window_secs = last.elapsed().as_secs_f64();
        *last = Instant::now();
        summary
    }
}

/// Point-in-time view of the metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub cycles_started: u64,
    pub cycles_succeeded: u64,
    pub cycles_failed: u64,
    pub cycles_aborted: u64,
    pub auth_failures: u64,
    pub pages_ok: u64,
    pub page_failures: u64,
    pub page_timeouts: u64,
    pub triggers_skipped: u64,
    pub rooms_created: u64,
    pub rooms_updated: u64,
    pub rooms_changed: u64,
    pub sink_events_dropped: u64,
    pub registry_size: u64,
    pub last_success_epoch_ms: u64,
    /// Cycle duration histogram buckets (cumulative since start)
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 ms
    pub cycle_buckets: [u64; NUM_BUCKETS],
    pub cycle_duration_sum_ms: u64,
    pub cycle_avg_ms: u64,
    pub cycle_max_ms: u64,
    pub cycle_p50_ms: u64,
    pub cycle_p99_ms: u64,
    pub cycles_since_report: u64,
    pub report_window_secs: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            cycles_total = %self.cycles_started,
            cycles_ok = %self.cycles_succeeded,
            cycles_failed = %self.cycles_failed,
            cycles_in_window = %self.cycles_since_report,
            auth_failures = %self.auth_failures,
            page_failures = %self.page_failures,
            triggers_skipped = %self.triggers_skipped,
            rooms = %self.registry_size,
            rooms_created = %self.rooms_created,
            rooms_changed = %self.rooms_changed,
            cycle_p50_ms = %self.cycle_p50_ms,
            cycle_max_ms = %self.cycle_max_ms,
            "metrics"
        );
    }
}
