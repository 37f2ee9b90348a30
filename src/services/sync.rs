//! One sync cycle: authenticate → fetch → extract → reconcile → notify
//!
//! A fresh token is requested at the start of every cycle and dropped at
//! the end. Authentication failure aborts the cycle before anything is
//! fetched, so the registry is left untouched. Failed pages are skipped;
//! the cycle only fails when every page failed.

use crate::domain::types::{epoch_ms, new_uuid_v7, Credentials, Endpoint};
use crate::infra::metrics::Metrics;
use crate::io::auth::{AuthError, TokenProvider};
use crate::io::fetcher::HousekeepingFetcher;
use crate::io::http::HttpTransport;
use crate::services::extractor::extract_all;
use crate::services::reconciler::{reconcile, RoomStateRegistry};
use crate::services::sink::RoomSink;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("all {pages} page fetches failed")]
    NoPagesFetched { pages: usize },
}

/// Summary of a completed cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: String,
    pub endpoint: Endpoint,
    pub pages_ok: usize,
    pub pages_failed: usize,
    pub rooms_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub changed: usize,
    pub registry_size: usize,
    pub duration_ms: u64,
}

pub struct SyncPipeline {
    token_provider: TokenProvider,
    fetcher: HousekeepingFetcher,
    registry: Arc<RoomStateRegistry>,
    sink: Arc<dyn RoomSink>,
    metrics: Arc<Metrics>,
}

impl SyncPipeline {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: Endpoint,
        floors: Vec<u32>,
        registry: Arc<RoomStateRegistry>,
        sink: Arc<dyn RoomSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            token_provider: TokenProvider::new(transport.clone()),
            fetcher: HousekeepingFetcher::new(transport, endpoint, floors),
            registry,
            sink,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<RoomStateRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run one full cycle against `creds`
    pub async fn run_cycle(&self, creds: &Credentials) -> Result<CycleReport, SyncError> {
        let cycle_id = new_uuid_v7();
        let start = Instant::now();
        self.metrics.record_cycle_started();
        info!(cycle_id = %cycle_id, endpoint = %self.fetcher.endpoint(), "sync_cycle_started");

        let result = self.run_stages(&cycle_id, creds, start).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.metrics.record_cycle_finished(result.is_ok(), duration_ms, epoch_ms());
        result
    }

    async fn run_stages(
        &self,
        cycle_id: &str,
        creds: &Credentials,
        start: Instant,
    ) -> Result<CycleReport, SyncError> {
        let token = match self.token_provider.authenticate(creds).await {
            Ok(token) => token,
            Err(e) => {
                self.metrics.record_auth_failure();
                return Err(e.into());
            }
        };

        let fetched = self.fetcher.fetch_all(&token, creds).await;
        let timeouts = fetched.failures.iter().filter(|f| f.error.is_timeout()).count();
        self.metrics.record_pages(
            fetched.pages_ok as u64,
            fetched.failures.len() as u64,
            timeouts as u64,
        );

        if fetched.pages_ok == 0 {
            return Err(SyncError::NoPagesFetched { pages: fetched.pages_total() });
        }
        if !fetched.failures.is_empty() {
            warn!(
                cycle_id = %cycle_id,
                pages_failed = fetched.failures.len(),
                pages_ok = fetched.pages_ok,
                "sync_cycle_partial"
            );
        }

        let statuses = extract_all(&fetched.rooms, fetched.endpoint);
        let outcome = reconcile(&self.registry, &statuses);

        for room in &outcome.created {
            self.sink.on_room_created(room);
        }
        for update in &outcome.updated {
            self.sink.on_room_updated(&update.state);
        }

        let registry_size = self.registry.len();
        let changed = outcome.changed_count();
        self.metrics.record_reconcile(
            outcome.created.len() as u64,
            outcome.updated.len() as u64,
            changed as u64,
            registry_size as u64,
        );

        Ok(CycleReport {
            cycle_id: cycle_id.to_string(),
            endpoint: fetched.endpoint,
            pages_ok: fetched.pages_ok,
            pages_failed: fetched.failures.len(),
            rooms_seen: statuses.len(),
            created: outcome.created.len(),
            updated: outcome.updated.len(),
            changed,
            registry_size,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
