//! The poll loop: fetch, filter, classify, enrich, notify, sleep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{classify, without_failed_calls};
use crate::enricher::Enricher;
use crate::interval;
use crate::novelty::filter_new;
use crate::config::DEFAULT_TIMEZONE;
use crate::notifier::{Deployment, MessageProducer, NoticeContext};
use crate::rules::RuleTable;
use crate::status::{CyclePhase, SharedStatus};
use crate::summary::build_elaboration;
use crate::traits::{AuditSource, DetailLookup, Notifier};
use crate::types::{AuditFetch, AuditRecord, Result, TimeWindow};

/// What one cycle hands to the next.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    /// Records fetched by the previous cycle; `None` when it fetched nothing usable.
    pub baseline: Option<Vec<AuditRecord>>,
    /// Time of the previous cycle's successful audit query.
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Suppressed,
    NothingToSend,
    Delivered,
    Failed,
}

/// Summary of one finished cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// HTTP status of the audit query; `None` when no response arrived.
    pub status: Option<u16>,
    pub fetched: usize,
    pub novel: usize,
    pub elaboration: Option<String>,
    pub outcome: NotifyOutcome,
}

pub struct PollCycle {
    source: Arc<dyn AuditSource>,
    enricher: Enricher,
    notifier: Arc<dyn Notifier>,
    producer: MessageProducer,
    table: RuleTable,
    status: SharedStatus,
    lookback_ms: i64,
    sleep: Duration,
    timezone: Tz,
    host: String,
    deployment: Deployment,
}

impl PollCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn AuditSource>,
        lookup: Arc<dyn DetailLookup>,
        notifier: Arc<dyn Notifier>,
        producer: MessageProducer,
        table: RuleTable,
        status: SharedStatus,
        lookback_ms: i64,
        sleep: Duration,
    ) -> Self {
        Self {
            source,
            enricher: Enricher::new(lookup),
            notifier,
            producer,
            table,
            status,
            lookback_ms,
            sleep,
            timezone: DEFAULT_TIMEZONE,
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            deployment: Deployment::from_env(),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployment = deployment;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    async fn set_phase(&self, phase: CyclePhase) {
        self.status.write().await.phase = phase;
    }

    /// Run one cycle. Only authentication failures are returned as errors.
    pub async fn run_once(&self, state: CycleState) -> Result<(CycleState, CycleReport)> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        self.cycle(cycle_id, state).instrument(span).await
    }

    async fn cycle(&self, cycle_id: Uuid, state: CycleState) -> Result<(CycleState, CycleReport)> {
        self.set_phase(CyclePhase::Authenticating).await;
        let now = Utc::now();
        let window = TimeWindow::ending_at(now.timestamp_millis(), self.lookback_ms);

        self.set_phase(CyclePhase::Fetching).await;
        let (status, fetch) = match self.source.fetch_audits(window).await {
            Ok(fetch) => (Some(fetch.status), fetch),
            Err(e) if e.is_fatal() => {
                error!("cannot authenticate: {}", e);
                self.set_phase(CyclePhase::Stopped).await;
                return Err(e);
            }
            Err(e) => {
                warn!("audit query failed: {}", e);
                (None, AuditFetch::default())
            }
        };

        self.set_phase(CyclePhase::Filtering).await;
        let succeeded = fetch.is_success();
        let fetched = fetch.records;
        let fetched_count = fetched.as_ref().map_or(0, Vec::len);
        let novel = match (&fetched, succeeded) {
            (Some(records), true) => filter_new(state.baseline.as_deref(), records),
            _ => Vec::new(),
        };
        debug!("{} fetched, {} new", fetched_count, novel.len());

        let mut elaboration = None;
        let outcome = if state.last_check.is_none() || !succeeded || novel.is_empty() {
            debug!("not notifying for this cycle");
            NotifyOutcome::Suppressed
        } else {
            self.set_phase(CyclePhase::Classifying).await;
            let classified = classify(&novel, &self.table);
            let groups = self.enricher.enrich(&classified).await?;
            let text = build_elaboration(&groups);

            self.set_phase(CyclePhase::Notifying).await;
            let ctx = NoticeContext {
                organization: self.table.organization().to_string(),
                novel_count: novel.len(),
                filtered_count: without_failed_calls(&novel).len(),
                elaboration: text.clone(),
                last_check: state.last_check,
                now,
                timezone: self.timezone,
                host: self.host.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                deployment: self.deployment.clone(),
            };
            elaboration = Some(text);
            self.notify(&ctx).await
        };

        // Only a parsed 200 counts as a completed check.
        let next = CycleState {
            last_check: (succeeded && fetched.is_some()).then_some(now),
            baseline: fetched,
        };

        {
            let mut st = self.status.write().await;
            st.cycles += 1;
            st.times.last_check = next.last_check;
            st.times.last_status = status;
            st.times.wake = chrono::Duration::from_std(self.sleep)
                .ok()
                .map(|d| Utc::now() + d);
            st.phase = CyclePhase::Sleeping;
        }

        let report = CycleReport {
            cycle_id,
            status,
            fetched: fetched_count,
            novel: novel.len(),
            elaboration,
            outcome,
        };
        info!(
            "cycle done: status={:?} fetched={} new={} outcome={:?}",
            report.status, report.fetched, report.novel, report.outcome
        );
        Ok((next, report))
    }

    async fn notify(&self, ctx: &NoticeContext) -> NotifyOutcome {
        let Some(payload) = self.producer.produce(ctx) else {
            debug!("alert producer has nothing to send");
            return NotifyOutcome::NothingToSend;
        };

        let result = self.notifier.notify(&payload).await;
        let mut st = self.status.write().await;
        st.alert_counts.total += 1;
        match result {
            Ok(()) => NotifyOutcome::Delivered,
            Err(e) => {
                warn!("webhook call failed: {}", e);
                st.alert_counts.failed += 1;
                NotifyOutcome::Failed
            }
        }
    }

    /// Cycle until `shutdown` flips to `true` or authentication fails.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut shutdown = shutdown;
        let mut state = CycleState::default();

        info!(
            "watching org {} every {}",
            self.table.organization(),
            interval::duration_phrase(self.sleep)
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let (next, _report) = self.run_once(state).await?;
            state = next;

            debug!("sleeping {}", interval::duration_phrase(self.sleep));
            tokio::select! {
                _ = tokio::time::sleep(self.sleep) => {}
                _ = shutdown.wait_for(|&v| v) => break,
            }
        }

        self.set_phase(CyclePhase::Stopped).await;
        info!("watcher stopped");
        Ok(())
    }
}
