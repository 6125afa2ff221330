//! Scheduled Jobs
//!
//! Background jobs: outbox dispatch on a short interval and retention of
//! published outbox rows once a day.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::Config;
use crate::outbox::OutboxDispatcher;
use crate::store::StoreError;

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for outbox dispatch (default: 1 second)
    pub dispatch_interval: Duration,
    /// Interval for outbox retention purge (default: 1 day)
    pub purge_interval: Duration,
    /// Published events older than this are purged (default: 7 days)
    pub retention: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_secs(1),
            purge_interval: Duration::from_secs(24 * 3600),
            retention: Duration::from_secs(168 * 3600),
        }
    }
}

impl From<&Config> for JobSchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            dispatch_interval: config.outbox_poll_interval,
            retention: config.outbox_retention,
            ..Self::default()
        }
    }
}

/// Job Scheduler - runs the outbox dispatcher and periodic maintenance
pub struct JobScheduler {
    dispatcher: OutboxDispatcher,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(dispatcher: OutboxDispatcher) -> Self {
        Self {
            dispatcher,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(dispatcher: OutboxDispatcher, config: JobSchedulerConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Start the job scheduler in the background.
    ///
    /// The loop exits when `shutdown` flips to `true`.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            dispatch_interval_ms = self.config.dispatch_interval.as_millis() as u64,
            "Job scheduler started"
        );

        let mut dispatch_interval = interval(self.config.dispatch_interval);
        dispatch_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut purge_interval = interval(self.config.purge_interval);
        purge_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = dispatch_interval.tick() => {
                    if let Err(e) = self.dispatcher.dispatch_batch().await {
                        tracing::error!(error = %e, "Outbox dispatch failed");
                    }
                }
                _ = purge_interval.tick() => {
                    if let Err(e) = self.purge().await {
                        tracing::error!(error = %e, "Outbox purge failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Job scheduler stopped");
    }

    async fn purge(&self) -> Result<u64, StoreError> {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        self.dispatcher.purge(retention).await
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.dispatcher.dispatch_batch().await {
            Ok(dispatch) => report.events_published = dispatch.published,
            Err(e) => report.errors.push(format!("Outbox dispatch: {}", e)),
        }

        match self.purge().await {
            Ok(count) => report.events_purged = count,
            Err(e) => report.errors.push(format!("Outbox purge: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub events_published: usize,
    pub events_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

// =========================================================================
// Tests
// =========================================================================
