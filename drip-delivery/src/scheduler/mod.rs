//! The trigger scheduler.
//!
//! [`Scheduler::serve`] polls for due campaigns until it receives a shutdown
//! [`Signal`]. Each poll is one [`Scheduler::run_cycle`]; when a cycle finds
//! nothing to do the scheduler sleeps for the quiescent interval.

mod cycle;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use drip_common::{Signal, config::ClientTimeouts, internal, tracing};
use drip_store::CampaignStore;
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};

pub use cycle::{CampaignResult, CycleReport};

use crate::{
    mailer::{Mailer, SmtpMailer},
    policy::ExhaustedPolicy,
    template::Links,
    tracker::CampaignTracker,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Sleep between polls when nothing was due.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::quiescent_interval_secs")]
    pub quiescent_interval_secs: u64,

    /// What to do with the rest of a cycle once a campaign runs out of
    /// contacts.
    ///
    /// Default: [`ExhaustedPolicy::EndCycle`]
    #[serde(default)]
    pub exhausted_policy: ExhaustedPolicy,

    /// How many campaigns a cycle works on at once. Sends within one
    /// campaign are always sequential.
    ///
    /// Default: 1
    #[serde(default = "defaults::max_concurrent_campaigns")]
    pub max_concurrent_campaigns: usize,

    #[serde(default)]
    pub links: Links,

    #[serde(default)]
    pub smtp_timeouts: ClientTimeouts,

    /// Name announced in EHLO.
    ///
    /// Default: `localhost`
    #[serde(default = "defaults::helo_domain")]
    pub helo_domain: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiescent_interval_secs: defaults::quiescent_interval_secs(),
            exhausted_policy: ExhaustedPolicy::default(),
            max_concurrent_campaigns: defaults::max_concurrent_campaigns(),
            links: Links::default(),
            smtp_timeouts: ClientTimeouts::default(),
            helo_domain: defaults::helo_domain(),
        }
    }
}

impl SchedulerConfig {
    pub const fn quiescent_interval(&self) -> Duration {
        Duration::from_secs(self.quiescent_interval_secs)
    }
}

mod defaults {
    pub const fn quiescent_interval_secs() -> u64 {
        30
    }

    pub const fn max_concurrent_campaigns() -> usize {
        1
    }

    pub fn helo_domain() -> String {
        "localhost".to_string()
    }
}

/// Drives campaigns through contact selection, sending, outcome recording
/// and rescheduling.
///
/// Cloning is cheap; clones share the store, the mailer and the stop flag.
#[derive(Debug, Clone)]
pub struct Scheduler {
    config: Arc<SchedulerConfig>,
    store: Arc<dyn CampaignStore>,
    mailer: Arc<dyn Mailer>,
    tracker: CampaignTracker,
    stopping: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn CampaignStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tracker: CampaignTracker::new(Arc::clone(&store)),
            store,
            mailer,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A scheduler that sends through [`SmtpMailer`] using the configured
    /// timeouts and EHLO name.
    pub fn with_smtp(config: SchedulerConfig, store: Arc<dyn CampaignStore>) -> Self {
        let mailer = SmtpMailer::new(config.smtp_timeouts.clone(), config.helo_domain.clone());
        Self::new(config, store, Arc::new(mailer))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Asks the scheduler to stop. The campaigns already in flight finish;
    /// nothing new is started.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Polls until a shutdown signal arrives.
    ///
    /// A signal received mid-cycle lets the campaigns in flight finish before
    /// the loop exits. The quiescent sleep is interrupted immediately.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(level = INFO, "Scheduler starting");

        let quiescent = self.config.quiescent_interval();

        while !self.is_stopping() {
            let cycle = self.run_cycle(Utc::now());
            tokio::pin!(cycle);

            let result = loop {
                tokio::select! {
                    result = &mut cycle => break result,
                    signal = shutdown.recv(), if !self.is_stopping() => self.on_signal(signal),
                }
            };

            let idle = match result {
                Ok(report) => {
                    if report.is_idle() {
                        tracing::debug!(due = report.due, "Nothing sent this cycle");
                    } else {
                        tracing::info!(
                            due = report.due,
                            delivered = report.delivered,
                            sent_only = report.sent_only,
                            failed = report.failed,
                            paused = report.paused,
                            errors = report.errors,
                            skipped = report.skipped,
                            "Cycle complete"
                        );
                    }
                    report.is_idle()
                }
                Err(err) => {
                    tracing::error!("{err}");
                    true
                }
            };

            if idle && !self.is_stopping() {
                tokio::select! {
                    () = tokio::time::sleep(quiescent) => {}
                    signal = shutdown.recv() => self.on_signal(signal),
                }
            }
        }

        internal!(level = INFO, "Scheduler shutdown complete");
    }

    fn on_signal(&self, signal: Result<Signal, RecvError>) {
        match signal {
            Ok(Signal::Shutdown) => {
                internal!(level = INFO, "Scheduler received shutdown signal");
            }
            Err(err) => {
                tracing::error!("Scheduler shutdown channel error: {err}");
            }
        }

        self.stop();
    }
}
