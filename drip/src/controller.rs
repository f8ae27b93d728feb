use std::{path::Path, sync::LazyLock};

use anyhow::Context;
use chrono::Utc;
use drip_common::{Signal, internal, logging, tracing};
use drip_delivery::{CycleReport, Scheduler, SchedulerConfig};
use drip_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

/// The daemon's configuration, and the entry point that wires the store,
/// the mailer and the scheduler together.
#[derive(Debug, Default, Deserialize)]
pub struct Drip {
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Waits for SIGINT or SIGTERM, then tells everyone to shut down.
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .context("No one is listening for the shutdown signal")?;

    Ok(())
}

impl Drip {
    /// Reads a RON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub const fn store(&self) -> &StoreConfig {
        &self.store
    }

    pub const fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    async fn build_scheduler(self) -> anyhow::Result<Scheduler> {
        let store = self
            .store
            .open()
            .await
            .context("Failed to open campaign store")?;

        Ok(Scheduler::with_smtp(self.scheduler, store))
    }

    /// Runs the scheduler until SIGINT or SIGTERM. The campaigns in flight
    /// when the signal arrives are finished first; a second CTRL+C abandons
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the signal handlers
    /// cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        internal!(level = INFO, "Controller running");

        let scheduler = self.build_scheduler().await?;

        let serve = scheduler.serve(SHUTDOWN_BROADCAST.subscribe());
        tokio::pin!(serve);

        tokio::select! {
            () = &mut serve => {}
            result = shutdown() => {
                result?;
                tokio::select! {
                    () = &mut serve => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::warn!("Forced shutdown, campaigns in flight were abandoned");
                    }
                }
            }
        }

        internal!(level = INFO, "Shutting down...");

        Ok(())
    }

    /// Runs exactly one poll cycle and returns its report.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the due campaigns
    /// cannot be listed.
    pub async fn run_once(self) -> anyhow::Result<CycleReport> {
        logging::init();

        let scheduler = self.build_scheduler().await?;
        let report = scheduler.run_cycle(Utc::now()).await?;

        internal!(
            level = INFO,
            due = report.due,
            delivered = report.delivered,
            sent_only = report.sent_only,
            failed = report.failed,
            paused = report.paused,
            errors = report.errors,
            skipped = report.skipped,
            "Single cycle complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf};

    use drip_delivery::ExhaustedPolicy;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let drip: Drip = ron::from_str("()").unwrap();

        assert_eq!(drip.store(), &StoreConfig::Memory);
        assert_eq!(drip.scheduler().quiescent_interval_secs, 30);
        assert_eq!(drip.scheduler().exhausted_policy, ExhaustedPolicy::EndCycle);
    }

    #[test]
    fn test_full_config() {
        let drip: Drip = ron::from_str(
            r#"(
                store: Sqlite(path: "/var/lib/drip/drip.sqlite3"),
                scheduler: (
                    exhausted_policy: ContinueCycle,
                    max_concurrent_campaigns: 2,
                    links: (unsubscribe_url: "https://example.com/u"),
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(
            drip.store(),
            &StoreConfig::Sqlite {
                path: PathBuf::from("/var/lib/drip/drip.sqlite3")
            }
        );
        assert_eq!(drip.scheduler().max_concurrent_campaigns, 2);
        assert_eq!(drip.scheduler().links.unsubscribe_url, "https://example.com/u");
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(store: Nowhere)").unwrap();

        let err = Drip::load(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = Drip::load(Path::new("/nonexistent/drip.config.ron")).unwrap_err();
        assert!(missing.to_string().starts_with("Failed to read config from"));
    }

    #[test]
    fn test_bundled_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../drip.config.ron");
        let drip = Drip::load(&path).unwrap();

        assert!(matches!(drip.store(), StoreConfig::Sqlite { .. }));
    }
}
