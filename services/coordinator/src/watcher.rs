//! Watch loop: re-runs reconciliation when the configuration changes.
//!
//! The file is polled on a fixed interval. A run is triggered on the first
//! successful load, whenever the canonical content hash changes, and
//! optionally on a periodic resync so unreachable clusters get retried.
//! A file that fails to load is logged and the last good state is kept.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use nfc_reconcile::SpecHash;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::Connector;
use crate::config::Configuration;
use crate::coordinator::{Coordinator, RunReport};

/// Watch loop settings.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Configuration document to watch.
    pub path: PathBuf,

    /// Interval between file polls.
    pub poll_interval: Duration,

    /// Re-run even without changes after this long. `None` disables resync.
    pub resync_interval: Option<Duration>,
}

/// Why a run was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Changed,
    Resync,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Initial => "initial",
            Trigger::Changed => "changed",
            Trigger::Resync => "resync",
        })
    }
}

/// What the loop remembers between polls.
#[derive(Debug, Default)]
struct WatchState {
    last_hash: Option<SpecHash>,
    last_run: Option<Instant>,
}

impl WatchState {
    fn due(&self, hash: &SpecHash, now: Instant, resync: Option<Duration>) -> Option<Trigger> {
        match (&self.last_hash, self.last_run) {
            (None, _) | (_, None) => Some(Trigger::Initial),
            (Some(last), _) if last != hash => Some(Trigger::Changed),
            (_, Some(last_run)) => {
                resync.filter(|every| now.duration_since(last_run) >= *every)?;
                Some(Trigger::Resync)
            }
        }
    }

    fn record(&mut self, hash: SpecHash, now: Instant) {
        self.last_hash = Some(hash);
        self.last_run = Some(now);
    }
}

/// Polls a configuration file and drives the coordinator.
pub struct Watcher {
    settings: WatchSettings,
    coordinator: Coordinator,
    connector: Arc<dyn Connector>,
    state: WatchState,
}

impl Watcher {
    pub fn new(settings: WatchSettings, coordinator: Coordinator, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            coordinator,
            connector,
            state: WatchState::default(),
        }
    }

    /// Run the watch loop until shutdown.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            path = %self.settings.path.display(),
            poll_interval_secs = self.settings.poll_interval.as_secs(),
            resync_interval_secs = self.settings.resync_interval.map(|d| d.as_secs()),
            "Starting watch loop"
        );

        let mut poll_interval = tokio::time::interval(self.settings.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.poll().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Watch loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Load the file once and run if a trigger is due.
    pub async fn poll(&mut self) -> Option<RunReport> {
        let configuration = match Configuration::load_from_file(&self.settings.path) {
            Ok(configuration) => configuration,
            Err(err) => {
                warn!(
                    path = %self.settings.path.display(),
                    error = %err,
                    "Failed to load configuration, will retry"
                );
                return None;
            }
        };

        let hash = configuration.spec_hash();
        let now = Instant::now();
        let Some(trigger) = self.state.due(&hash, now, self.settings.resync_interval) else {
            debug!(spec_hash = %hash, "Configuration unchanged");
            return None;
        };

        info!(trigger = %trigger, spec_hash = %hash, "Configuration triggered a run");
        let report = self
            .coordinator
            .run(&configuration, self.connector.as_ref())
            .await;
        self.state.record(hash, now);
        Some(report)
    }
}
