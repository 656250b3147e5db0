pub mod demo;
pub mod logger;
pub mod periodic;
pub mod telemetry;

use crate::{
    cli::RunOptions,
    config::{Config, DEFAULT_INTERVAL_MS, DEFAULT_LOG_LEVEL},
    sampler::Sampler,
    source::{statm::DEFAULT_STATM_PATH, RuntimeCounterSource, StatmSource},
    store::SnapshotStore,
    MetricsSnapshot, Result,
};
use demo::{DemoRuntimeSource, NullRuntimeSource};
use periodic::start_periodic_export;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use telemetry::SnapshotJournal;
use tracing::{info, warn};

/// Config for the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub interval: Duration,
    pub log_level: String,
    pub log_file: Option<String>,
    pub journal_file: Option<String>,
    pub statm_path: String,
    pub samples: Option<u64>,
    pub once: bool,
    pub json: bool,
    pub demo: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            journal_file: None,
            statm_path: DEFAULT_STATM_PATH.to_string(),
            samples: None,
            once: false,
            json: false,
            demo: false,
        }
    }
}

impl AppConfig {
    /// CLI values win over the config file; the merged result is validated.
    pub fn from_sources(config: Config, opts: RunOptions) -> Result<Self> {
        let merged = Config {
            interval_ms: opts.interval_ms.unwrap_or(config.interval_ms),
            log_level: opts.log_level.unwrap_or(config.log_level),
            log_file: opts.log_file.or(config.log_file),
            journal_file: opts.journal_file.or(config.journal_file),
            statm_path: opts.statm_path.unwrap_or(config.statm_path),
        };
        merged.validate()?;
        Ok(Self {
            interval: Duration::from_millis(merged.interval_ms),
            log_level: merged.log_level,
            log_file: merged.log_file,
            journal_file: merged.journal_file,
            statm_path: merged.statm_path,
            samples: opts.samples,
            once: opts.once,
            json: opts.json,
            demo: opts.demo,
        })
    }
}

pub struct App {
    config: AppConfig,
    store: Arc<SnapshotStore>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: Arc::new(SnapshotStore::new()),
        }
    }

    pub fn from_options(opts: RunOptions) -> Result<Self> {
        let cfg_file = Config::load_or_default(opts.config.as_deref().map(Path::new))?;
        let merged = AppConfig::from_sources(cfg_file, opts)?;
        Ok(Self::new(merged))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The store this app publishes into, for in-process readers.
    pub fn store(&self) -> Arc<SnapshotStore> {
        self.store.clone()
    }

    pub fn build_sampler(&self) -> Sampler {
        let runtime: Box<dyn RuntimeCounterSource> = if self.config.demo {
            Box::new(DemoRuntimeSource::new())
        } else {
            Box::new(NullRuntimeSource)
        };
        Sampler::new(
            self.store.clone(),
            runtime,
            StatmSource::at_path(&self.config.statm_path),
        )
    }

    /// Entry point for the daemon.
    pub fn run(&self) -> Result<()> {
        logger::init_logging(&self.config.log_level, self.config.log_file.as_deref())?;
        let sampler = Arc::new(self.build_sampler());

        if self.config.once {
            let snapshot = sampler.sample()?;
            println!("{}", self.render(&snapshot)?);
            return Ok(());
        }

        info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            demo = self.config.demo,
            "starting periodic sampling"
        );
        let (handle, published) = start_periodic_export(sampler, self.config.interval)?;
        let journal = self.config.journal_file.as_ref().map(SnapshotJournal::new);
        self.export_loop(&published, journal.as_ref());
        handle.stop_and_join()
    }

    /// Export every committed record, in order, until the sample limit is hit
    /// or the sampling thread goes away.
    fn export_loop(&self, published: &Receiver<MetricsSnapshot>, journal: Option<&SnapshotJournal>) {
        for snapshot in published.iter() {
            info!(target: "gcpulse::export", "{snapshot}");
            if let Some(journal) = journal {
                if let Err(err) = journal.append(&snapshot) {
                    warn!(path = %journal.path().display(), "journal append failed: {err}");
                }
            }
            if self
                .config
                .samples
                .is_some_and(|limit| snapshot.sequence >= limit)
            {
                info!(samples = snapshot.sequence, "sample limit reached");
                return;
            }
        }
        warn!("sampling thread exited");
    }

    fn render(&self, snapshot: &MetricsSnapshot) -> Result<String> {
        if self.config.json {
            serde_json::to_string_pretty(snapshot)
                .map_err(|e| crate::Error::Parse(format!("json: {e}")))
        } else {
            Ok(format!("{snapshot:#}"))
        }
    }
}
