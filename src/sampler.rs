use crate::{
    snapshot::{Counter, MetricsSnapshot},
    source::{ResidentMemorySource, ResidentReading, RuntimeCounterSource, SourceFailure},
    store::SnapshotStore,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Every reportable failure from one sampling pass.
#[derive(Debug)]
pub struct SamplingError {
    failures: Vec<SourceFailure>,
}

impl SamplingError {
    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<SourceFailure> {
        self.failures
    }
}

impl fmt::Display for SamplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sample rejected ({} source failure", self.failures.len())?;
        if self.failures.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SamplingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Refreshes the shared snapshot from the runtime and the OS.
pub struct Sampler {
    store: Arc<SnapshotStore>,
    runtime: Box<dyn RuntimeCounterSource>,
    resident: Box<dyn ResidentMemorySource>,
}

impl Sampler {
    pub fn new(
        store: Arc<SnapshotStore>,
        runtime: impl RuntimeCounterSource + 'static,
        resident: impl ResidentMemorySource + 'static,
    ) -> Self {
        Self {
            store,
            runtime: Box::new(runtime),
            resident: Box::new(resident),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Take one sample and publish it, returning the committed record.
    ///
    /// The snapshot logged here is the one being replaced, not the new one.
    /// All sources are read into a fresh record; if any of them reports a
    /// failure nothing is published and the previous snapshot stays current.
    pub fn sample(&self) -> Result<MetricsSnapshot, SamplingError> {
        let previous = self.store.load();
        info!(target: "gcpulse::snapshot", "{previous}");

        let mut next = *previous;
        let mut failures = Vec::new();

        match self.resident.read_resident() {
            Ok(ResidentReading::Bytes(bytes)) => next.set_resident_bytes(bytes),
            Ok(ResidentReading::Unsupported) => next.unsupported.insert(Counter::ResidentBytes),
            Ok(ResidentReading::PageSizeUnknown) => {
                debug!("page size unknown, keeping resident_bytes={}", next.resident_bytes);
            }
            Err(err) => failures.push(err),
        }

        match self.runtime.gc_counters() {
            Ok(gc) => next.apply_gc(&gc),
            Err(err) => failures.push(err),
        }

        match self.runtime.pool_counters() {
            Ok(pool) => next.apply_pool(&pool),
            Err(err) => failures.push(err),
        }

        if !failures.is_empty() {
            return Err(SamplingError { failures });
        }

        next.sequence = previous.sequence + 1;
        self.store.publish(next);
        debug!(sequence = next.sequence, "snapshot published");
        Ok(next)
    }

    pub fn current_snapshot(&self) -> MetricsSnapshot {
        self.store.current()
    }
}
