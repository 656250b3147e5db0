//! Scripted counter sources for tests.

use super::{
    GcCounters, PoolCounters, ResidentMemorySource, ResidentReading, RuntimeCounterSource,
    SourceFailure,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub struct FakeEntry<T> {
    response: Result<T, SourceFailure>,
    delay: Option<Duration>,
}

impl<T> FakeEntry<T> {
    pub fn immediate(response: Result<T, SourceFailure>) -> Self {
        Self {
            response,
            delay: None,
        }
    }

    pub fn with_delay(response: Result<T, SourceFailure>, delay: Duration) -> Self {
        Self {
            response,
            delay: Some(delay),
        }
    }
}

impl<T> From<Result<T, SourceFailure>> for FakeEntry<T> {
    fn from(response: Result<T, SourceFailure>) -> Self {
        Self::immediate(response)
    }
}

/// Pops scripted responses in order; once the script runs dry the last
/// successful value is repeated.
struct Script<T: Copy> {
    entries: Mutex<VecDeque<FakeEntry<T>>>,
    last: Mutex<T>,
    calls: AtomicUsize,
}

impl<T: Copy> Script<T> {
    fn new(entries: Vec<FakeEntry<T>>, initial: T) -> Self {
        Self {
            entries: Mutex::new(entries.into()),
            last: Mutex::new(initial),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Result<T, SourceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match entry {
            Some(entry) => {
                if let Some(delay) = entry.delay {
                    std::thread::sleep(delay);
                }
                if let Ok(value) = entry.response.as_ref() {
                    *last = *value;
                }
                entry.response
            }
            None => Ok(*last),
        }
    }

    fn push(&self, entry: FakeEntry<T>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(entry);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Runtime counter provider driven by two independent scripts.
pub struct FakeRuntimeSource {
    gc: Script<GcCounters>,
    pool: Script<PoolCounters>,
}

impl Default for FakeRuntimeSource {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl FakeRuntimeSource {
    pub fn new(
        gc: Vec<Result<GcCounters, SourceFailure>>,
        pool: Vec<Result<PoolCounters, SourceFailure>>,
    ) -> Self {
        Self::with_script(
            gc.into_iter().map(FakeEntry::from).collect(),
            pool.into_iter().map(FakeEntry::from).collect(),
        )
    }

    pub fn with_script(gc: Vec<FakeEntry<GcCounters>>, pool: Vec<FakeEntry<PoolCounters>>) -> Self {
        Self {
            gc: Script::new(gc, GcCounters::default()),
            pool: Script::new(pool, PoolCounters::default()),
        }
    }

    /// Always answers with the same readings.
    pub fn steady(gc: GcCounters, pool: PoolCounters) -> Self {
        Self {
            gc: Script::new(Vec::new(), gc),
            pool: Script::new(Vec::new(), pool),
        }
    }

    pub fn push_gc(&self, response: Result<GcCounters, SourceFailure>) {
        self.gc.push(response.into());
    }

    pub fn push_pool(&self, response: Result<PoolCounters, SourceFailure>) {
        self.pool.push(response.into());
    }

    pub fn gc_queries(&self) -> usize {
        self.gc.calls()
    }

    pub fn pool_queries(&self) -> usize {
        self.pool.calls()
    }
}

impl RuntimeCounterSource for FakeRuntimeSource {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure> {
        self.gc.next()
    }

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure> {
        self.pool.next()
    }
}

/// OS resident-memory source driven by a script.
pub struct FakeResidentSource {
    script: Script<ResidentReading>,
}

impl FakeResidentSource {
    pub fn new(script: Vec<Result<ResidentReading, SourceFailure>>) -> Self {
        Self {
            script: Script::new(
                script.into_iter().map(FakeEntry::from).collect(),
                ResidentReading::Unsupported,
            ),
        }
    }

    pub fn steady(reading: ResidentReading) -> Self {
        Self {
            script: Script::new(Vec::new(), reading),
        }
    }

    pub fn push(&self, response: Result<ResidentReading, SourceFailure>) {
        self.script.push(response.into());
    }

    pub fn queries(&self) -> usize {
        self.script.calls()
    }
}

impl ResidentMemorySource for FakeResidentSource {
    fn read_resident(&self) -> Result<ResidentReading, SourceFailure> {
        self.script.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn scripts_then_repeats_last_success() {
        let first = GcCounters {
            malloc_count: 3,
            ..Default::default()
        };
        let fake = FakeRuntimeSource::new(
            vec![
                Ok(first),
                Err(SourceFailure::ProviderFailure("boom".into())),
            ],
            Vec::new(),
        );
        assert_eq!(fake.gc_counters().unwrap().malloc_count, 3);
        assert!(fake.gc_counters().is_err());
        assert_eq!(fake.gc_counters().unwrap().malloc_count, 3);
        assert_eq!(fake.gc_queries(), 3);
        assert_eq!(fake.pool_queries(), 0);
    }

    #[test]
    fn scripted_delay_respected() {
        let fake = FakeRuntimeSource::with_script(
            vec![FakeEntry::with_delay(
                Ok(GcCounters::default()),
                Duration::from_millis(5),
            )],
            Vec::new(),
        );
        let start = Instant::now();
        fake.gc_counters().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn resident_fake_defaults_to_unsupported() {
        let fake = FakeResidentSource::new(vec![Ok(ResidentReading::Bytes(8192))]);
        assert_eq!(fake.read_resident().unwrap(), ResidentReading::Bytes(8192));
        assert_eq!(fake.read_resident().unwrap(), ResidentReading::Bytes(8192));

        let fresh = FakeResidentSource::new(Vec::new());
        assert_eq!(fresh.read_resident().unwrap(), ResidentReading::Unsupported);
        assert_eq!(fresh.queries(), 1);
    }
}
