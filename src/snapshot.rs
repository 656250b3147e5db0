use crate::source::{GcCounters, PoolCounters};
use serde::{ser::SerializeSeq, Serialize, Serializer};
use std::fmt;

/// Reset contract a counter follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterClass {
    /// Reset by the runtime at every GC cycle.
    PerCollection,
    /// Never decreases for the lifetime of the process.
    Cumulative,
    /// Recomputed from other fields on every sample.
    Derived,
    /// Read from the operating system.
    OsObserved,
}

/// Every counter carried by a [`MetricsSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Counter {
    AllocdBytes,
    DeferredAllocBytes,
    FreedBytes,
    LastSweepTimeNs,
    LastMarkTimeNs,
    MallocCount,
    ReallocCount,
    PoolAllocCount,
    BigAllocCount,
    FreeCallCount,
    TotalAllocdBytes,
    TotalSweepTimeNs,
    TotalSweepPageWalkTimeNs,
    TotalSweepMadviseTimeNs,
    TotalSweepFreeMallocdTimeNs,
    TotalMarkTimeNs,
    PoolAllocatedBytes,
    PoolLiveBytes,
    PoolWastedBytes,
    ResidentBytes,
}

impl Counter {
    pub const ALL: [Counter; 20] = [
        Counter::AllocdBytes,
        Counter::DeferredAllocBytes,
        Counter::FreedBytes,
        Counter::LastSweepTimeNs,
        Counter::LastMarkTimeNs,
        Counter::MallocCount,
        Counter::ReallocCount,
        Counter::PoolAllocCount,
        Counter::BigAllocCount,
        Counter::FreeCallCount,
        Counter::TotalAllocdBytes,
        Counter::TotalSweepTimeNs,
        Counter::TotalSweepPageWalkTimeNs,
        Counter::TotalSweepMadviseTimeNs,
        Counter::TotalSweepFreeMallocdTimeNs,
        Counter::TotalMarkTimeNs,
        Counter::PoolAllocatedBytes,
        Counter::PoolLiveBytes,
        Counter::PoolWastedBytes,
        Counter::ResidentBytes,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::AllocdBytes => "allocd_bytes",
            Counter::DeferredAllocBytes => "deferred_alloc_bytes",
            Counter::FreedBytes => "freed_bytes",
            Counter::LastSweepTimeNs => "last_sweep_time_ns",
            Counter::LastMarkTimeNs => "last_mark_time_ns",
            Counter::MallocCount => "malloc_count",
            Counter::ReallocCount => "realloc_count",
            Counter::PoolAllocCount => "pool_alloc_count",
            Counter::BigAllocCount => "big_alloc_count",
            Counter::FreeCallCount => "free_call_count",
            Counter::TotalAllocdBytes => "total_allocd_bytes",
            Counter::TotalSweepTimeNs => "total_sweep_time_ns",
            Counter::TotalSweepPageWalkTimeNs => "total_sweep_page_walk_time_ns",
            Counter::TotalSweepMadviseTimeNs => "total_sweep_madvise_time_ns",
            Counter::TotalSweepFreeMallocdTimeNs => "total_sweep_free_mallocd_time_ns",
            Counter::TotalMarkTimeNs => "total_mark_time_ns",
            Counter::PoolAllocatedBytes => "pool_allocated_bytes",
            Counter::PoolLiveBytes => "pool_live_bytes",
            Counter::PoolWastedBytes => "pool_wasted_bytes",
            Counter::ResidentBytes => "resident_bytes",
        }
    }

    pub fn class(self) -> CounterClass {
        match self {
            Counter::AllocdBytes
            | Counter::DeferredAllocBytes
            | Counter::FreedBytes
            | Counter::LastSweepTimeNs
            | Counter::LastMarkTimeNs => CounterClass::PerCollection,
            // live bytes is a level, not a running total; it is still copied verbatim
            Counter::PoolLiveBytes => CounterClass::PerCollection,
            Counter::PoolWastedBytes => CounterClass::Derived,
            Counter::ResidentBytes => CounterClass::OsObserved,
            _ => CounterClass::Cumulative,
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compact set of counters, used to flag values a source could not supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSet(u32);

impl CounterSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, counter: Counter) {
        self.0 |= counter.bit();
    }

    pub fn remove(&mut self, counter: Counter) {
        self.0 &= !counter.bit();
    }

    pub fn contains(&self, counter: Counter) -> bool {
        self.0 & counter.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Counter> + '_ {
        Counter::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Counter> for CounterSet {
    fn from_iter<I: IntoIterator<Item = Counter>>(iter: I) -> Self {
        let mut set = CounterSet::empty();
        for counter in iter {
            set.insert(counter);
        }
        set
    }
}

impl Serialize for CounterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for counter in self.iter() {
            seq.serialize_element(counter.name())?;
        }
        seq.end()
    }
}

/// One consistent reading of the runtime GC counters and process RSS.
///
/// Records are immutable once published; the sampler builds a fresh copy and
/// swaps it in whole (see [`crate::SnapshotStore`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Number of samples committed so far; zero means never sampled.
    pub sequence: u64,

    pub allocd_bytes: u64,
    pub deferred_alloc_bytes: u64,
    pub freed_bytes: u64,
    pub last_sweep_time_ns: u64,
    pub last_mark_time_ns: u64,

    pub malloc_count: u64,
    pub realloc_count: u64,
    pub pool_alloc_count: u64,
    pub big_alloc_count: u64,
    pub free_call_count: u64,
    pub total_allocd_bytes: u64,
    pub total_sweep_time_ns: u64,
    pub total_sweep_page_walk_time_ns: u64,
    pub total_sweep_madvise_time_ns: u64,
    pub total_sweep_free_mallocd_time_ns: u64,
    pub total_mark_time_ns: u64,
    pub pool_allocated_bytes: u64,
    pub pool_live_bytes: u64,

    pub pool_wasted_bytes: u64,
    pub resident_bytes: u64,

    /// Counters whose source reported them as unavailable.
    pub unsupported: CounterSet,
}

impl MetricsSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::AllocdBytes => self.allocd_bytes,
            Counter::DeferredAllocBytes => self.deferred_alloc_bytes,
            Counter::FreedBytes => self.freed_bytes,
            Counter::LastSweepTimeNs => self.last_sweep_time_ns,
            Counter::LastMarkTimeNs => self.last_mark_time_ns,
            Counter::MallocCount => self.malloc_count,
            Counter::ReallocCount => self.realloc_count,
            Counter::PoolAllocCount => self.pool_alloc_count,
            Counter::BigAllocCount => self.big_alloc_count,
            Counter::FreeCallCount => self.free_call_count,
            Counter::TotalAllocdBytes => self.total_allocd_bytes,
            Counter::TotalSweepTimeNs => self.total_sweep_time_ns,
            Counter::TotalSweepPageWalkTimeNs => self.total_sweep_page_walk_time_ns,
            Counter::TotalSweepMadviseTimeNs => self.total_sweep_madvise_time_ns,
            Counter::TotalSweepFreeMallocdTimeNs => self.total_sweep_free_mallocd_time_ns,
            Counter::TotalMarkTimeNs => self.total_mark_time_ns,
            Counter::PoolAllocatedBytes => self.pool_allocated_bytes,
            Counter::PoolLiveBytes => self.pool_live_bytes,
            Counter::PoolWastedBytes => self.pool_wasted_bytes,
            Counter::ResidentBytes => self.resident_bytes,
        }
    }

    pub fn is_supported(&self, counter: Counter) -> bool {
        !self.unsupported.contains(counter)
    }

    /// Copy every GC counter verbatim, replacing the previous unsupported flags for them.
    pub fn apply_gc(&mut self, gc: &GcCounters) {
        self.allocd_bytes = gc.allocd_bytes;
        self.deferred_alloc_bytes = gc.deferred_alloc_bytes;
        self.freed_bytes = gc.freed_bytes;
        self.last_sweep_time_ns = gc.last_sweep_time_ns;
        self.last_mark_time_ns = gc.last_mark_time_ns;
        self.malloc_count = gc.malloc_count;
        self.realloc_count = gc.realloc_count;
        self.pool_alloc_count = gc.pool_alloc_count;
        self.big_alloc_count = gc.big_alloc_count;
        self.free_call_count = gc.free_call_count;
        self.total_allocd_bytes = gc.total_allocd_bytes;
        self.total_sweep_time_ns = gc.total_sweep_time_ns;
        self.total_sweep_page_walk_time_ns = gc.total_sweep_page_walk_time_ns;
        self.total_sweep_madvise_time_ns = gc.total_sweep_madvise_time_ns;
        self.total_sweep_free_mallocd_time_ns = gc.total_sweep_free_mallocd_time_ns;
        self.total_mark_time_ns = gc.total_mark_time_ns;
        for counter in GcCounters::COUNTERS {
            self.mark(counter, gc.unsupported.contains(counter));
        }
    }

    /// Copy the pool counters and recompute the fragmentation waste from them.
    pub fn apply_pool(&mut self, pool: &PoolCounters) {
        self.pool_allocated_bytes = pool.allocated_bytes;
        self.pool_live_bytes = pool.live_bytes;
        self.pool_wasted_bytes = fragmentation_waste(pool.allocated_bytes, pool.live_bytes);
        let allocated_missing = pool.unsupported.contains(Counter::PoolAllocatedBytes);
        let live_missing = pool.unsupported.contains(Counter::PoolLiveBytes);
        self.mark(Counter::PoolAllocatedBytes, allocated_missing);
        self.mark(Counter::PoolLiveBytes, live_missing);
        self.mark(Counter::PoolWastedBytes, allocated_missing || live_missing);
    }

    pub fn set_resident_bytes(&mut self, bytes: u64) {
        self.resident_bytes = bytes;
        self.unsupported.remove(Counter::ResidentBytes);
    }

    fn mark(&mut self, counter: Counter, unsupported: bool) {
        if unsupported {
            self.unsupported.insert(counter);
        } else {
            self.unsupported.remove(counter);
        }
    }
}

/// Bytes reserved in pool pages but not held by live objects.
///
/// Clamps to zero when `live` transiently exceeds `allocated` because the two
/// counters were read at slightly different moments.
pub fn fragmentation_waste(allocated: u64, live: u64) -> u64 {
    allocated.saturating_sub(live)
}

impl fmt::Display for MetricsSnapshot {
    /// `{}` renders a single `key=value` line, `{:#}` one counter per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternate = f.alternate();
        if alternate {
            writeln!(f, "sequence: {}", self.sequence)?;
        } else {
            write!(f, "sequence={}", self.sequence)?;
        }
        for counter in Counter::ALL {
            let value = self.get(counter);
            let suffix = if self.is_supported(counter) {
                ""
            } else {
                " (unsupported)"
            };
            if alternate {
                writeln!(f, "{}: {}{}", counter.name(), value, suffix)?;
            } else if suffix.is_empty() {
                write!(f, " {}={}", counter.name(), value)?;
            } else {
                write!(f, " {}=unsupported", counter.name())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_is_all_zero() {
        let snap = MetricsSnapshot::default();
        assert_eq!(snap.sequence, 0);
        for counter in Counter::ALL {
            assert_eq!(snap.get(counter), 0, "{counter} should start at zero");
        }
        assert!(snap.unsupported.is_empty());
    }

    #[test]
    fn waste_clamps_instead_of_wrapping() {
        assert_eq!(fragmentation_waste(4096, 1024), 3072);
        assert_eq!(fragmentation_waste(1024, 4096), 0);
        assert_eq!(fragmentation_waste(0, u64::MAX), 0);
        assert_eq!(fragmentation_waste(u64::MAX, 0), u64::MAX);
    }

    #[test]
    fn apply_pool_recomputes_waste() {
        let mut snap = MetricsSnapshot::default();
        snap.apply_pool(&PoolCounters {
            allocated_bytes: 10_000,
            live_bytes: 12_000,
            unsupported: CounterSet::empty(),
        });
        assert_eq!(snap.pool_allocated_bytes, 10_000);
        assert_eq!(snap.pool_live_bytes, 12_000);
        assert_eq!(snap.pool_wasted_bytes, 0);

        snap.apply_pool(&PoolCounters {
            allocated_bytes: 16_384,
            live_bytes: 4_096,
            unsupported: CounterSet::empty(),
        });
        assert_eq!(snap.pool_wasted_bytes, 12_288);
    }

    #[test]
    fn unsupported_flags_follow_the_latest_reading() {
        let mut snap = MetricsSnapshot::default();
        let mut gc = GcCounters::default();
        gc.unsupported.insert(Counter::DeferredAllocBytes);
        snap.apply_gc(&gc);
        assert!(!snap.is_supported(Counter::DeferredAllocBytes));
        assert!(snap.is_supported(Counter::MallocCount));

        snap.apply_gc(&GcCounters::default());
        assert!(snap.is_supported(Counter::DeferredAllocBytes));
    }

    #[test]
    fn every_counter_has_a_distinct_bit() {
        let set: CounterSet = Counter::ALL.into_iter().collect();
        assert_eq!(set.len(), Counter::ALL.len());
    }

    #[test]
    fn display_lists_every_counter() {
        let mut snap = MetricsSnapshot {
            sequence: 2,
            malloc_count: 17,
            ..Default::default()
        };
        snap.unsupported.insert(Counter::ResidentBytes);
        let line = snap.to_string();
        assert!(line.starts_with("sequence=2 "));
        assert!(line.contains(" malloc_count=17"));
        assert!(line.contains(" resident_bytes=unsupported"));
        for counter in Counter::ALL {
            assert!(line.contains(counter.name()));
        }

        let block = format!("{snap:#}");
        assert_eq!(block.lines().count(), Counter::ALL.len() + 1);
        assert!(block.contains("resident_bytes: 0 (unsupported)"));
    }

    #[test]
    fn serializes_unsupported_as_names() {
        let mut snap = MetricsSnapshot::default();
        snap.unsupported.insert(Counter::BigAllocCount);
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["unsupported"], serde_json::json!(["big_alloc_count"]));
        assert_eq!(json["resident_bytes"], 0);
    }
}
