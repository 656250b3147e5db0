//! Counter sources the sampler reads from.
//!
//! The runtime side is a narrow capability trait so the sampler never talks to
//! a managed runtime directly; the OS side lives in [`statm`].

pub mod fake;
pub mod statm;

use crate::snapshot::{Counter, CounterSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use statm::{ResidentMemorySource, ResidentReading, StatmSource};

/// The full GC counter set, as returned by one provider query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcCounters {
    pub allocd_bytes: u64,
    pub deferred_alloc_bytes: u64,
    pub freed_bytes: u64,
    pub malloc_count: u64,
    pub realloc_count: u64,
    pub pool_alloc_count: u64,
    pub big_alloc_count: u64,
    pub free_call_count: u64,
    pub total_allocd_bytes: u64,
    pub last_sweep_time_ns: u64,
    pub last_mark_time_ns: u64,
    pub total_sweep_time_ns: u64,
    pub total_sweep_page_walk_time_ns: u64,
    pub total_sweep_madvise_time_ns: u64,
    pub total_sweep_free_mallocd_time_ns: u64,
    pub total_mark_time_ns: u64,
    /// Counters the runtime cannot supply; their value is reported as zero.
    pub unsupported: CounterSet,
}

impl GcCounters {
    pub const COUNTERS: [Counter; 16] = [
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
    ];

    /// A reading where the runtime supplies none of the counters.
    pub fn all_unsupported() -> Self {
        Self {
            unsupported: Self::COUNTERS.into_iter().collect(),
            ..Default::default()
        }
    }
}

/// Pool allocator counters, queried separately from [`GcCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounters {
    pub allocated_bytes: u64,
    pub live_bytes: u64,
    pub unsupported: CounterSet,
}

impl PoolCounters {
    pub fn new(allocated_bytes: u64, live_bytes: u64) -> Self {
        Self {
            allocated_bytes,
            live_bytes,
            unsupported: CounterSet::empty(),
        }
    }

    pub fn all_unsupported() -> Self {
        Self {
            unsupported: [Counter::PoolAllocatedBytes, Counter::PoolLiveBytes]
                .into_iter()
                .collect(),
            ..Default::default()
        }
    }
}

/// A reportable failure from one counter source.
#[derive(Debug)]
pub enum SourceFailure {
    /// The OS counter file exists by convention but could not be read.
    ResidentRead { path: PathBuf, error: std::io::Error },
    /// The OS counter file did not start with an integer page count.
    ParseFailure { path: PathBuf, content: String },
    /// The runtime counter provider could not be queried.
    ProviderFailure(String),
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFailure::ResidentRead { path, error } => {
                write!(f, "failed to read {}: {error}", path.display())
            }
            SourceFailure::ParseFailure { path, content } => {
                let shown: String = content.chars().take(64).collect();
                write!(
                    f,
                    "{} does not start with a page count: {shown:?}",
                    path.display()
                )
            }
            SourceFailure::ProviderFailure(msg) => write!(f, "runtime counters unavailable: {msg}"),
        }
    }
}

impl std::error::Error for SourceFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceFailure::ResidentRead { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Capability for querying a managed runtime's GC counters.
///
/// Implementations must be fast and local; a counter the runtime cannot
/// supply is reported as zero and flagged in `unsupported` rather than
/// failing the whole query.
pub trait RuntimeCounterSource: Send + Sync {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure>;

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure>;
}

impl<T: RuntimeCounterSource + ?Sized> RuntimeCounterSource for Arc<T> {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure> {
        (**self).gc_counters()
    }

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure> {
        (**self).pool_counters()
    }
}

impl<T: RuntimeCounterSource + ?Sized> RuntimeCounterSource for Box<T> {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure> {
        (**self).gc_counters()
    }

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure> {
        (**self).pool_counters()
    }
}
