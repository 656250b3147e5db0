use crate::source::{GcCounters, PoolCounters, RuntimeCounterSource, SourceFailure};
use std::sync::{Mutex, PoisonError};

/// Pool occupancy cycle, as a percentage of pool bytes allocated. The last
/// entry overshoots on purpose to show the waste clamp.
const LIVE_RATIO_PERCENT: [u64; 6] = [55, 70, 85, 95, 80, 104];

/// GC cycles are simulated every this many queries.
const QUERIES_PER_COLLECTION: u64 = 4;

const POOL_PAGE_BYTES: u64 = 16 * 1024;

/// Runtime provider for hosts without a managed runtime: every counter is unsupported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRuntimeSource;

impl RuntimeCounterSource for NullRuntimeSource {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure> {
        Ok(GcCounters::all_unsupported())
    }

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure> {
        Ok(PoolCounters::all_unsupported())
    }
}

#[derive(Debug, Default)]
struct DemoState {
    queries: u64,
    gc: GcCounters,
}

/// Synthetic runtime whose counters evolve like a busy allocator.
///
/// Each `gc_counters` call advances the simulation by one step; cumulative
/// counters only grow and per-collection ones reset every few steps.
#[derive(Debug, Default)]
pub struct DemoRuntimeSource {
    state: Mutex<DemoState>,
}

impl DemoRuntimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool_for(queries: u64) -> PoolCounters {
        let pages = 64 + queries * 3;
        let allocated = pages * POOL_PAGE_BYTES;
        let ratio = LIVE_RATIO_PERCENT[(queries % LIVE_RATIO_PERCENT.len() as u64) as usize];
        PoolCounters::new(allocated, allocated / 100 * ratio)
    }
}

impl RuntimeCounterSource for DemoRuntimeSource {
    fn gc_counters(&self) -> Result<GcCounters, SourceFailure> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.queries += 1;
        let step = state.queries;
        let gc = &mut state.gc;

        let mallocs = 200 + (step % 7) * 30;
        let pool_allocs = 1_500 + (step % 5) * 120;
        let bytes = mallocs * 256 + pool_allocs * 48;

        gc.malloc_count += mallocs;
        gc.realloc_count += mallocs / 10;
        gc.pool_alloc_count += pool_allocs;
        gc.big_alloc_count += step % 3;
        gc.free_call_count += mallocs - mallocs / 4;
        gc.total_allocd_bytes += bytes;

        if step % QUERIES_PER_COLLECTION == 0 {
            let sweep = 350_000 + (step % 11) * 10_000;
            let mark = 900_000 + (step % 13) * 25_000;
            gc.freed_bytes = gc.allocd_bytes / 2;
            gc.allocd_bytes = 0;
            gc.deferred_alloc_bytes = 0;
            gc.last_sweep_time_ns = sweep;
            gc.last_mark_time_ns = mark;
            gc.total_sweep_time_ns += sweep;
            gc.total_sweep_page_walk_time_ns += sweep / 4;
            gc.total_sweep_madvise_time_ns += sweep / 10;
            gc.total_sweep_free_mallocd_time_ns += sweep / 5;
            gc.total_mark_time_ns += mark;
        } else {
            gc.allocd_bytes += bytes;
            gc.deferred_alloc_bytes += bytes / 16;
        }
        Ok(*gc)
    }

    fn pool_counters(&self) -> Result<PoolCounters, SourceFailure> {
        let queries = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queries;
        Ok(Self::pool_for(queries))
    }
}
