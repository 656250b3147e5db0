use gcpulse::{
    app::{
        demo::DemoRuntimeSource,
        periodic::{spawn_sampling_loop, TickPacer},
    },
    source::{
        fake::{FakeEntry, FakeResidentSource, FakeRuntimeSource},
        GcCounters, PoolCounters, ResidentReading,
    },
    start_periodic_sampling, Sampler, SnapshotStore,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Readers hammering the store while the sampler publishes never see a record
/// whose derived waste disagrees with its own pool fields.
#[test]
fn concurrent_readers_never_observe_torn_records() {
    let store = Arc::new(SnapshotStore::new());
    let sampler = Arc::new(Sampler::new(
        store.clone(),
        DemoRuntimeSource::new(),
        FakeResidentSource::steady(ResidentReading::Bytes(4096)),
    ));
    let handle = start_periodic_sampling(sampler, Duration::from_millis(1)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicU64::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let done = done.clone();
            let reads = reads.clone();
            thread::spawn(move || {
                let mut last_sequence = 0;
                while !done.load(Ordering::Acquire) {
                    let snap = store.current();
                    assert_eq!(
                        snap.pool_wasted_bytes,
                        snap.pool_allocated_bytes.saturating_sub(snap.pool_live_bytes),
                        "torn record at sequence {}",
                        snap.sequence
                    );
                    assert!(snap.sequence >= last_sequence);
                    last_sequence = snap.sequence;
                    reads.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_micros(1));
                }
                last_sequence
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.current().sequence < 50 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    handle.stop_and_join().unwrap();

    assert!(store.current().sequence >= 50);
    assert!(reads.load(Ordering::Relaxed) > 0);
}

/// A slow runtime query delays publication but readers keep the prior record.
#[test]
fn slow_provider_does_not_block_readers() {
    let runtime = Arc::new(FakeRuntimeSource::with_script(
        vec![
            FakeEntry::immediate(Ok(GcCounters {
                malloc_count: 1,
                ..Default::default()
            })),
            FakeEntry::with_delay(
                Ok(GcCounters {
                    malloc_count: 2,
                    ..Default::default()
                }),
                Duration::from_millis(200),
            ),
        ],
        vec![FakeEntry::immediate(Ok(PoolCounters::new(64, 32)))],
    ));
    let store = Arc::new(SnapshotStore::new());
    let sampler = Arc::new(Sampler::new(
        store.clone(),
        runtime.clone(),
        FakeResidentSource::steady(ResidentReading::Unsupported),
    ));
    let (ticks, pacer) = TickPacer::channel();
    let handle = spawn_sampling_loop(sampler, pacer).unwrap();

    ticks.send(()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while store.current().sequence < 1 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(store.current().malloc_count, 1);

    ticks.send(()).unwrap();
    while runtime.gc_queries() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    let start = Instant::now();
    let during = store.current();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(during.sequence, 1);
    assert_eq!(during.malloc_count, 1);

    let deadline = Instant::now() + Duration::from_secs(2);
    while store.current().sequence < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(store.current().malloc_count, 2);
    handle.stop_and_join().unwrap();
}
