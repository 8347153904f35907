//! Concurrency stress tests shared by every guard backend.
//!
//! These verify correctness under contention: helping convergence, single
//! winners for racing deletes, and full-structure consistency after mixed
//! workloads. `validate()` runs only after all threads have joined.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use crate::SkipIndex;
use crate::guard::Guard;
use crate::index::ScanDirection;

/// Two threads insert disjoint key ranges while a third keeps deleting even
/// keys until every one of them has been removed. Afterwards the index holds
/// exactly the odd keys, in order.
pub fn test_concurrent_disjoint_inserts_with_deleter<G: Guard + 'static>(unique: bool) {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(unique));

    let mut handles = Vec::new();
    for range in [0..1000, 1000..2000] {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for k in range {
                assert!(index.insert(k, k * 10));
            }
        }));
    }

    let deleter = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            // Keep retrying: an even key may not have been inserted yet.
            let mut remaining: Vec<i32> = (0..2000).step_by(2).collect();
            while !remaining.is_empty() {
                remaining.retain(|k| !index.delete(k, &(*k * 10)));
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    deleter.join().unwrap();

    let odds: Vec<i32> = (0..2000).filter(|k| k % 2 == 1).map(|k| k * 10).collect();
    assert_eq!(index.scan_all(), odds);
    index.validate();
}

/// Racing deletes of one entry: exactly one thread wins.
pub fn test_concurrent_delete_single_winner<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(true));
    index.insert(42, 420);

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let index = Arc::clone(&index);
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                barrier.wait();
                if index.delete(&42, &420) {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::Relaxed), 1);
    assert!(!index.contains_key(&42));
    index.validate();
}

/// Racing identical pair inserts into a non-unique index: exactly one wins.
pub fn test_concurrent_duplicate_inserts_single_winner<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(false));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let wins = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let index = Arc::clone(&index);
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            thread::spawn(move || {
                barrier.wait();
                if index.insert(5, 500) {
                    wins.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::Relaxed), 1);
    assert_eq!(index.scan_all(), vec![500]);
    index.validate();
}

/// Hammer one key with insert/delete pairs from every thread; the survivors
/// must be internally consistent.
pub fn test_extreme_contention_single_key<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(true));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for _ in 0..500 {
                    index.insert(7, 70);
                    index.delete(&7, &70);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let scanned = index.scan_all();
    assert!(scanned.len() <= 1);
    assert_eq!(index.contains_key(&7), !scanned.is_empty());
    index.validate();
}

/// Readers run point lookups and range scans while writers churn; nothing
/// may crash, hang, or emit an impossible value.
pub fn test_find_during_modifications<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(true));
    let stop = Arc::new(AtomicBool::new(false));

    for k in 0..500 {
        index.insert(k * 2, k * 20);
    }

    let mut handles = Vec::new();

    for t in 0..4 {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                let k = 10_000 + t * 1000 + (i % 1000);
                if i % 2 == 0 {
                    index.insert(k, k * 10);
                } else {
                    index.delete(&k, &(k * 10));
                }
                i += 1;
            }
        }));
    }

    for _ in 0..4 {
        let index = Arc::clone(&index);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                for k in 0..1000 {
                    if let Some(v) = index.search(&k) {
                        assert_eq!(v, k * 10);
                    }
                }
                for v in index.scan_range(&0, &999, ScanDirection::Forward) {
                    assert_eq!(v % 10, 0);
                }
            }
        }));
    }

    thread::sleep(Duration::from_millis(800));
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    // The pre-populated even keys were never touched.
    for k in 0..500 {
        assert_eq!(index.search(&(k * 2)), Some(k * 20));
    }
    index.validate();
}

/// An insert must publish with release semantics: once the consumer observes
/// the flag, both the entry and the preceding store are visible.
pub fn test_memory_ordering<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(true));
    let data = Arc::new(AtomicUsize::new(0));
    let flag = Arc::new(AtomicBool::new(false));

    let producer = {
        let index = Arc::clone(&index);
        let data = Arc::clone(&data);
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            data.store(42, Ordering::Release);
            index.insert(100, 1000);
            flag.store(true, Ordering::Release);
        })
    };

    let consumer = {
        let index = Arc::clone(&index);
        let data = Arc::clone(&data);
        let flag = Arc::clone(&flag);
        thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                thread::yield_now();
            }
            assert_eq!(index.search(&100), Some(1000));
            assert_eq!(data.load(Ordering::Acquire), 42);
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
}

/// Mixed workload across overlapping ranges; every thread verifies its own
/// writes afterwards.
pub fn test_concurrent_mixed_operations<G: Guard + 'static>() {
    let index: Arc<SkipIndex<i32, i32, G>> = Arc::new(SkipIndex::new(true));
    let threads = 4;
    let per_thread = 500;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let base = t * per_thread;
                for i in 0..per_thread {
                    let k = base + i;
                    assert!(index.insert(k, k * 10));
                    if i % 5 == 0 {
                        assert!(index.delete(&k, &(k * 10)));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..threads {
        let base = t * per_thread;
        for i in 0..per_thread {
            let k = base + i;
            if i % 5 == 0 {
                assert_eq!(index.search(&k), None);
            } else {
                assert_eq!(index.search(&k), Some(k * 10));
            }
        }
    }
    index.validate();
}
