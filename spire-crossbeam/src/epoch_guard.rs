//! Epoch-based guard implementation using crossbeam-epoch.
//!
//! # Design
//!
//! `EpochGuard` is a zero-sized type that schedules destruction through the
//! global epoch collector. Indexes parameterized with it get epoch-based
//! reclamation:
//!
//! ```text
//! SkipIndex<K, V, EpochGuard>
//!     │
//!     └── unlinked nodes retire to crossbeam-epoch and are freed once
//!         every thread pinned at retire time has unpinned
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spire_core::SkipIndex;
//! use spire_crossbeam::EpochGuard;
//!
//! let index: SkipIndex<u64, u64, EpochGuard> = SkipIndex::new(true);
//! index.insert(42, 420);
//! index.delete(&42, &420);
//! ```

use crossbeam_epoch::{self as epoch, Guard as CrossbeamGuard};
use spire_core::guard::Guard;

/// Epoch-based memory reclamation guard.
///
/// Every index operation pins the current thread for its duration; a node
/// passed to `defer_destroy` is freed only after all threads pinned at that
/// moment have unpinned, so stale traversals can never dereference freed
/// memory.
///
/// # Performance
///
/// - **Pin overhead**: very low (thread-local check)
/// - **Reclamation**: batched, amortized O(1) per node
/// - **Memory**: may accumulate while long operations stay pinned
#[derive(Clone, Copy, Default)]
pub struct EpochGuard;

impl EpochGuard {
    pub fn new() -> Self {
        EpochGuard
    }
}

impl Guard for EpochGuard {
    /// An actual pinned crossbeam guard, held for the duration of one index
    /// operation.
    type ReadGuard = CrossbeamGuard;

    fn pin() -> Self::ReadGuard {
        epoch::pin()
    }

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        // The calling operation already holds a pin; this short-lived pin
        // just carries the deferred closure into the collector.
        let guard = epoch::pin();
        unsafe {
            guard.defer_unchecked(move || {
                dealloc(node);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defer_destroy_schedules_reclamation() {
        let guard = EpochGuard::default();

        let ptr = Box::into_raw(Box::new(42i32));
        unsafe {
            guard.defer_destroy(ptr, |p| {
                drop(Box::from_raw(p));
            });
        }
        // Freed by the global collector once all pinned threads advance.
    }

    #[test]
    fn pin_is_reentrant() {
        let _outer = EpochGuard::pin();
        let _inner = EpochGuard::pin();
    }
}
