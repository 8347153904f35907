//! Guard trait for memory reclamation strategies.
//!
//! Physically unlinked skip-list nodes may still be visible to threads that
//! loaded stale pointers, so no node may be freed while any thread could
//! still dereference it. The `Guard` trait abstracts over how that is
//! guaranteed:
//!
//! ```text
//! SkipIndex<K, V, G: Guard>
//!     │
//!     ├── SkipIndex<K, V, EpochGuard>      (production, spire-crossbeam)
//!     └── SkipIndex<K, V, DeferredGuard>   (testing, defer-until-drop)
//! ```
//!
//! # Safety Contract
//!
//! Implementations must ensure that nodes passed to `defer_destroy` are not
//! freed until no thread that pinned before the call can still hold a
//! reference to them.
//!
//! # Design Note
//!
//! Guards are stored in collections and must be `Send + Sync`. The stored
//! guard schedules deferred destruction; actual thread pinning (for
//! epoch-based guards) happens per-operation via [`Guard::pin`].

mod deferred_guard;

pub use deferred_guard::DeferredGuard;

pub trait Guard: Sized + Default + Send + Sync {
    /// An active guard that protects reads for its lifetime.
    ///
    /// For epoch-based guards this holds an actual pinned epoch guard. For
    /// deferred guards it can be a unit type, since protection is provided
    /// by the collection's stored guard.
    type ReadGuard: Sized;

    /// Pin an active read guard.
    ///
    /// Every index operation pins once for its duration; nodes reached while
    /// pinned stay valid until the guard drops.
    fn pin() -> Self::ReadGuard;

    /// Schedule a node for deferred destruction.
    ///
    /// # Safety
    ///
    /// - `node` must be a valid pointer previously allocated by the collection
    /// - `node` must be unlinked from the collection (not reachable by traversal)
    /// - `dealloc` must be the correct deallocation function for `node`
    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N));
}
