//! Deferred guard implementation for testing.
//!
//! `DeferredGuard` defers all node destruction until the guard itself is
//! dropped, which for an index happens when the index is dropped.

use std::collections::HashSet;
use std::sync::Mutex;

use super::Guard;

/// A guard that defers all node destruction until it is dropped.
///
/// Useful for testing where predictable destruction timing matters. Not
/// suitable for long-running applications: memory accumulates until the
/// owning collection drops.
///
/// # Thread Safety
///
/// Uses a `Mutex` internally to collect retired nodes from multiple threads.
pub struct DeferredGuard {
    deferred: Mutex<Vec<DeferredNode>>,
    #[cfg(debug_assertions)]
    seen: Mutex<HashSet<usize>>,
}

struct DeferredNode {
    ptr: *mut (),
    dealloc: unsafe fn(*mut ()),
}

// Safety: only the pointer and its deallocation function are stored, and all
// access is synchronized through the Mutex.
unsafe impl Send for DeferredNode {}

impl DeferredGuard {
    pub fn new() -> Self {
        DeferredGuard {
            deferred: Mutex::new(Vec::new()),
            #[cfg(debug_assertions)]
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for DeferredGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeferredGuard {
    fn drop(&mut self) {
        let nodes = self.deferred.get_mut().unwrap();

        // A pointer retired twice would be a double free; fail loudly.
        let mut seen: HashSet<usize> = HashSet::new();
        for node in nodes.iter() {
            if !seen.insert(node.ptr as usize) {
                panic!("node {:#x} retired twice", node.ptr as usize);
            }
        }

        for node in nodes.drain(..) {
            unsafe {
                (node.dealloc)(node.ptr);
            }
        }
    }
}

impl Guard for DeferredGuard {
    /// No-op: protection is provided by the collection's stored guard, which
    /// holds every retired node alive until the collection drops.
    type ReadGuard = ();

    fn pin() -> Self::ReadGuard {}

    unsafe fn defer_destroy<N>(&self, node: *mut N, dealloc: unsafe fn(*mut N)) {
        #[cfg(debug_assertions)]
        {
            let mut seen = self.seen.lock().unwrap();
            if !seen.insert(node as usize) {
                panic!("duplicate defer_destroy at {:#x}", node as usize);
            }
        }

        let node = DeferredNode {
            ptr: node as *mut (),
            dealloc: unsafe {
                std::mem::transmute::<unsafe fn(*mut N), unsafe fn(*mut ())>(dealloc)
            },
        };
        self.deferred.lock().unwrap().push(node);
    }
}
