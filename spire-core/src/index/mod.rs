//! The lock-free ordered index.
//!
//! # Organization
//!
//! - [`skip_list`] - the skip-list core: node layout, search engine,
//!   insertion and deletion protocols, scans
//! - `internal` - the facade trait, comparators, and tagged-pointer algebra
//!
//! # Usage
//!
//! Indexes are generic over the guard type `G: Guard`:
//!
//! ```ignore
//! use spire_core::{DeferredGuard, SkipIndex};
//!
//! let index: SkipIndex<u64, u64, DeferredGuard> = SkipIndex::new(true);
//! index.insert(42, 420);
//! ```

pub(crate) mod internal;
pub mod skip_list;

// TaggedPtr stays pub(crate) - truly an implementation detail.
pub use internal::{KeyComparator, OrdComparator, OrderedIndex, ScanDirection};
pub use skip_list::SkipIndex;
