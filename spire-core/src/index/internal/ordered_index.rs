use std::cmp::Ordering;

/// Key ordering supplied to an index at construction.
///
/// The index never requires `K: Ord` directly; all comparisons go through a
/// comparator object so that hosts with their own collation rules (composite
/// keys, descending columns) can plug them in.
pub trait KeyComparator<K>: Send + Sync {
    /// Strict weak ordering over keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;

    /// Key equality; must be consistent with [`KeyComparator::compare`].
    fn eq(&self, a: &K, b: &K) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// The natural `Ord` ordering, used when no custom comparator is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdComparator;

impl<K: Ord> KeyComparator<K> for OrdComparator {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Direction of a range scan.
///
/// Only ascending scans are supported; a `Reverse` variant is a future
/// extension and would change the traversal, not the node layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
}

/// The ordered-index facade presented to the query executor.
///
/// Two kinds of outcome only: success, or benign failure (`false` / `None`
/// for duplicate inserts and missing keys). Visibility decisions are made by
/// the caller after the index returns candidate values.
pub trait OrderedIndex<K, V: Clone> {
    /// Insert an entry. Returns `false` if the key (unique index) or the
    /// (key, value) pair (non-unique index) already exists.
    fn insert(&self, key: K, value: V) -> bool;

    /// Delete one matching entry. Returns `false` if none was found.
    fn delete(&self, key: &K, value: &V) -> bool;

    /// Point lookup; the first value in insertion order for non-unique
    /// indexes.
    fn search(&self, key: &K) -> Option<V>;

    /// Whether any entry with this key exists.
    fn contains_key(&self, key: &K) -> bool;

    /// All live values in ascending key order.
    fn scan_all(&self) -> Vec<V>;

    /// All live values with keys in `[low, high]`, in ascending order.
    fn scan_range(&self, low: &K, high: &K, direction: ScanDirection) -> Vec<V>;
}
