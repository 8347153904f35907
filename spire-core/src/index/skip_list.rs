use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::guard::Guard;

use super::internal::TaggedPtr;
use super::internal::{KeyComparator, OrdComparator, OrderedIndex, ScanDirection};

/// Cap on tower height. The geometric draw makes anything taller than
/// log2(n) vanishingly rare; the cap only bounds worst-case waste.
const MAX_HEIGHT: u32 = 32;

type NodePtr<K, V> = *mut Node<K, V>;

// =============================================================================
// SKIP INDEX STRUCTURE & DELETION PROTOCOL
// =============================================================================
//
// A tower-of-towers: the base level (level 1) is a sorted linked list holding
// every live entry; each entry extends upward into a tower of singly-linked
// nodes, one per level, so that higher levels skip over entries below.
//
// Level 3:  HEAD ──────────────────────────► 30 ────────────────────► NULL
//             │                               │
// Level 2:  HEAD ─────────► 10 ─────────────► 30 ────────────────────► NULL
//             │              │                │
// Level 1:  HEAD ─────────► 10 ─► 20 ───────► 30 ─────────► 40 ──────► NULL
//
// Every node points down to the same entry one level below and at tower_root
// to the base leaf of its tower, so the deletion status of an entry (encoded
// on the base leaf's successor) is visible from any level.
//
// The successor pointer carries two low tag bits:
//
//   mark (bit 0) - this node is logically deleted
//   flag (bit 1) - the successor of this edge is claimed for unlinking
//
// Deletion of a node runs flag -> mark -> unlink:
//
//   Step 1: CAS pred.succ: node -> node|FLAG      (claims the unlink; blocks
//                                                  inserts between pred and node)
//   Step 2: node.back_link = pred                 (escape route for helpers)
//   Step 3: CAS node.succ: next -> next|MARK      (freezes node's successor)
//   Step 4: CAS pred.succ: node|FLAG -> next      (physical unlink)
//
// Any thread that encounters a flagged edge or a marked tower completes the
// outstanding steps before proceeding; this helping is what makes every
// operation lock-free rather than merely obstruction-free. A thread whose
// predecessor gets marked under it backs out along back_link until it stands
// on a live node again.
//
// INVARIANTS:
// 1. Keys along succ are strictly increasing per level (non-decreasing when
//    duplicates are allowed)
// 2. Every non-base node's down points to a node of the same tower; the base
//    leaf's tower_root is itself
// 3. A node is marked only after its predecessor's edge to it is flagged,
//    and unlinked only after it is marked
// 4. Once marked, a node's succ is never rewritten except by the unlink CAS
// 5. The head tower is never keyed, never marked, never removed; it grows by
//    CAS on root and never shrinks
//
// =============================================================================

/// A node of the index. One struct covers all three shapes:
///
/// - head nodes (`key == None`): leftmost sentinels, one per level
/// - base leaves (`tower_root == self`): level-1 nodes carrying the value
/// - middle nodes: upper tower levels, key only
pub(crate) struct Node<K, V> {
    key: Option<K>,
    value: Option<V>,
    /// 1-indexed level this node lives at.
    level: u32,
    /// Tagged successor; the two low bits carry mark/flag.
    succ: AtomicPtr<Node<K, V>>,
    /// Same entry one level below; null at the base level.
    down: NodePtr<K, V>,
    /// Base leaf of this tower; self for base leaves, null for heads.
    tower_root: NodePtr<K, V>,
    /// Predecessor that flagged this node; written before the mark so every
    /// thread that observes the mark can follow it.
    back_link: AtomicPtr<Node<K, V>>,
    /// Head one level higher; heads only.
    up: AtomicPtr<Node<K, V>>,
}

impl<K, V> Node<K, V> {
    fn leaf(key: K, value: V) -> NodePtr<K, V> {
        let node = Box::into_raw(Box::new(Node {
            key: Some(key),
            value: Some(value),
            level: 1,
            succ: AtomicPtr::new(ptr::null_mut()),
            down: ptr::null_mut(),
            tower_root: ptr::null_mut(),
            back_link: AtomicPtr::new(ptr::null_mut()),
            up: AtomicPtr::new(ptr::null_mut()),
        }));
        // A base leaf is its own tower root.
        unsafe {
            (*node).tower_root = node;
        }
        node
    }

    fn middle(key: K, level: u32, down: NodePtr<K, V>, tower_root: NodePtr<K, V>) -> NodePtr<K, V> {
        Box::into_raw(Box::new(Node {
            key: Some(key),
            value: None,
            level,
            succ: AtomicPtr::new(ptr::null_mut()),
            down,
            tower_root,
            back_link: AtomicPtr::new(ptr::null_mut()),
            up: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    fn head(level: u32, down: NodePtr<K, V>) -> NodePtr<K, V> {
        Box::into_raw(Box::new(Node {
            key: None,
            value: None,
            level,
            succ: AtomicPtr::new(ptr::null_mut()),
            down,
            tower_root: ptr::null_mut(),
            back_link: AtomicPtr::new(ptr::null_mut()),
            up: AtomicPtr::new(ptr::null_mut()),
        }))
    }

    /// Deallocate a node.
    ///
    /// # Safety
    /// The pointer must come from `leaf`/`middle`/`head` and must not be
    /// reachable or referenced afterwards.
    pub(crate) unsafe fn dealloc_ptr(ptr: *mut Self) {
        unsafe { drop(Box::from_raw(ptr)) };
    }

    #[inline]
    fn is_head(&self) -> bool {
        self.key.is_none()
    }

    #[inline]
    fn key(&self) -> &K {
        self.key.as_ref().expect("head nodes have no key")
    }

    #[inline]
    fn value(&self) -> &V {
        self.value.as_ref().expect("only base leaves carry a value")
    }

    // =========================================================================
    // Successor accessors
    // =========================================================================

    /// Load the tagged successor (Acquire).
    #[inline]
    fn succ(&self) -> TaggedPtr<Node<K, V>> {
        TaggedPtr::new(self.succ.load(Ordering::Acquire))
    }

    /// Load the successor with tag bits stripped.
    #[inline]
    fn right(&self) -> NodePtr<K, V> {
        self.succ().as_ptr()
    }

    /// Store the successor (Release). Only used before publication.
    #[inline]
    fn set_succ(&self, ptr: NodePtr<K, V>) {
        self.succ.store(ptr, Ordering::Release);
    }

    /// CAS the successor word, tag bits included.
    #[inline]
    fn cas_succ(
        &self,
        expected: NodePtr<K, V>,
        new: NodePtr<K, V>,
    ) -> Result<NodePtr<K, V>, NodePtr<K, V>> {
        self.succ
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
    }

    #[inline]
    fn back_link(&self) -> NodePtr<K, V> {
        self.back_link.load(Ordering::Acquire)
    }

    #[inline]
    fn set_back_link(&self, pred: NodePtr<K, V>) {
        self.back_link.store(pred, Ordering::Release);
    }

    #[inline]
    fn up(&self) -> NodePtr<K, V> {
        self.up.load(Ordering::Acquire)
    }

    #[inline]
    fn set_up(&self, up: NodePtr<K, V>) {
        self.up.store(up, Ordering::Release);
    }

    /// Whether the tower this node belongs to is logically deleted, i.e. the
    /// base leaf's successor carries the mark. Must not be called on heads.
    #[inline]
    unsafe fn tower_marked(&self) -> bool {
        debug_assert!(!self.is_head());
        unsafe { (*self.tower_root).succ().is_marked() }
    }
}

/// How far a right-search slides past equal keys.
///
/// `LessOrEqual` lands on an existing equal key (unique insertion uses it so
/// the duplicate surfaces as the predecessor); `LessThan` stops at the left
/// edge of an equal-key run (duplicate-allowed insertion and deletion walk
/// the run from there).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchMode {
    LessThan,
    LessOrEqual,
}

/// Outcome of an attempt to flag an edge for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagStatus {
    /// The edge is flagged (by this call or a concurrent one).
    Flagged,
    /// The target vanished before it could be flagged.
    Deleted,
}

/// A concurrent, lock-free ordered index mapping keys to opaque values.
///
/// Point lookups, range scans, insertions, and deletions may all run
/// concurrently from any number of threads; the only synchronization
/// primitives used are atomic loads, stores, and CAS. A `unique` index
/// rejects an insert whose key already exists; a non-unique index rejects
/// only an exact (key, value) duplicate and keeps equal-keyed entries in
/// insertion order.
///
/// Reclamation of unlinked nodes is delegated to the guard type `G`; key
/// ordering to the comparator `C`.
pub struct SkipIndex<K, V, G: Guard, C: KeyComparator<K> = OrdComparator> {
    /// Level-1 head; fixed at construction, start of every scan.
    head: NodePtr<K, V>,
    /// Topmost head; grows by CAS as insertions push up, never shrinks.
    root: AtomicPtr<Node<K, V>>,
    cmp: C,
    unique: bool,
    guard: G,
}

unsafe impl<K, V, G, C> Send for SkipIndex<K, V, G, C>
where
    K: Send + Sync,
    V: Send + Sync,
    G: Guard,
    C: KeyComparator<K>,
{
}

unsafe impl<K, V, G, C> Sync for SkipIndex<K, V, G, C>
where
    K: Send + Sync,
    V: Send + Sync,
    G: Guard,
    C: KeyComparator<K>,
{
}

impl<K: Ord, V, G: Guard> SkipIndex<K, V, G, OrdComparator> {
    /// Create an index ordered by `K`'s natural ordering.
    pub fn new(unique: bool) -> Self {
        Self::with_comparator(OrdComparator, unique)
    }
}

impl<K, V, G: Guard, C: KeyComparator<K>> SkipIndex<K, V, G, C> {
    /// Create an index with an explicit key comparator.
    pub fn with_comparator(cmp: C, unique: bool) -> Self {
        let head = Node::head(1, ptr::null_mut());
        SkipIndex {
            head,
            root: AtomicPtr::new(head),
            cmp,
            unique,
            guard: G::default(),
        }
    }

    /// Current height of the head tower. Grows with the tallest tower ever
    /// inserted and never shrinks, even after all entries are deleted.
    pub fn height(&self) -> u32 {
        unsafe { (*self.root.load(Ordering::Acquire)).level }
    }
}

impl<K, V, G, C> SkipIndex<K, V, G, C>
where
    K: Clone,
    V: PartialEq,
    G: Guard,
    C: KeyComparator<K>,
{
    /// Geometric height draw, p = 1/2: one random word, count trailing ones.
    fn random_height() -> u32 {
        (1 + fastrand::u32(..).trailing_ones()).min(MAX_HEIGHT)
    }

    #[inline]
    fn precedes(&self, a: &K, b: &K, mode: SearchMode) -> bool {
        match mode {
            SearchMode::LessThan => self.cmp.compare(a, b).is_lt(),
            SearchMode::LessOrEqual => self.cmp.compare(a, b).is_le(),
        }
    }

    // =========================================================================
    // Search engine
    // =========================================================================

    /// Help complete the deletion of every successor whose tower is marked,
    /// refreshing `curr`/`next` until `next` is live or the level ends.
    ///
    /// `try_flag_node` may discover that `curr` itself got marked and back out
    /// along back-links, so `curr` can move left as well as right.
    unsafe fn help_doomed(&self, curr: &mut NodePtr<K, V>, next: &mut NodePtr<K, V>) {
        unsafe {
            while !next.is_null() && (**next).tower_marked() {
                let (pred, status, _) = self.try_flag_node(*curr, *next);
                *curr = pred;
                if status == FlagStatus::Flagged {
                    self.help_flagged(*curr, *next);
                }
                *next = (**curr).right();
            }
        }
    }

    /// Slide right from `curr` while the successor's key satisfies `mode`
    /// against `key`, assisting pending deletions along the way.
    ///
    /// Returns `(pred, succ)` where `pred` is the rightmost node whose key
    /// satisfies the mode predicate and `succ` is its live successor (tag
    /// bits stripped, possibly null). Head nodes are ordered before every
    /// key by construction; their absent key is never compared.
    unsafe fn search_right(
        &self,
        key: &K,
        mut curr: NodePtr<K, V>,
        mode: SearchMode,
    ) -> (NodePtr<K, V>, NodePtr<K, V>) {
        unsafe {
            let mut next = (*curr).right();
            loop {
                self.help_doomed(&mut curr, &mut next);
                if !next.is_null() && self.precedes((*next).key(), key, mode) {
                    curr = next;
                    next = (*curr).right();
                } else {
                    return (curr, next);
                }
            }
        }
    }

    /// Descend from the root to `level`, sliding right at every level on the
    /// way down. If `level` exceeds the current root height the search simply
    /// starts at the highest head present.
    unsafe fn search_to_level(
        &self,
        key: &K,
        level: u32,
        mode: SearchMode,
    ) -> (NodePtr<K, V>, NodePtr<K, V>) {
        unsafe {
            // Read the level from the loaded snapshot; the root pointer may
            // be growing concurrently.
            let mut curr = self.root.load(Ordering::Acquire);
            let mut curr_level = (*curr).level;
            while curr_level > level {
                let (pred, _) = self.search_right(key, curr, mode);
                curr = (*pred).down;
                curr_level -= 1;
            }
            self.search_right(key, curr, mode)
        }
    }

    // =========================================================================
    // Deletion protocol
    // =========================================================================

    /// Try to flag the edge `pred -> target` (deletion step 1).
    ///
    /// Returns the (possibly relocated) predecessor, whether the edge ended
    /// up flagged, and whether this call installed the flag. `Deleted` means
    /// `target` was unlinked out from under us.
    unsafe fn try_flag_node(
        &self,
        mut pred: NodePtr<K, V>,
        target: NodePtr<K, V>,
    ) -> (NodePtr<K, V>, FlagStatus, bool) {
        unsafe {
            let flagged = TaggedPtr::new(target).with_flag().as_raw();
            loop {
                if (*pred).succ().as_raw() == flagged {
                    return (pred, FlagStatus::Flagged, false);
                }
                match (*pred).cas_succ(target, flagged) {
                    Ok(_) => return (pred, FlagStatus::Flagged, true),
                    Err(actual) => {
                        if actual == flagged {
                            // Another thread installed the same flag.
                            return (pred, FlagStatus::Flagged, false);
                        }
                        // pred was marked or its edge advanced; back out of
                        // the marked region and relocate target.
                        while (*pred).succ().is_marked() {
                            pred = (*pred).back_link();
                        }
                        let (relocated, next) =
                            self.search_right((*target).key(), pred, SearchMode::LessThan);
                        pred = relocated;
                        if next != target {
                            return (pred, FlagStatus::Deleted, false);
                        }
                    }
                }
            }
        }
    }

    /// Complete the deletion of `del`, whose incoming edge from `pred` is
    /// flagged: publish the back-link, mark, then unlink (steps 2-4).
    unsafe fn help_flagged(&self, pred: NodePtr<K, V>, del: NodePtr<K, V>) {
        unsafe {
            (*del).set_back_link(pred);
            if !(*del).succ().is_marked() {
                self.try_mark(del);
            }
            self.help_marked(pred, del);
        }
    }

    /// Install the mark on `del`'s successor (deletion step 3).
    unsafe fn try_mark(&self, del: NodePtr<K, V>) {
        unsafe {
            loop {
                let succ = (*del).succ();
                if succ.is_marked() {
                    return;
                }
                if succ.is_flagged() {
                    // del's own successor is mid-deletion; finish that first.
                    self.help_flagged(del, succ.as_ptr());
                    continue;
                }
                let marked = succ.with_mark().as_raw();
                if (*del).cas_succ(succ.as_raw(), marked).is_ok() {
                    return;
                }
            }
        }
    }

    /// Physically unlink the marked `del` from `pred` (deletion step 4).
    /// Failure means another helper already did it.
    unsafe fn help_marked(&self, pred: NodePtr<K, V>, del: NodePtr<K, V>) {
        unsafe {
            let flagged = TaggedPtr::new(del).with_flag().as_raw();
            let right = (*del).right();
            if (*pred).cas_succ(flagged, right).is_ok() {
                // Exactly one thread wins the unlink CAS, so retirement here
                // is exactly-once. Upper tower nodes are safe to retire as
                // soon as they are unreachable; the base leaf must outlive
                // every upper node that can still reach it through
                // tower_root, so the claiming deleter retires it after its
                // upper-level sweep.
                if (*del).tower_root != del {
                    self.guard.defer_destroy(del, Node::dealloc_ptr);
                }
            }
        }
    }

    /// Run the flag step for `del` and help the deletion to completion.
    /// Returns whether this call claimed the deletion.
    unsafe fn delete_node(&self, pred: NodePtr<K, V>, del: NodePtr<K, V>) -> bool {
        unsafe {
            let (pred, status, claimed) = self.try_flag_node(pred, del);
            if status == FlagStatus::Flagged {
                self.help_flagged(pred, del);
            }
            claimed
        }
    }

    // =========================================================================
    // Insertion protocol
    // =========================================================================

    /// Walk the equal-key run starting at `(curr, next)` looking for a live
    /// entry equal to `(key, value)`. Returns `None` if one exists, otherwise
    /// the position just past the run, which is where a new duplicate-allowed
    /// entry belongs (keeping equal keys in insertion order).
    unsafe fn scan_pair(
        &self,
        mut curr: NodePtr<K, V>,
        mut next: NodePtr<K, V>,
        key: &K,
        value: &V,
    ) -> Option<(NodePtr<K, V>, NodePtr<K, V>)> {
        unsafe {
            loop {
                self.help_doomed(&mut curr, &mut next);
                if next.is_null() || self.cmp.compare((*next).key(), key).is_gt() {
                    return Some((curr, next));
                }
                if self.cmp.eq((*next).key(), key) && (*next).value() == value {
                    return None;
                }
                curr = next;
                next = (*curr).right();
            }
        }
    }

    /// Re-establish the insertion position for `new_node` at its level,
    /// starting from `pred`. Returns `None` when a duplicate blocks the
    /// insert: an equal key in the unique case, an equal (key, value) pair
    /// at the base level in the non-unique case.
    unsafe fn position_for(
        &self,
        new_node: NodePtr<K, V>,
        pred: NodePtr<K, V>,
    ) -> Option<(NodePtr<K, V>, NodePtr<K, V>)> {
        unsafe {
            let key = (*new_node).key();
            if self.unique {
                let (pred, next) = self.search_right(key, pred, SearchMode::LessOrEqual);
                if !(*pred).is_head() && self.cmp.eq((*pred).key(), key) {
                    return None;
                }
                Some((pred, next))
            } else {
                let (pred, next) = self.search_right(key, pred, SearchMode::LessThan);
                if (*new_node).tower_root == new_node {
                    self.scan_pair(pred, next, key, (*new_node).value())
                } else {
                    Some((pred, next))
                }
            }
        }
    }

    /// CAS `new_node` in between `pred` and `next`, helping and retrying
    /// until it is linked or a competing duplicate wins.
    ///
    /// Returns the final predecessor and the linked node, the latter null on
    /// duplicate preemption.
    unsafe fn insert_node(
        &self,
        new_node: NodePtr<K, V>,
        mut pred: NodePtr<K, V>,
        mut next: NodePtr<K, V>,
    ) -> (NodePtr<K, V>, NodePtr<K, V>) {
        unsafe {
            loop {
                let pred_succ = (*pred).succ();
                if pred_succ.is_flagged() {
                    // The edge we want to split is claimed by a deletion;
                    // help it finish before retrying.
                    self.help_flagged(pred, pred_succ.as_ptr());
                } else {
                    (*new_node).set_succ(next);
                    match (*pred).cas_succ(next, new_node) {
                        Ok(_) => return (pred, new_node),
                        Err(actual) => {
                            let actual = TaggedPtr::new(actual);
                            if actual.is_flagged() {
                                self.help_flagged(pred, actual.as_ptr());
                            }
                            while (*pred).succ().is_marked() {
                                pred = (*pred).back_link();
                            }
                        }
                    }
                }
                match self.position_for(new_node, pred) {
                    Some((p, n)) => {
                        pred = p;
                        next = n;
                    }
                    None => return (pred, ptr::null_mut()),
                }
            }
        }
    }

    /// Find the base-level insertion point for `(key, value)`, rejecting
    /// duplicates per the index's uniqueness mode.
    unsafe fn base_position(&self, key: &K, value: &V) -> Option<(NodePtr<K, V>, NodePtr<K, V>)> {
        unsafe {
            if self.unique {
                let (pred, next) = self.search_to_level(key, 1, SearchMode::LessOrEqual);
                if !(*pred).is_head() && self.cmp.eq((*pred).key(), key) {
                    return None;
                }
                Some((pred, next))
            } else {
                let (pred, next) = self.search_to_level(key, 1, SearchMode::LessThan);
                self.scan_pair(pred, next, key, value)
            }
        }
    }

    /// Raise the head tower until it is at least `height` levels tall.
    /// Concurrent growers race on the root CAS; losers discard and reload.
    fn grow_root(&self, height: u32) {
        let mut root = self.root.load(Ordering::Acquire);
        unsafe {
            while height > (*root).level {
                let new_root = Node::head((*root).level + 1, root);
                match self
                    .root
                    .compare_exchange(root, new_root, Ordering::AcqRel, Ordering::Acquire)
                {
                    Ok(_) => {
                        (*root).set_up(new_root);
                        root = new_root;
                    }
                    Err(current) => {
                        Node::dealloc_ptr(new_root);
                        root = current;
                    }
                }
            }
        }
    }

    /// Insert an entry. Returns `false` on a duplicate key (unique index) or
    /// duplicate (key, value) pair (non-unique index).
    pub fn insert(&self, key: K, value: V) -> bool {
        self.insert_with_height(key, value, Self::random_height())
    }

    /// Insert with a caller-chosen tower height. Deterministic-height tests
    /// drive this directly; `insert` supplies the geometric draw.
    pub(crate) fn insert_with_height(&self, key: K, value: V, height: u32) -> bool {
        debug_assert!(height >= 1);
        let _pin = G::pin();
        unsafe {
            let (pred, next) = match self.base_position(&key, &value) {
                Some(position) => position,
                None => return false,
            };

            self.grow_root(height);

            let base = Node::leaf(key, value);
            let (_, linked) = self.insert_node(base, pred, next);
            if linked.is_null() {
                // A competing identical insert got there first; the leaf was
                // never published, so it can be freed outright.
                Node::dealloc_ptr(base);
                return false;
            }

            // Build the tower bottom-up. Each level is searched afresh; the
            // entry is already live, so a concurrent delete can claim it at
            // any point of the climb.
            let mut lower = base;
            for level in 2..=height {
                if (*base).succ().is_marked() {
                    return true;
                }
                let node = Node::middle((*base).key().clone(), level, lower, base);
                let mode = if self.unique {
                    SearchMode::LessOrEqual
                } else {
                    SearchMode::LessThan
                };
                let (pred, next) = self.search_to_level((*base).key(), level, mode);
                let (linked_pred, linked) = self.insert_node(node, pred, next);
                if linked.is_null() {
                    Node::dealloc_ptr(node);
                    return true;
                }
                if (*base).succ().is_marked() {
                    // The tower died while this level was being linked; take
                    // the fresh node out again before abandoning the climb,
                    // so no upper level outlives the base leaf.
                    self.delete_node(linked_pred, linked);
                    return true;
                }
                lower = linked;
            }
            true
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Locate the entry to delete starting from the base-level LT position.
    /// Unique: the successor itself, if the key matches. Non-unique: the
    /// leftmost live node matching both key and value.
    unsafe fn locate_entry(
        &self,
        mut curr: NodePtr<K, V>,
        mut next: NodePtr<K, V>,
        key: &K,
        value: &V,
    ) -> Option<(NodePtr<K, V>, NodePtr<K, V>)> {
        unsafe {
            if self.unique {
                if next.is_null() || !self.cmp.eq((*next).key(), key) {
                    return None;
                }
                return Some((curr, next));
            }
            loop {
                self.help_doomed(&mut curr, &mut next);
                if next.is_null() || self.cmp.compare((*next).key(), key).is_gt() {
                    return None;
                }
                if self.cmp.eq((*next).key(), key) && (*next).value() == value {
                    return Some((curr, next));
                }
                curr = next;
                next = (*curr).right();
            }
        }
    }

    /// Delete one matching entry. Returns `false` if none was found or a
    /// concurrent delete claimed it first.
    pub fn delete(&self, key: &K, value: &V) -> bool {
        let _pin = G::pin();
        unsafe {
            let (pred, next) = self.search_to_level(key, 1, SearchMode::LessThan);
            let (pred, target) = match self.locate_entry(pred, next, key, value) {
                Some(found) => found,
                None => return false,
            };
            if !self.delete_node(pred, target) {
                return false;
            }
            // Sweep the dead tower's upper nodes out of levels >= 2; the
            // search's helping does the unlinking as a side effect. Levels
            // the sweep races past are cleaned lazily by later searches.
            self.search_to_level(key, 2, SearchMode::LessOrEqual);
            // Every upper node is now unlinked, so nothing can reach the
            // leaf through tower_root anymore; it is safe to retire.
            self.guard.defer_destroy(target, Node::dealloc_ptr);
            true
        }
    }

    // =========================================================================
    // Lookup & scans
    // =========================================================================

    /// Point lookup. For a non-unique index this returns the first value in
    /// insertion order among entries with this key.
    pub fn search(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let _pin = G::pin();
        unsafe {
            if self.unique {
                let (pred, _) = self.search_to_level(key, 1, SearchMode::LessOrEqual);
                if !(*pred).is_head() && self.cmp.eq((*pred).key(), key) {
                    return Some((*pred).value().clone());
                }
                None
            } else {
                let (_, next) = self.search_to_level(key, 1, SearchMode::LessThan);
                if !next.is_null() && self.cmp.eq((*next).key(), key) {
                    return Some((*next).value().clone());
                }
                None
            }
        }
    }

    /// Whether any entry with this key exists.
    pub fn contains_key(&self, key: &K) -> bool {
        let _pin = G::pin();
        unsafe {
            if self.unique {
                let (pred, _) = self.search_to_level(key, 1, SearchMode::LessOrEqual);
                !(*pred).is_head() && self.cmp.eq((*pred).key(), key)
            } else {
                let (_, next) = self.search_to_level(key, 1, SearchMode::LessThan);
                !next.is_null() && self.cmp.eq((*next).key(), key)
            }
        }
    }

    /// All live values in ascending key order.
    ///
    /// The scan is lock-free but not snapshot-consistent: entries present
    /// throughout the scan are emitted exactly once; entries inserted or
    /// deleted concurrently may or may not appear.
    pub fn scan_all(&self) -> Vec<V>
    where
        V: Clone,
    {
        let _pin = G::pin();
        let mut result = Vec::new();
        unsafe {
            let mut curr = self.head;
            let mut next = (*curr).right();
            while !next.is_null() {
                self.help_doomed(&mut curr, &mut next);
                if next.is_null() {
                    break;
                }
                result.push((*next).value().clone());
                curr = next;
                next = (*curr).right();
            }
        }
        result
    }

    /// All live values with keys in `[low, high]`, ascending.
    pub fn scan_range(&self, low: &K, high: &K, direction: ScanDirection) -> Vec<V>
    where
        V: Clone,
    {
        match direction {
            ScanDirection::Forward => {}
        }
        let _pin = G::pin();
        let mut result = Vec::new();
        unsafe {
            let (mut curr, mut next) = self.search_to_level(low, 1, SearchMode::LessThan);
            loop {
                self.help_doomed(&mut curr, &mut next);
                if next.is_null() || self.cmp.compare((*next).key(), high).is_gt() {
                    break;
                }
                result.push((*next).value().clone());
                curr = next;
                next = (*curr).right();
            }
        }
        result
    }

    /// Whether the index holds no live entries.
    pub fn is_empty(&self) -> bool {
        let _pin = G::pin();
        unsafe {
            let mut curr = self.head;
            let mut next = (*curr).right();
            self.help_doomed(&mut curr, &mut next);
            next.is_null()
        }
    }

    // =========================================================================
    // Structural validation (single-threaded)
    // =========================================================================

    /// Check every structural invariant of a quiescent index: per-level sort
    /// order, tower integrity, head-tower height, and the absence of tag
    /// bits. Panics on the first violation.
    ///
    /// Only meaningful while no other thread is operating on the index; the
    /// test suite calls it after every settled phase.
    pub fn validate(&self) {
        unsafe {
            let root = self.root.load(Ordering::Acquire);
            let root_level = (*root).level;

            // The up-chain from the base head must reach the root in exactly
            // root_level - 1 hops.
            let mut head = self.head;
            let mut height = 1;
            while !(*head).up().is_null() {
                head = (*head).up();
                height += 1;
            }
            assert_eq!(height, root_level, "head tower height != root level");
            assert_eq!(head, root, "up-chain does not end at the root");

            let mut level_head = root;
            loop {
                let level = (*level_head).level;
                let mut prev: NodePtr<K, V> = ptr::null_mut();
                let mut raw = (*level_head).succ.load(Ordering::Acquire);
                loop {
                    let tagged = TaggedPtr::new(raw);
                    assert!(
                        !tagged.is_tagged(),
                        "tagged edge in quiescent index at level {level}"
                    );
                    let node = tagged.as_ptr();
                    if node.is_null() {
                        break;
                    }
                    assert_eq!((*node).level, level, "node linked at the wrong level");
                    assert!((*node).level <= root_level, "node taller than the root");
                    if !prev.is_null() {
                        let order = self.cmp.compare((*prev).key(), (*node).key());
                        if self.unique {
                            assert!(order.is_lt(), "keys not strictly increasing");
                        } else {
                            assert!(order.is_le(), "keys not non-decreasing");
                        }
                    }
                    if level > 1 {
                        let down = (*node).down;
                        assert!(!down.is_null(), "upper node without a down link");
                        assert!(
                            self.cmp.eq((*node).key(), (*down).key()),
                            "tower changes key between levels"
                        );
                        assert_eq!(
                            (*node).tower_root,
                            (*down).tower_root,
                            "tower_root differs within a tower"
                        );
                    } else {
                        assert_eq!((*node).tower_root, node, "base leaf not its own root");
                        assert!((*node).value.is_some(), "base leaf without a value");
                    }
                    prev = node;
                    raw = (*node).succ.load(Ordering::Acquire);
                }
                if (*level_head).down.is_null() {
                    break;
                }
                level_head = (*level_head).down;
            }
        }
    }
}

impl<K, V, G: Guard, C: KeyComparator<K>> Drop for SkipIndex<K, V, G, C> {
    fn drop(&mut self) {
        // Quiescent teardown: every completed deletion finished its unlink,
        // so all still-linked nodes are live and owned by exactly one level.
        // Nodes unlinked earlier were retired through the guard, which drops
        // after this body and frees them.
        unsafe {
            let mut head = self.root.load(Ordering::Acquire);
            while !head.is_null() {
                let down = (*head).down;
                let mut curr = {
                    let succ = (*head).succ();
                    debug_assert!(!succ.is_tagged(), "tagged head edge at drop time");
                    succ.as_ptr()
                };
                while !curr.is_null() {
                    let succ = (*curr).succ();
                    debug_assert!(!succ.is_tagged(), "tagged edge at drop time");
                    let next = succ.as_ptr();
                    Node::dealloc_ptr(curr);
                    curr = next;
                }
                Node::dealloc_ptr(head);
                head = down;
            }
        }
    }
}

impl<K, V, G, C> OrderedIndex<K, V> for SkipIndex<K, V, G, C>
where
    K: Clone,
    V: Clone + PartialEq,
    G: Guard,
    C: KeyComparator<K>,
{
    fn insert(&self, key: K, value: V) -> bool {
        SkipIndex::insert(self, key, value)
    }

    fn delete(&self, key: &K, value: &V) -> bool {
        SkipIndex::delete(self, key, value)
    }

    fn search(&self, key: &K) -> Option<V> {
        SkipIndex::search(self, key)
    }

    fn contains_key(&self, key: &K) -> bool {
        SkipIndex::contains_key(self, key)
    }

    fn scan_all(&self) -> Vec<V> {
        SkipIndex::scan_all(self)
    }

    fn scan_range(&self, low: &K, high: &K, direction: ScanDirection) -> Vec<V> {
        SkipIndex::scan_range(self, low, high, direction)
    }
}

// ============================================================================
// Tests
// ============================================================================
