//! Tree pages and the FAST/FAIR algorithms
//!
//! A page is a fixed-capacity sorted array of (key, pointer) entries plus a
//! header. Leaf entries point at durable records, internal entries at child
//! pages; the header's `leftmost` slot is the implicit 0th child of an
//! internal node. Writers latch one page at a time; readers never latch and
//! instead rely on the `switch_counter` protocol: the counter's parity names
//! the scan direction that is safe against the mutation in flight (even =
//! forward, odd = backward), and any change of the counter across a scan
//! invalidates it.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use static_assertions::const_assert;

use crate::btree::PmTree;
use crate::key::{Key, KEY_WORDS};
use crate::page_arena::{PageArena, PageId, NULL_RAW};
use crate::record::RecordId;

/// Sizing anchor: a page holds at least this many entries.
const FANOUT_HINT: usize = 20;

const fn next_power_of_two(n: usize) -> usize {
    let mut ret = 1;
    while n > ret {
        ret <<= 1;
    }
    ret
}

/// Page footprint: the next power of two that fits the header plus
/// `FANOUT_HINT` entries.
pub const PAGE_BYTES: usize =
    next_power_of_two(std::mem::size_of::<Header>() + FANOUT_HINT * std::mem::size_of::<Entry>());

/// Entries per page, derived from the rounded footprint.
pub const CARDINALITY: usize =
    (PAGE_BYTES - std::mem::size_of::<Header>()) / std::mem::size_of::<Entry>();

const_assert!(PAGE_BYTES.is_power_of_two());
const_assert!(CARDINALITY >= FANOUT_HINT);

#[inline]
fn is_forward(counter: u32) -> bool {
    counter % 2 == 0
}

/// One (key, pointer) slot.
///
/// Key words and the pointer are individually atomic so optimistic readers
/// can race latched writers without torn reads; the `switch_counter` retry
/// loop rejects any scan that overlapped a mutation.
#[repr(C)]
pub struct Entry {
    key: [AtomicU64; KEY_WORDS],
    ptr: AtomicU64,
}

impl Entry {
    fn empty() -> Self {
        Self {
            key: std::array::from_fn(|_| AtomicU64::new(u64::MAX)),
            ptr: AtomicU64::new(NULL_RAW),
        }
    }
}

/// Per-page header.
#[repr(C)]
pub struct Header {
    /// Implicit 0th child; non-null only on internal nodes.
    leftmost: AtomicU64,
    /// Right neighbor at the same level.
    sibling: AtomicU64,
    /// Left neighbor; navigational aid for predecessor lookups, not a
    /// spanning-tree edge.
    pred: AtomicU64,
    level: AtomicU32,
    /// Parity = safe scan direction; bumped around every in-place mutation.
    switch_counter: AtomicU32,
    /// Index of the last live entry, -1 when empty.
    last_index: AtomicI32,
    /// Terminal flag: once set, no thread may store into or route through
    /// this page.
    is_deleted: AtomicBool,
    latch: Mutex<()>,
}

impl Header {
    fn empty() -> Self {
        Self {
            leftmost: AtomicU64::new(NULL_RAW),
            sibling: AtomicU64::new(NULL_RAW),
            pred: AtomicU64::new(NULL_RAW),
            level: AtomicU32::new(0),
            switch_counter: AtomicU32::new(0),
            last_index: AtomicI32::new(-1),
            is_deleted: AtomicBool::new(false),
            latch: Mutex::new(()),
        }
    }
}

/// A tree node: header plus sorted entry array, cache-line aligned.
#[repr(C, align(64))]
pub struct Page {
    hdr: Header,
    records: [Entry; CARDINALITY],
}

/// Result of a leaf-level optimistic search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafHit {
    /// Exact match resolved to a record handle.
    Record(RecordId),
    /// The key migrated right past a concurrent split; hop to the sibling.
    Sibling(PageId),
    /// Not present at this leaf.
    Miss,
}

/// Result of a latched `store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOutcome {
    /// Entry inserted; the page that received it.
    Inserted(PageId),
    /// Key already present; no mutation (the existing record is reported
    /// through the predecessor out-slot).
    Exists,
    /// The page was deleted concurrently; retry from the current root.
    Removed,
}

impl Default for Page {
    fn default() -> Self {
        Self { hdr: Header::empty(), records: std::array::from_fn(|_| Entry::empty()) }
    }
}

impl Page {
    #[inline]
    pub(crate) fn level(&self) -> u32 {
        self.hdr.level.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_level(&self, level: u32) {
        self.hdr.level.store(level, Ordering::Relaxed);
    }

    /// Leaves carry no leftmost child.
    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        self.hdr.leftmost.load(Ordering::Acquire) == NULL_RAW
    }

    #[inline]
    pub(crate) fn sibling(&self) -> Option<PageId> {
        PageId::from_raw(self.hdr.sibling.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn leftmost(&self) -> Option<PageId> {
        PageId::from_raw(self.hdr.leftmost.load(Ordering::Acquire))
    }

    #[inline]
    fn key_at(&self, i: usize) -> Key {
        Key(std::array::from_fn(|w| self.records[i].key[w].load(Ordering::Acquire)))
    }

    #[inline]
    fn set_key(&self, i: usize, key: Key) {
        for (w, word) in key.0.iter().enumerate() {
            self.records[i].key[w].store(*word, Ordering::Release);
        }
    }

    #[inline]
    fn ptr_at(&self, i: usize) -> u64 {
        self.records[i].ptr.load(Ordering::Acquire)
    }

    #[inline]
    fn set_ptr(&self, i: usize, raw: u64) {
        self.records[i].ptr.store(raw, Ordering::Release);
    }

    /// First live key; used for sibling-ownership checks.
    #[inline]
    pub(crate) fn first_key(&self) -> Key {
        self.key_at(0)
    }

    /// Seed a freshly allocated root above a split pair.
    pub(crate) fn init_root(&self, left: PageId, key: Key, right: PageId) {
        self.hdr.leftmost.store(left.to_raw(), Ordering::Release);
        self.set_key(0, key);
        self.set_ptr(0, right.to_raw());
        self.set_ptr(1, NULL_RAW);
        self.hdr.last_index.store(0, Ordering::Release);
    }

    /// Optimistic occupancy count: start from `last_index + 1`, walk in the
    /// parity direction until the null terminator, retry on counter change.
    pub(crate) fn count(&self) -> usize {
        loop {
            let before = self.hdr.switch_counter.load(Ordering::Acquire);
            let mut count = self.hdr.last_index.load(Ordering::Acquire) + 1;

            while count >= 0
                && (count as usize) < CARDINALITY
                && self.ptr_at(count as usize) != NULL_RAW
            {
                if is_forward(before) {
                    count += 1;
                } else {
                    count -= 1;
                }
            }

            if count < 0 {
                count = 0;
                while (count as usize) < CARDINALITY && self.ptr_at(count as usize) != NULL_RAW {
                    count += 1;
                }
            }

            if self.hdr.switch_counter.load(Ordering::Acquire) == before {
                return count as usize;
            }
        }
    }

    /// Last record of the left neighbor, the durable-list predecessor for
    /// any key at or below this page's smallest key.
    fn pred_last_record(&self, arena: &PageArena) -> Option<RecordId> {
        let pred = PageId::from_raw(self.hdr.pred.load(Ordering::Acquire))?;
        let page = arena.page(pred);
        let count = page.count();
        if count == 0 {
            return None;
        }
        RecordId::from_raw(page.ptr_at(count - 1))
    }

    /// Sorted in-place insert. Caller holds the latch and guarantees room.
    ///
    /// Forward parity is restored first: the forward scan's duplicate-pointer
    /// check is what tolerates the right-shift this performs. When `pred` is
    /// supplied (leaf inserts) it receives the record immediately left of the
    /// inserted key, falling back to the left neighbor's last record when the
    /// key lands in slot 0.
    fn insert_entry(
        &self,
        arena: &PageArena,
        key: Key,
        right: u64,
        num_entries: &mut usize,
        pred: Option<&mut Option<RecordId>>,
    ) {
        let counter = self.hdr.switch_counter.load(Ordering::Relaxed);
        if !is_forward(counter) {
            self.hdr.switch_counter.store(counter.wrapping_add(1), Ordering::Release);
        }

        if *num_entries == 0 {
            self.set_key(0, key);
            self.set_ptr(0, right);
            self.set_ptr(1, NULL_RAW);
            if let Some(pred) = pred {
                if let Some(last) = self.pred_last_record(arena) {
                    *pred = Some(last);
                }
            }
        } else {
            let n = *num_entries;
            // Move the terminator before shifting live entries.
            self.set_ptr(n + 1, self.ptr_at(n));

            let mut inserted = false;
            let mut slot_pred: Option<RecordId> = None;
            let mut i = n as isize - 1;
            while i >= 0 {
                let idx = i as usize;
                let k = self.key_at(idx);
                if key < k {
                    self.set_ptr(idx + 1, self.ptr_at(idx));
                    self.set_key(idx + 1, k);
                } else {
                    // Duplicate the left neighbor's pointer into the slot
                    // before the key: a forward reader that matches the new
                    // key mid-publish fails the duplicate-pointer check
                    // instead of resolving the evicted entry.
                    self.set_ptr(idx + 1, self.ptr_at(idx));
                    self.set_key(idx + 1, key);
                    self.set_ptr(idx + 1, right);
                    slot_pred = RecordId::from_raw(self.ptr_at(idx));
                    inserted = true;
                    break;
                }
                i -= 1;
            }

            if let Some(pred) = pred {
                if inserted {
                    if slot_pred.is_some() {
                        *pred = slot_pred;
                    }
                } else if let Some(last) = self.pred_last_record(arena) {
                    *pred = Some(last);
                }
            }

            if !inserted {
                // Slot 0 has no left neighbor to duplicate; park `leftmost`
                // (null on leaves) in the pointer so a mid-publish reader
                // sees an empty or self-equal slot, never the old occupant.
                self.set_ptr(0, self.hdr.leftmost.load(Ordering::Acquire));
                self.set_key(0, key);
                self.set_ptr(0, right);
            }
        }

        self.hdr.last_index.store(*num_entries as i32, Ordering::Release);
        *num_entries += 1;
    }

    /// Left-shift over `key`. Caller holds the latch. Backward parity is set
    /// first so forward readers restart instead of walking the shift. Slot 0
    /// of an internal node is refilled from `leftmost`. No sibling merge or
    /// rebalance: removal only compacts this one node.
    fn remove_entry(&self, key: Key) -> bool {
        let counter = self.hdr.switch_counter.load(Ordering::Relaxed);
        if is_forward(counter) {
            self.hdr.switch_counter.store(counter.wrapping_add(1), Ordering::Release);
        }

        let mut shift = false;
        let mut i = 0usize;
        while i < CARDINALITY - 1 && self.ptr_at(i) != NULL_RAW {
            if !shift && self.key_at(i) == key {
                let replacement =
                    if i == 0 { self.hdr.leftmost.load(Ordering::Acquire) } else { self.ptr_at(i - 1) };
                self.set_ptr(i, replacement);
                shift = true;
            }
            if shift {
                self.set_key(i, self.key_at(i + 1));
                self.set_ptr(i, self.ptr_at(i + 1));
            }
            i += 1;
        }

        if shift {
            self.hdr.last_index.fetch_sub(1, Ordering::Release);
        }
        shift
    }

    /// Latched removal of a single index entry.
    pub(crate) fn remove(&self, key: Key) -> bool {
        let _guard = self.hdr.latch.lock();
        self.remove_entry(key)
    }

    /// Insert `(key, right)` into this page — FAST in place, FAIR by split.
    ///
    /// `right` is a raw pointer-slot value: a record handle on leaves, a
    /// child page on internal nodes. With a `pred` out-slot (leaf inserts) a
    /// duplicate key reports the existing record and mutates nothing; without
    /// one (split-key propagation) a duplicate overwrites the child pointer.
    pub(crate) fn store(
        &self,
        tree: &PmTree,
        self_id: PageId,
        key: Key,
        right: u64,
        pred: Option<&mut Option<RecordId>>,
    ) -> StoreOutcome {
        let guard = self.hdr.latch.lock();

        if self.hdr.is_deleted.load(Ordering::Acquire) {
            return StoreOutcome::Removed;
        }

        let mut num_entries = self.count();

        for i in 0..num_entries {
            if self.key_at(i) == key {
                return if let Some(pred) = pred {
                    *pred = RecordId::from_raw(self.ptr_at(i));
                    StoreOutcome::Exists
                } else {
                    self.set_ptr(i, right);
                    StoreOutcome::Inserted(self_id)
                };
            }
        }

        // Ownership may have moved right since the descent.
        if let Some(sibling_id) = self.sibling() {
            let sibling = tree.arena.page(sibling_id);
            if key > sibling.first_key() {
                drop(guard);
                return sibling.store(tree, sibling_id, key, right, pred);
            }
        }

        if num_entries < CARDINALITY - 1 {
            // FAST: in-place insert, no structural change.
            self.insert_entry(&tree.arena, key, right, &mut num_entries, pred);
            StoreOutcome::Inserted(self_id)
        } else {
            // FAIR: overflow, split half the entries into a new right sibling.
            let level = self.level();
            let sibling_id = tree.arena.alloc(level);
            let sibling = tree.arena.page(sibling_id);

            let split_point = num_entries / 2;
            let split_key = self.key_at(split_point);

            let mut sibling_cnt = 0usize;
            if self.is_leaf() {
                // Leaves keep the split key in the sibling.
                for i in split_point..num_entries {
                    sibling.insert_entry(
                        &tree.arena,
                        self.key_at(i),
                        self.ptr_at(i),
                        &mut sibling_cnt,
                        None,
                    );
                }
            } else {
                // Internal nodes promote the split key; the pointer at the
                // split slot becomes the sibling's implicit 0th child.
                for i in (split_point + 1)..num_entries {
                    sibling.insert_entry(
                        &tree.arena,
                        self.key_at(i),
                        self.ptr_at(i),
                        &mut sibling_cnt,
                        None,
                    );
                }
                sibling.hdr.leftmost.store(self.ptr_at(split_point), Ordering::Release);
            }

            // Thread the sibling into the level chain.
            sibling.hdr.sibling.store(self.hdr.sibling.load(Ordering::Acquire), Ordering::Release);
            sibling.hdr.pred.store(self_id.to_raw(), Ordering::Release);
            if let Some(next_id) = sibling.sibling() {
                tree.arena.page(next_id).hdr.pred.store(sibling_id.to_raw(), Ordering::Release);
            }
            self.hdr.sibling.store(sibling_id.to_raw(), Ordering::Release);

            // Bulk mutation done: advance the counter past both parities so
            // in-flight scans retry, landing back on forward.
            let counter = self.hdr.switch_counter.load(Ordering::Relaxed);
            let bump = if is_forward(counter) { 2 } else { 1 };
            self.hdr.switch_counter.store(counter.wrapping_add(bump), Ordering::Release);
            self.set_ptr(split_point, NULL_RAW);
            self.hdr.last_index.store(split_point as i32 - 1, Ordering::Release);
            num_entries = split_point;

            tracing::trace!(page = %self_id, sibling = %sibling_id, level, %split_key, "page split");

            let target = if key < split_key {
                self.insert_entry(&tree.arena, key, right, &mut num_entries, pred);
                self_id
            } else {
                sibling.insert_entry(&tree.arena, key, right, &mut sibling_cnt, pred);
                sibling_id
            };

            // Only the thread that observes itself as the current root may
            // replace it; everyone else pushes the split key one level up.
            if tree.root_raw() == self_id.to_raw() {
                let new_root_id = tree.arena.alloc(level + 1);
                tree.arena.page(new_root_id).init_root(self_id, split_key, sibling_id);
                tree.set_new_root(new_root_id);
                drop(guard);
            } else {
                drop(guard);
                tree.insert_internal(split_key, sibling_id, level + 1);
            }

            StoreOutcome::Inserted(target)
        }
    }

    /// Route `key` to a child of this internal node, lock-free.
    pub(crate) fn route(&self, arena: &PageArena, key: Key) -> PageId {
        let mut ret;

        loop {
            let before = self.hdr.switch_counter.load(Ordering::Acquire);
            ret = NULL_RAW;

            if is_forward(before) {
                if key < self.key_at(0) {
                    let t = self.hdr.leftmost.load(Ordering::Acquire);
                    if t != self.ptr_at(0) {
                        ret = t;
                    }
                }
                if ret == NULL_RAW {
                    let mut i = 1;
                    while i < CARDINALITY && self.ptr_at(i) != NULL_RAW {
                        if key < self.key_at(i) {
                            let t = self.ptr_at(i - 1);
                            if t != self.ptr_at(i) {
                                ret = t;
                                break;
                            }
                        }
                        i += 1;
                    }
                    if ret == NULL_RAW {
                        ret = self.ptr_at(i - 1);
                    }
                }
            } else {
                let mut i = self.count() as isize - 1;
                while i >= 0 {
                    let idx = i as usize;
                    if key >= self.key_at(idx) {
                        let t = self.ptr_at(idx);
                        let left = if idx == 0 {
                            self.hdr.leftmost.load(Ordering::Acquire)
                        } else {
                            self.ptr_at(idx - 1)
                        };
                        if left != t {
                            ret = t;
                            break;
                        }
                    }
                    i -= 1;
                }
            }

            if self.hdr.switch_counter.load(Ordering::Acquire) == before {
                break;
            }
        }

        // A key that migrated right past a split not yet visible to this
        // reader belongs to the sibling.
        if let Some(sibling_id) = self.sibling() {
            if key >= arena.page(sibling_id).first_key() {
                return sibling_id;
            }
        }

        match PageId::from_raw(ret).or_else(|| self.leftmost()) {
            Some(child) => child,
            // Internal nodes always carry at least the leftmost child.
            None => unreachable!("internal page routed with no children"),
        }
    }

    /// Exact-match leaf lookup, lock-free.
    pub(crate) fn search_leaf(&self, arena: &PageArena, key: Key) -> LeafHit {
        let mut ret;

        loop {
            let before = self.hdr.switch_counter.load(Ordering::Acquire);
            ret = NULL_RAW;

            if is_forward(before) {
                let k = self.key_at(0);
                if k == key {
                    let t = self.ptr_at(0);
                    // Re-read the key to reject a slot mid-shift.
                    if t != NULL_RAW && self.key_at(0) == k {
                        ret = t;
                    }
                }
                if ret == NULL_RAW {
                    let mut i = 1;
                    while i < CARDINALITY && self.ptr_at(i) != NULL_RAW {
                        let k = self.key_at(i);
                        if k == key {
                            let t = self.ptr_at(i);
                            // A pointer equal to its left neighbor is a
                            // shift artifact, not a live entry.
                            if self.ptr_at(i - 1) != t && self.key_at(i) == k {
                                ret = t;
                                break;
                            }
                        }
                        i += 1;
                    }
                }
            } else {
                let mut i = self.count() as isize - 1;
                while i > 0 {
                    let idx = i as usize;
                    let k = self.key_at(idx);
                    if k == key {
                        let t = self.ptr_at(idx);
                        if self.ptr_at(idx - 1) != t && t != NULL_RAW && self.key_at(idx) == k {
                            ret = t;
                            break;
                        }
                    }
                    i -= 1;
                }
                if ret == NULL_RAW {
                    let k = self.key_at(0);
                    if k == key {
                        let t = self.ptr_at(0);
                        if t != NULL_RAW && self.key_at(0) == k {
                            ret = t;
                        }
                    }
                }
            }

            if self.hdr.switch_counter.load(Ordering::Acquire) == before {
                break;
            }
        }

        if let Some(record) = RecordId::from_raw(ret) {
            return LeafHit::Record(record);
        }
        if let Some(sibling_id) = self.sibling() {
            if key >= arena.page(sibling_id).first_key() {
                return LeafHit::Sibling(sibling_id);
            }
        }
        LeafHit::Miss
    }

    /// Leaf lookup that also computes the durable-list predecessor of `key`:
    /// the record holding the largest key strictly below it, whether or not
    /// `key` itself is present. Every smaller key seen during the scan
    /// replaces the candidate; a key at or below this leaf's smallest falls
    /// back to the left neighbor's last record.
    pub(crate) fn search_leaf_pred(
        &self,
        arena: &PageArena,
        key: Key,
        pred: &mut Option<RecordId>,
    ) -> LeafHit {
        let mut ret;

        loop {
            let before = self.hdr.switch_counter.load(Ordering::Acquire);
            ret = NULL_RAW;

            if is_forward(before) {
                let k = self.key_at(0);
                if key < k {
                    if let Some(last) = self.pred_last_record(arena) {
                        *pred = Some(last);
                    }
                }
                if key > k {
                    *pred = RecordId::from_raw(self.ptr_at(0));
                }
                if k == key {
                    if let Some(last) = self.pred_last_record(arena) {
                        *pred = Some(last);
                    }
                    let t = self.ptr_at(0);
                    if t != NULL_RAW && self.key_at(0) == k {
                        ret = t;
                    }
                }
                if ret == NULL_RAW {
                    let mut i = 1;
                    while i < CARDINALITY && self.ptr_at(i) != NULL_RAW {
                        let k = self.key_at(i);
                        if k < key {
                            *pred = RecordId::from_raw(self.ptr_at(i));
                        }
                        if k == key {
                            let t = self.ptr_at(i);
                            if self.ptr_at(i - 1) != t && self.key_at(i) == k {
                                ret = t;
                                break;
                            }
                        }
                        i += 1;
                    }
                }
            } else {
                let mut once = true;
                let mut i = self.count() as isize - 1;
                while i > 0 {
                    let idx = i as usize;
                    let k = self.key_at(idx);
                    let left_key = self.key_at(idx - 1);
                    if left_key < key && once {
                        *pred = RecordId::from_raw(self.ptr_at(idx - 1));
                        once = false;
                    }
                    if k == key {
                        let t = self.ptr_at(idx);
                        if self.ptr_at(idx - 1) != t && t != NULL_RAW && self.key_at(idx) == k {
                            ret = t;
                            break;
                        }
                    }
                    i -= 1;
                }
                if ret == NULL_RAW {
                    let k = self.key_at(0);
                    if key < k {
                        if let Some(last) = self.pred_last_record(arena) {
                            *pred = Some(last);
                        }
                    }
                    if key > k {
                        *pred = RecordId::from_raw(self.ptr_at(0));
                    }
                    if k == key {
                        if let Some(last) = self.pred_last_record(arena) {
                            *pred = Some(last);
                        }
                        let t = self.ptr_at(0);
                        if t != NULL_RAW && self.key_at(0) == k {
                            ret = t;
                        }
                    }
                }
            }

            if self.hdr.switch_counter.load(Ordering::Acquire) == before {
                break;
            }
        }

        if let Some(record) = RecordId::from_raw(ret) {
            return LeafHit::Record(record);
        }
        if let Some(sibling_id) = self.sibling() {
            if key >= arena.page(sibling_id).first_key() {
                return LeafHit::Sibling(sibling_id);
            }
        }
        LeafHit::Miss
    }

    /// One-line diagnostic dump of this page's live entries.
    pub(crate) fn dump(&self, self_id: PageId, out: &mut impl std::fmt::Write) {
        let kind = if self.is_leaf() { "leaf" } else { "internal" };
        let direction = if is_forward(self.hdr.switch_counter.load(Ordering::Acquire)) {
            "->"
        } else {
            "<-"
        };
        let _ = write!(
            out,
            "[{}] {} {} last_index={} dir={} |",
            self.level(),
            kind,
            self_id,
            self.hdr.last_index.load(Ordering::Acquire),
            direction,
        );
        if let Some(leftmost) = self.leftmost() {
            let _ = write!(out, " <{}>", leftmost);
        }
        let mut i = 0;
        while i < CARDINALITY && self.ptr_at(i) != NULL_RAW {
            let _ = write!(out, " {}:{:#x}", self.key_at(i), self.ptr_at(i));
            i += 1;
        }
        match self.sibling() {
            Some(s) => {
                let _ = writeln!(out, " | sib={}", s);
            }
            None => {
                let _ = writeln!(out, " | sib=-");
            }
        }
    }
}

#[cfg(test)]
impl Page {
    /// Live keys in forward order, for structural assertions.
    pub(crate) fn live_keys(&self) -> Vec<Key> {
        let count = self.count();
        (0..count).map(|i| self.key_at(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_layout_is_power_of_two_budget() {
        assert!(PAGE_BYTES.is_power_of_two());
        assert!(std::mem::size_of::<Header>() + CARDINALITY * std::mem::size_of::<Entry>()
            <= PAGE_BYTES);
        assert!(CARDINALITY >= FANOUT_HINT);
    }

    #[test]
    fn parity_names_scan_direction() {
        assert!(is_forward(0));
        assert!(!is_forward(1));
        assert!(is_forward(2));
        assert!(is_forward(u32::MAX.wrapping_add(1)));
    }

    #[test]
    fn empty_page_counts_zero() {
        let page = Page::default();
        assert_eq!(page.count(), 0);
        assert!(page.is_leaf());
    }
}
