//! Tree orchestration and the public index facade
//!
//! `PmTree` composes the volatile page index with the durable record list.
//! Mutations locate a leaf by lock-free descent, obtain the durable-list
//! predecessor from the leaf, mutate the list with flush-ordered CAS, and
//! then (for removals) fix up the index. Reads never latch anything: they
//! descend optimistically and dereference straight into the record store.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result, RetryReason};
use crate::key::Key;
use crate::page::{LeafHit, Page, StoreOutcome};
use crate::page_arena::{PageArena, PageId};
use crate::persist;
use crate::record::{AllocContext, RecordId, RecordStore, Value, DEFAULT_RECORD_CAPACITY};

/// Attempt bound for the durable-list insert path.
const INSERT_RETRY_LIMIT: u32 = 10;

/// Serializes diagnostic dumps across threads.
static PRINT_MTX: Mutex<()> = Mutex::new(());

/// Outcome of installing a key into a leaf.
enum Upsert {
    /// New entry; carries the durable-list predecessor for the link step.
    Fresh(Option<RecordId>),
    /// Key already indexed; carries the existing record.
    Existing(Option<RecordId>),
}

/// A concurrent ordered index over a durably sorted record list.
///
/// Shared by reference across worker threads; every worker allocates
/// records through its own [`AllocContext`].
pub struct PmTree {
    pub(crate) arena: PageArena,
    pub(crate) store: RecordStore,
    /// Current root page; replaced (never mutated in place) on growth.
    root: AtomicU32,
    /// Levels in the tree; bumped exactly when a new root is installed.
    height: AtomicU32,
}

impl PmTree {
    /// Create a tree with the default record-slab capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RECORD_CAPACITY)
    }

    /// Create a tree whose durable slab holds `record_slots` records.
    ///
    /// The slab is write-once: exhausting it terminates the process, so size
    /// it for the full run.
    pub fn with_capacity(record_slots: usize) -> Self {
        let arena = PageArena::new();
        let store = RecordStore::with_capacity(record_slots);
        let root = arena.alloc(0);
        Self { arena, store, root: AtomicU32::new(root.0), height: AtomicU32::new(1) }
    }

    /// Per-worker allocator context for this tree's record slab.
    pub fn alloc_context(&self) -> AllocContext<'_> {
        AllocContext::new(&self.store)
    }

    /// Current tree height (1 = a single leaf).
    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Acquire)
    }

    #[inline]
    fn root_id(&self) -> PageId {
        PageId(self.root.load(Ordering::Acquire))
    }

    /// Raw encoding of the current root, for split-time identity checks.
    #[inline]
    pub(crate) fn root_raw(&self) -> u64 {
        self.root_id().to_raw()
    }

    /// Install a freshly built root. Called by the split path while it still
    /// holds the old root's latch, so exactly one thread ever wins growth.
    pub(crate) fn set_new_root(&self, new_root: PageId) {
        self.root.store(new_root.0, Ordering::Release);
        let height = self.height.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(root = %new_root, height, "tree grew a level");
    }

    /// Lock-free descent to the leaf owning `key`.
    fn leaf_for(&self, key: Key) -> PageId {
        let mut id = self.root_id();
        loop {
            let page = self.arena.page(id);
            if page.is_leaf() {
                return id;
            }
            id = page.route(&self.arena, key);
        }
    }

    /// Install `(key, record)` into the owning leaf, restarting from the
    /// root if the leaf is deleted out from under us.
    fn insert_into_leaf(&self, key: Key, record: RecordId) -> Upsert {
        loop {
            let id = self.leaf_for(key);
            let mut pred = None;
            match self.arena.page(id).store(self, id, key, record.to_raw(), Some(&mut pred)) {
                StoreOutcome::Inserted(_) => return Upsert::Fresh(pred),
                StoreOutcome::Exists => return Upsert::Existing(pred),
                StoreOutcome::Removed => continue,
            }
        }
    }

    /// Push a split key into the index at `level`, re-descending from the
    /// current root (no parent pointers are kept). A `level` above the
    /// current root means the root split raced us and already covers it.
    pub(crate) fn insert_internal(&self, key: Key, right: PageId, level: u32) {
        loop {
            let mut id = self.root_id();
            let mut page = self.arena.page(id);
            if level > page.level() {
                return;
            }
            while page.level() > level {
                id = page.route(&self.arena, key);
                page = self.arena.page(id);
            }
            match page.store(self, id, key, right.to_raw(), None) {
                StoreOutcome::Inserted(_) => return,
                StoreOutcome::Removed => continue,
                // Without a predecessor out-slot a duplicate overwrites in
                // place and reports Inserted.
                StoreOutcome::Exists => return,
            }
        }
    }

    /// Leaf lookup that also yields the durable-list predecessor, hopping
    /// right while the scan reports a racing split.
    fn search_leaf_with_pred(&self, key: Key) -> (Option<RecordId>, Option<RecordId>) {
        let mut id = self.leaf_for(key);
        let mut pred = None;
        loop {
            match self.arena.page(id).search_leaf_pred(&self.arena, key, &mut pred) {
                LeafHit::Record(record) => return (Some(record), pred),
                LeafHit::Sibling(sibling) => id = sibling,
                LeafHit::Miss => return (None, pred),
            }
        }
    }

    /// Upsert `key` with `value`.
    ///
    /// An existing key is overwritten in place (and flushed). A new key is
    /// indexed first, then linked into the durable list with a bounded CAS
    /// loop: the record is flushed before the link that publishes it, the
    /// predecessor cell after. [`Error::RetriesExhausted`] is the safety
    /// valve when the link window keeps moving.
    pub fn insert(&self, ctx: &mut AllocContext<'_>, key: Key, value: Value) -> Result<()> {
        let record = ctx.alloc(key, value);

        let pred = match self.insert_into_leaf(key, record) {
            Upsert::Existing(prev) => {
                if let Some(prev) = prev {
                    // Raise the update flag across the overwrite so a racing
                    // linker never publishes through this record before the
                    // new value is durable.
                    let prev_rec = self.store.record(prev);
                    prev_rec.begin_update();
                    prev_rec.set_value(value);
                    persist::persist(prev_rec);
                    prev_rec.end_update();
                    return Ok(());
                }
                None
            }
            Upsert::Fresh(pred) => pred,
        };

        self.link_record(key, record, pred)
    }

    /// The durable sorted-insert protocol.
    fn link_record(&self, key: Key, record: RecordId, mut pred: Option<RecordId>) -> Result<()> {
        let head = self.store.head();
        let mut attempts: u32 = 0;
        let mut reason: Option<RetryReason> = None;
        let mut stale = false;

        loop {
            attempts += 1;
            if attempts > INSERT_RETRY_LIMIT && reason == Some(RetryReason::ViewChanged) {
                tracing::debug!(%key, attempts, "durable-list insert exhausted its retries");
                return Err(Error::RetriesExhausted {
                    attempts: attempts - 1,
                    reason: RetryReason::ViewChanged,
                });
            }
            if stale {
                // The list moved; recompute the predecessor from the index.
                let (found, fresh_pred) = self.search_leaf_with_pred(key);
                if found.is_none() {
                    tracing::debug!(%key, "key vanished while linking");
                    return Err(Error::KeyNotFound);
                }
                pred = fresh_pred;
            }
            stale = true;

            let head_rec = self.store.record(head);
            if head_rec.next().is_some() {
                // The head sentinel stands in when the key is the smallest.
                let prev = pred.unwrap_or(head);
                let prev_rec = self.store.record(prev);
                if prev_rec.is_update() {
                    reason = Some(RetryReason::DuplicateContended);
                    continue;
                }

                let next = prev_rec.next();
                let new_rec = self.store.record(record);
                new_rec.set_next(next);
                persist::persist(new_rec);

                let ordered = (prev == head || prev_rec.key() < key)
                    && next.map_or(true, |n| self.store.record(n).key() > key);
                if !ordered {
                    reason = Some(RetryReason::ViewChanged);
                    continue;
                }
                if !prev_rec.cas_next(next, Some(record)) {
                    reason = Some(RetryReason::CasLost);
                    continue;
                }
                persist::persist(prev_rec);
                return Ok(());
            } else {
                // First insert ever: publish through the head sentinel.
                let new_rec = self.store.record(record);
                new_rec.set_next(None);
                persist::persist(new_rec);
                if head_rec.cas_next(None, Some(record)) {
                    persist::persist(head_rec);
                    return Ok(());
                }
                reason = Some(RetryReason::CasLost);
            }
        }
    }

    /// Point lookup. Lock-free; never blocks writers.
    pub fn search(&self, key: Key) -> Option<Value> {
        let mut id = self.leaf_for(key);
        loop {
            match self.arena.page(id).search_leaf(&self.arena, key) {
                LeafHit::Record(record) => return Some(self.store.record(record).value()),
                LeafHit::Sibling(sibling) => id = sibling,
                LeafHit::Miss => return None,
            }
        }
    }

    /// Remove `key`. Returns false when the key is not present (a normal
    /// negative result, not an error).
    ///
    /// Order of operations: mark and flush the record, CAS the predecessor's
    /// link past it, flush the predecessor, then drop the index entry under
    /// the leaf latch. A stale predecessor view re-descends and retries.
    pub fn remove(&self, key: Key) -> bool {
        loop {
            let (found, pred) = self.search_leaf_with_pred(key);
            let Some(cur) = found else {
                tracing::debug!(%key, "remove: key not found");
                return false;
            };

            let prev = pred.unwrap_or_else(|| self.store.head());
            let prev_rec = self.store.record(prev);
            if prev_rec.next() != Some(cur) {
                // The list changed between the index lookup and here.
                continue;
            }

            let cur_rec = self.store.record(cur);
            cur_rec.mark_deleted();
            persist::persist(cur_rec);

            let next = cur_rec.next();
            if !prev_rec.cas_next(Some(cur), next) {
                continue;
            }
            persist::persist(prev_rec);

            self.tree_delete(key);
            return true;
        }
    }

    /// Remove the index entry for `key`, retrying from the root whenever the
    /// latched removal loses to a structural change. Ends quietly if the
    /// entry is already gone.
    fn tree_delete(&self, key: Key) {
        loop {
            let mut id = self.leaf_for(key);
            let mut page = self.arena.page(id);

            let found = loop {
                match page.search_leaf(&self.arena, key) {
                    LeafHit::Record(_) => break true,
                    LeafHit::Sibling(sibling) => {
                        id = sibling;
                        page = self.arena.page(id);
                    }
                    LeafHit::Miss => break false,
                }
            };
            if !found {
                tracing::debug!(%key, "index entry already removed");
                return;
            }
            if page.remove(key) {
                return;
            }
            // Lost to a concurrent split or removal; take it from the top.
        }
    }

    /// Volatile footprint: every page reachable from the root via the
    /// leftmost spine and each level's sibling chain.
    pub fn memory_used(&self) -> usize {
        let mut pages = 0usize;
        let mut level_head = Some(self.root_id());
        while let Some(head) = level_head {
            level_head = self.arena.page(head).leftmost();
            let mut cursor = Some(head);
            while let Some(id) = cursor {
                pages += 1;
                cursor = self.arena.page(id).sibling();
            }
        }
        pages * std::mem::size_of::<Page>()
    }

    /// Durable footprint: every record reachable from the list head,
    /// sentinel included.
    pub fn persistent_memory_used(&self) -> usize {
        let mut records = 0usize;
        let mut cursor = Some(self.store.head());
        while let Some(id) = cursor {
            records += 1;
            cursor = self.store.record(id).next();
        }
        records * std::mem::size_of::<crate::record::Record>()
    }

    /// Dump every page, level by level, behind the process-wide print mutex
    /// so concurrent dumps never interleave.
    pub fn print_all(&self) {
        use std::fmt::Write as _;

        let _guard = PRINT_MTX.lock();
        let mut out = String::new();
        let mut total_keys = 0usize;

        let _ = writeln!(out, "root: {}", self.root_id());
        let mut level_head = Some(self.root_id());
        while let Some(head) = level_head {
            level_head = self.arena.page(head).leftmost();
            let mut cursor = Some(head);
            while let Some(id) = cursor {
                let page = self.arena.page(id);
                if page.is_leaf() {
                    total_keys += page.count();
                }
                page.dump(id, &mut out);
                cursor = page.sibling();
            }
            out.push_str("-----------------------------------------\n");
        }
        let _ = writeln!(out, "total number of keys: {total_keys}");
        print!("{out}");
    }

    /// Dump the durable list in link order, behind the print mutex.
    pub fn print_list(&self) {
        use std::fmt::Write as _;

        let _guard = PRINT_MTX.lock();
        let mut out = String::new();
        let mut cursor = self.store.record(self.store.head()).next();
        let mut position = 0usize;
        while let Some(id) = cursor {
            let record = self.store.record(id);
            let _ = writeln!(
                out,
                "node={position} key={} value={} update={} deleted={}",
                record.key(),
                record.value(),
                record.is_update(),
                record.is_deleted(),
            );
            cursor = record.next();
            position += 1;
        }
        print!("{out}");
    }
}

impl Default for PmTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl PmTree {
    /// All leaf-level keys in sibling-chain order.
    pub(crate) fn leaf_keys(&self) -> Vec<Key> {
        let mut id = self.root_id();
        let mut page = self.arena.page(id);
        while let Some(leftmost) = page.leftmost() {
            id = leftmost;
            page = self.arena.page(id);
        }
        let mut keys = Vec::new();
        loop {
            keys.extend(page.live_keys());
            match page.sibling() {
                Some(sibling) => {
                    id = sibling;
                    page = self.arena.page(id);
                }
                None => return keys,
            }
        }
    }

    /// Durable-list keys in link order, sentinel excluded.
    pub(crate) fn list_keys(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        let mut cursor = self.store.record(self.store.head()).next();
        while let Some(id) = cursor {
            let record = self.store.record(id);
            keys.push(record.key());
            cursor = record.next();
            assert!(keys.len() <= self.store.capacity(), "durable list has a cycle");
        }
        keys
    }
}
