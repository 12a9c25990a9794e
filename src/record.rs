//! Durable record store
//!
//! A pre-reserved slab of fixed-size record slots plus the sorted singly
//! linked list that threads them together. Slots are bump-allocated and
//! never reused within a run: a record is logically deleted by unlinking,
//! not freed, matching allocators for write-once persistent media. The only
//! serialization point for list mutation is a compare-and-swap on one `next`
//! cell.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;
use static_assertions::const_assert;

use crate::key::{Key, KEY_WORDS};

/// Stored value type. Fixed 64-bit so an in-place overwrite is one atomic
/// store even with concurrent lock-free readers.
pub type Value = u64;

/// Default slab capacity in record slots.
pub const DEFAULT_RECORD_CAPACITY: usize = 1 << 20;

/// Slots reserved per allocation context refill.
const CONTEXT_CHUNK_SLOTS: usize = 4096;

/// `next` encoding of "end of list".
const NIL_NEXT: u32 = u32::MAX;

const FLAG_UPDATE: u8 = 0b01;
const FLAG_DELETE: u8 = 0b10;

/// Stable index of a record slot in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub u32);

impl RecordId {
    /// Encode for storage in a leaf-entry pointer slot (`0` = "no record").
    #[inline]
    pub fn to_raw(self) -> u64 {
        u64::from(self.0) + 1
    }

    /// Decode a leaf-entry pointer slot.
    #[inline]
    pub fn from_raw(raw: u64) -> Option<RecordId> {
        if raw == 0 {
            None
        } else {
            Some(RecordId((raw - 1) as u32))
        }
    }
}

/// One cell of the durable list.
///
/// All fields are atomic: readers traverse without locks, value overwrites
/// happen in place, and the `next` link is published by CAS.
#[repr(C)]
pub struct Record {
    key: [AtomicU64; KEY_WORDS],
    value: AtomicU64,
    next: AtomicU32,
    flags: AtomicU8,
}

// The allocation contract guarantees word-aligned slots.
const_assert!(std::mem::align_of::<Record>() % 8 == 0);

impl Record {
    fn empty() -> Self {
        Self {
            key: std::array::from_fn(|_| AtomicU64::new(0)),
            value: AtomicU64::new(0),
            next: AtomicU32::new(NIL_NEXT),
            flags: AtomicU8::new(0),
        }
    }

    /// The record's key.
    #[inline]
    pub fn key(&self) -> Key {
        Key(std::array::from_fn(|w| self.key[w].load(Ordering::Acquire)))
    }

    /// Current value.
    #[inline]
    pub fn value(&self) -> Value {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrite the value in place (existing-key upsert).
    #[inline]
    pub fn set_value(&self, value: Value) {
        self.value.store(value, Ordering::Release);
    }

    /// Successor in key order, if any.
    #[inline]
    pub fn next(&self) -> Option<RecordId> {
        match self.next.load(Ordering::Acquire) {
            NIL_NEXT => None,
            raw => Some(RecordId(raw)),
        }
    }

    /// Point this record at `next` before it is published.
    #[inline]
    pub fn set_next(&self, next: Option<RecordId>) {
        self.next.store(next.map_or(NIL_NEXT, |r| r.0), Ordering::Release);
    }

    /// The single serialization point for list mutation: swing `next` from
    /// `expected` to `new`. Returns false if another thread won the cell.
    #[inline]
    pub fn cas_next(&self, expected: Option<RecordId>, new: Option<RecordId>) -> bool {
        self.next
            .compare_exchange(
                expected.map_or(NIL_NEXT, |r| r.0),
                new.map_or(NIL_NEXT, |r| r.0),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Whether an in-place update is in flight on this record.
    #[inline]
    pub fn is_update(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_UPDATE != 0
    }

    /// Open an in-place overwrite window; concurrent linkers that would use
    /// this record as their predecessor back off until it closes.
    #[inline]
    pub fn begin_update(&self) {
        self.flags.fetch_or(FLAG_UPDATE, Ordering::AcqRel);
    }

    /// Close the overwrite window opened by [`Record::begin_update`].
    #[inline]
    pub fn end_update(&self) {
        self.flags.fetch_and(!FLAG_UPDATE, Ordering::AcqRel);
    }

    /// Whether the record was unlinked by a delete.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flags.load(Ordering::Acquire) & FLAG_DELETE != 0
    }

    /// Mark the record deleted; persisted by the caller before unlinking.
    #[inline]
    pub fn mark_deleted(&self) {
        self.flags.fetch_or(FLAG_DELETE, Ordering::AcqRel);
    }

    fn init(&self, key: Key, value: Value) {
        for (w, word) in key.0.iter().enumerate() {
            self.key[w].store(*word, Ordering::Release);
        }
        self.value.store(value, Ordering::Release);
        self.next.store(NIL_NEXT, Ordering::Release);
        self.flags.store(0, Ordering::Release);
    }
}

/// The pre-reserved record slab.
///
/// Slot 0 is the permanent list-head sentinel; it carries no key and
/// compares as smaller than every storable key.
pub struct RecordStore {
    slots: Box<[Record]>,
    /// Shared reservation cursor; contexts carve chunks from it.
    reserve_cursor: CachePadded<AtomicUsize>,
}

impl RecordStore {
    /// Reserve a slab of `capacity` record slots. Slot 0 becomes the list
    /// head sentinel.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 1, "record store needs room for the head sentinel");
        let slots: Box<[Record]> = (0..capacity).map(|_| Record::empty()).collect();
        Self { slots, reserve_cursor: CachePadded::new(AtomicUsize::new(1)) }
    }

    /// The list-head sentinel.
    #[inline]
    pub fn head(&self) -> RecordId {
        RecordId(0)
    }

    /// Resolve a record by index.
    #[inline]
    pub fn record(&self, id: RecordId) -> &Record {
        &self.slots[id.0 as usize]
    }

    /// Total slab capacity in slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Carve a fresh range out of the slab for an allocation context.
    /// Exhaustion is fatal: there is no reclamation path for a write-once
    /// region, so the process fails fast rather than limping on.
    fn reserve(&self, slots: usize) -> std::ops::Range<usize> {
        loop {
            let base = self.reserve_cursor.load(Ordering::Acquire);
            if base >= self.slots.len() {
                tracing::error!(
                    capacity = self.slots.len(),
                    "record store exhausted, no free space to alloc"
                );
                std::process::abort();
            }
            // The last chunk may be short; a slab smaller than the chunk
            // size still serves every slot it has.
            let end = usize::min(base + slots, self.slots.len());
            if self
                .reserve_cursor
                .compare_exchange(base, end, Ordering::SeqCst, Ordering::Acquire)
                .is_ok()
            {
                return base..end;
            }
        }
    }
}

/// Per-worker allocator context.
///
/// An explicit (`base`, `cursor`, `limit`) window over the shared slab,
/// refilled in chunks; every operation that may allocate takes one by
/// `&mut`, so allocation state is never ambient.
pub struct AllocContext<'store> {
    store: &'store RecordStore,
    base: usize,
    cursor: usize,
    limit: usize,
}

impl<'store> AllocContext<'store> {
    /// Create an empty context; the first allocation reserves a chunk.
    pub fn new(store: &'store RecordStore) -> Self {
        Self { store, base: 0, cursor: 0, limit: 0 }
    }

    /// Hand out a zeroed slot initialized with `key`/`value`, unlinked.
    pub fn alloc(&mut self, key: Key, value: Value) -> RecordId {
        if self.cursor == self.limit {
            let range = self.store.reserve(CONTEXT_CHUNK_SLOTS);
            self.base = range.start;
            self.cursor = range.start;
            self.limit = range.end;
        }
        let id = RecordId(self.cursor as u32);
        self.cursor += 1;
        self.store.record(id).init(key, value);
        id
    }

    /// Slots consumed by this context so far, including unused chunk tail.
    pub fn reserved(&self) -> usize {
        self.limit - self.base
    }
}
