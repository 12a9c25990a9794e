//! Arena of tree pages
//!
//! Pages are owned by the arena and referred to by stable `PageId` slot
//! indices; sibling and predecessor relations inside pages are index-valued,
//! never owning. The arena only grows: pages retired by structural changes
//! are abandoned, not reclaimed, so an index handed out once stays valid for
//! the lifetime of the arena.

use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::page::Page;

/// Pages per chunk; chunks are allocated on demand.
const CHUNK_PAGES: usize = 1024;

/// Upper bound on the chunk table. Exceeding it means the volatile index
/// outgrew the process budget and allocation fails fast.
const MAX_CHUNKS: usize = 4096;

/// Stable index of a page slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub u32);

/// Raw encoding of "no node" in pointer slots.
pub const NULL_RAW: u64 = 0;

impl PageId {
    /// Encode for storage in a pointer slot (`0` is reserved for "no node").
    #[inline]
    pub fn to_raw(self) -> u64 {
        u64::from(self.0) + 1
    }

    /// Decode a pointer slot; `None` for the null sentinel.
    #[inline]
    pub fn from_raw(raw: u64) -> Option<PageId> {
        if raw == NULL_RAW {
            None
        } else {
            Some(PageId((raw - 1) as u32))
        }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only arena of pages with lock-free slot access.
pub struct PageArena {
    /// Chunk table; each live entry points at `CHUNK_PAGES` initialized pages.
    chunks: Box<[AtomicPtr<Page>]>,
    /// Next slot to hand out.
    next: CachePadded<AtomicU32>,
    /// Serializes chunk installation; slot access never takes it.
    grow_lock: Mutex<()>,
}

impl PageArena {
    /// Create an arena with the first chunk mapped.
    pub fn new() -> Self {
        let chunks: Box<[AtomicPtr<Page>]> =
            (0..MAX_CHUNKS).map(|_| AtomicPtr::new(std::ptr::null_mut())).collect();
        let arena = Self {
            chunks,
            next: CachePadded::new(AtomicU32::new(0)),
            grow_lock: Mutex::new(()),
        };
        arena.ensure_chunk(0);
        arena
    }

    /// Allocate a fresh page at `level`. Slots are zero-initialized page
    /// state (empty, unlinked, forward parity) and are never recycled.
    pub fn alloc(&self, level: u32) -> PageId {
        let slot = self.next.fetch_add(1, Ordering::SeqCst) as usize;
        let chunk = slot / CHUNK_PAGES;
        if chunk >= MAX_CHUNKS {
            tracing::error!(slot, "page arena exhausted, no free space to alloc");
            std::process::abort();
        }
        self.ensure_chunk(chunk);
        let id = PageId(slot as u32);
        self.page(id).set_level(level);
        id
    }

    /// Resolve a page by index.
    #[inline]
    pub fn page(&self, id: PageId) -> &Page {
        let slot = id.0 as usize;
        let base = self.chunks[slot / CHUNK_PAGES].load(Ordering::Acquire);
        debug_assert!(!base.is_null(), "page {} read before allocation", id);
        // SAFETY: a non-null chunk pointer is published with Release only
        // after all CHUNK_PAGES pages are initialized, chunks are never
        // replaced or freed while the arena is alive, and `slot % CHUNK_PAGES`
        // is in bounds by construction.
        unsafe { &*base.add(slot % CHUNK_PAGES) }
    }

    /// Number of pages handed out so far.
    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::Acquire) as usize
    }

    fn ensure_chunk(&self, chunk: usize) {
        if !self.chunks[chunk].load(Ordering::Acquire).is_null() {
            return;
        }
        let _guard = self.grow_lock.lock();
        if !self.chunks[chunk].load(Ordering::Acquire).is_null() {
            return;
        }
        let pages: Box<[Page]> = (0..CHUNK_PAGES).map(|_| Page::default()).collect();
        let ptr = Box::into_raw(pages) as *mut Page;
        self.chunks[chunk].store(ptr, Ordering::Release);
    }
}

impl Default for PageArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PageArena {
    fn drop(&mut self) {
        for chunk in self.chunks.iter() {
            let ptr = chunk.load(Ordering::Acquire);
            if !ptr.is_null() {
                // SAFETY: `ptr` came from Box::into_raw over exactly
                // CHUNK_PAGES pages and is dropped at most once here.
                unsafe {
                    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, CHUNK_PAGES)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding_round_trips() {
        assert_eq!(PageId::from_raw(NULL_RAW), None);
        let id = PageId(41);
        assert_eq!(PageId::from_raw(id.to_raw()), Some(id));
    }

    #[test]
    fn alloc_crosses_chunk_boundaries() {
        let arena = PageArena::new();
        let mut last = None;
        for _ in 0..(CHUNK_PAGES + 10) {
            last = Some(arena.alloc(0));
        }
        let last = last.unwrap();
        assert_eq!(last.0 as usize, CHUNK_PAGES + 9);
        assert_eq!(arena.page(last).level(), 0);
        assert_eq!(arena.allocated(), CHUNK_PAGES + 10);
    }

    #[test]
    fn fresh_pages_start_empty() {
        let arena = PageArena::new();
        let id = arena.alloc(3);
        let page = arena.page(id);
        assert_eq!(page.level(), 3);
        assert_eq!(page.count(), 0);
    }
}
