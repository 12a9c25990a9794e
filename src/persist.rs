//! Durable-write primitive
//!
//! The record list lives in a persistence domain where stores become durable
//! only after an explicit cache-line flush bracketed by fences. The contract
//! exposed here: no reader may observe a pointer to a range as valid until
//! the bytes in that range are durable. Callers therefore flush a record
//! before publishing a pointer to it, and flush a mutated link cell after
//! the link is installed.

use std::sync::atomic::{fence, Ordering};

/// CPU cache line size; flush granularity.
pub const CACHE_LINE_SIZE: usize = 64;

/// Flush every cache line covering `[ptr, ptr + len)` to the persistence
/// domain, with full fences on both sides.
///
/// On x86_64 this issues one `clflush` per line. On targets without an
/// explicit flush instruction the fences alone express the ordering; the
/// call is still the required seam for a real persistent-memory backend.
#[inline]
pub fn persist_range(ptr: *const u8, len: usize) {
    fence(Ordering::SeqCst);

    #[cfg(target_arch = "x86_64")]
    {
        let start = ptr as usize & !(CACHE_LINE_SIZE - 1);
        let end = ptr as usize + len;
        let mut line = start;
        while line < end {
            // SAFETY: clflush has no alignment or validity requirements
            // beyond the address being mapped, which holds for any live
            // allocation we are handed a pointer into.
            unsafe { core::arch::x86_64::_mm_clflush(line as *const u8) };
            line += CACHE_LINE_SIZE;
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    let _ = (ptr, len);

    fence(Ordering::SeqCst);
}

/// Flush the memory of a single value.
#[inline]
pub fn persist<T>(value: &T) {
    persist_range(value as *const T as *const u8, std::mem::size_of::<T>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_covers_unaligned_ranges() {
        let buf = [0u8; 3 * CACHE_LINE_SIZE];
        // Interior pointer that straddles line boundaries.
        persist_range(buf[CACHE_LINE_SIZE - 1..].as_ptr(), CACHE_LINE_SIZE + 2);
        persist(&buf);
    }
}
