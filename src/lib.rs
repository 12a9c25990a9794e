//! Concurrent B+tree index over a crash-consistent record list
//!
//! This crate pairs a volatile, latch-and-version B+tree with a durably
//! ordered singly linked record list. The tree is rebuildable and lives in
//! ordinary memory; records live in a pre-reserved, write-once slab and are
//! linked with flush-ordered compare-and-swap so the sorted list survives a
//! crash. Readers are fully lock-free; writers latch one page at a time.
//!
//! ```
//! use pmtree::{Key, PmTree};
//!
//! let tree = PmTree::with_capacity(1 << 16);
//! let mut ctx = tree.alloc_context();
//! tree.insert(&mut ctx, Key::from(5), 50).unwrap();
//! assert_eq!(tree.search(Key::from(5)), Some(50));
//! assert!(tree.remove(Key::from(5)));
//! assert_eq!(tree.search(Key::from(5)), None);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod key;
pub mod persist;
pub mod page_arena;
pub mod record;
pub mod page;
pub mod btree;

#[cfg(test)]
mod btree_tests;

// Re-exports
pub use btree::PmTree;
pub use error::{Error, Result, RetryReason};
pub use key::{Key, KEY_WORDS};
pub use page_arena::PageId;
pub use record::{AllocContext, RecordId, Value};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
