//! Fixed-width keys
//!
//! Keys are arrays of 64-bit words with a compile-time width. Ordering is
//! lexicographic over the words, which for the common one-word configuration
//! is plain numeric order.

/// Key width in 64-bit words (compile-time parameter).
pub const KEY_WORDS: usize = 1;

/// A fixed-width index key.
///
/// `Key::MAX` is reserved as the empty-slot sentinel inside tree pages;
/// user keys must compare strictly below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub [u64; KEY_WORDS]);

impl Key {
    /// The all-ones sentinel key, greater than every storable key.
    pub const MAX: Key = Key([u64::MAX; KEY_WORDS]);

    /// The smallest key.
    pub const MIN: Key = Key([0; KEY_WORDS]);

    /// Raw word access.
    #[inline]
    pub fn words(&self) -> &[u64; KEY_WORDS] {
        &self.0
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        let mut words = [0u64; KEY_WORDS];
        words[KEY_WORDS - 1] = v;
        Key(words)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if KEY_WORDS == 1 {
            write!(f, "{}", self.0[0])
        } else {
            write!(f, "{:x?}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_numeric_for_single_word() {
        assert!(Key::from(1) < Key::from(2));
        assert!(Key::from(100) > Key::from(99));
        assert_eq!(Key::from(7), Key::from(7));
    }

    #[test]
    fn max_dominates_every_key() {
        assert!(Key::from(u64::MAX - 1) < Key::MAX);
        assert!(Key::MIN < Key::MAX);
    }
}
