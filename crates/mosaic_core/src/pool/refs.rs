use super::ThumbnailKey;
use std::collections::HashMap;

/// Live-holder counts per key. Keys that drop to zero are forgotten.
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    counts: HashMap<ThumbnailKey, u32>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new count.
    pub fn add(&mut self, key: &ThumbnailKey) -> u32 {
        let count = self.counts.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Returns the new count, or `None` when `key` had no holders. Never
    /// underflows and never touches other keys.
    pub fn remove(&mut self, key: &ThumbnailKey) -> Option<u32> {
        let count = self.counts.get_mut(key)?;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.counts.remove(key);
        }
        Some(remaining)
    }

    pub fn count(&self, key: &ThumbnailKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_referenced(&self, key: &ThumbnailKey) -> bool {
        self.counts.contains_key(key)
    }

    /// Number of keys with at least one holder.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_is_net_zero() {
        let mut refs = ReferenceTracker::new();
        let key = ThumbnailKey::square("/Game/A.A", 64);

        assert_eq!(refs.add(&key), 1);
        assert_eq!(refs.add(&key), 2);
        assert_eq!(refs.remove(&key), Some(1));
        assert_eq!(refs.count(&key), 1);
        assert_eq!(refs.remove(&key), Some(0));
        assert_eq!(refs.count(&key), 0);
        assert!(!refs.is_referenced(&key));
        assert!(refs.is_empty());
    }

    #[test]
    fn unmatched_remove_is_ignored() {
        let mut refs = ReferenceTracker::new();
        let held = ThumbnailKey::square("/Game/A.A", 64);
        let stray = ThumbnailKey::square("/Game/B.B", 64);
        refs.add(&held);

        assert_eq!(refs.remove(&stray), None);
        assert_eq!(refs.remove(&stray), None);
        assert_eq!(refs.count(&stray), 0);
        assert_eq!(refs.count(&held), 1);
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn sizes_are_counted_separately() {
        let mut refs = ReferenceTracker::new();
        let small = ThumbnailKey::square("/Game/A.A", 64);
        let large = ThumbnailKey::square("/Game/A.A", 256);
        refs.add(&small);
        refs.add(&large);
        refs.add(&large);
        refs.remove(&small);

        assert_eq!(refs.count(&small), 0);
        assert_eq!(refs.count(&large), 2);
    }
}
