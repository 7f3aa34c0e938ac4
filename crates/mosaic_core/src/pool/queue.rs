use super::ThumbnailKey;
use std::collections::{HashSet, VecDeque};

/// Keys waiting for a render.
///
/// The one-shot queue is FIFO and holds each key at most once. The real-time
/// set holds keys that are re-rendered on a recurring basis; the pool decides
/// their order at drain time.
#[derive(Debug, Default)]
pub struct RenderQueue {
    one_shot: VecDeque<ThumbnailKey>,
    queued: HashSet<ThumbnailKey>,
    realtime: Vec<ThumbnailKey>,
    realtime_set: HashSet<ThumbnailKey>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the one-shot queue. Returns `false` if already queued.
    pub fn push(&mut self, key: ThumbnailKey) -> bool {
        if !self.queued.insert(key.clone()) {
            return false;
        }
        self.one_shot.push_back(key);
        true
    }

    pub fn pop(&mut self) -> Option<ThumbnailKey> {
        let key = self.one_shot.pop_front()?;
        self.queued.remove(&key);
        Some(key)
    }

    /// Move the given keys to the front, keeping their relative order. Keys
    /// that are not queued are ignored.
    pub fn prioritize(&mut self, keys: &[ThumbnailKey]) {
        let mut front = Vec::with_capacity(keys.len());
        for key in keys {
            if !self.queued.contains(key) || front.contains(&key) {
                continue;
            }
            front.push(key);
        }
        if front.is_empty() {
            return;
        }

        self.one_shot.retain(|queued| !front.contains(&queued));
        for key in front.into_iter().rev() {
            self.one_shot.push_front(key.clone());
        }
    }

    /// Drop `key` from both queues.
    pub fn remove(&mut self, key: &ThumbnailKey) {
        if self.queued.remove(key) {
            self.one_shot.retain(|queued| queued != key);
        }
        self.remove_realtime(key);
    }

    #[inline]
    pub fn contains(&self, key: &ThumbnailKey) -> bool {
        self.queued.contains(key)
    }

    pub fn add_realtime(&mut self, key: ThumbnailKey) -> bool {
        if !self.realtime_set.insert(key.clone()) {
            return false;
        }
        self.realtime.push(key);
        true
    }

    pub fn remove_realtime(&mut self, key: &ThumbnailKey) -> bool {
        if !self.realtime_set.remove(key) {
            return false;
        }
        self.realtime.retain(|queued| queued != key);
        true
    }

    #[inline]
    pub fn is_realtime(&self, key: &ThumbnailKey) -> bool {
        self.realtime_set.contains(key)
    }

    pub fn realtime_keys(&self) -> &[ThumbnailKey] {
        &self.realtime
    }

    pub fn clear(&mut self) {
        self.one_shot.clear();
        self.queued.clear();
        self.realtime.clear();
        self.realtime_set.clear();
    }

    pub fn one_shot_len(&self) -> usize {
        self.one_shot.len()
    }

    pub fn realtime_len(&self) -> usize {
        self.realtime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.one_shot.is_empty() && self.realtime.is_empty()
    }
}
