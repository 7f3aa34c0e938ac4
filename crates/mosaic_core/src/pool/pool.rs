use super::entry::{RenderState, ThumbnailEntry};
use super::queue::RenderQueue;
use super::refs::ReferenceTracker;
use super::{
    PoolError, PoolStats, ShutdownReport, ThumbnailEvent, ThumbnailKey, ThumbnailRenderSlot,
    TickReport,
};
use crate::time::{Clock, MonotonicClock};
use mosaic_asset::{
    AssetId, AssetSource, ObjectThumbnail, PixelError, RenderThumbnailError, ThumbnailCache,
    ThumbnailImage,
};
use mosaic_metrics::{metrics, Counter, TickTimer};
use mosaic_render::{RenderCommand, RenderThread, SlotId};
use mosaic_services::{EditorConditions, ThumbnailSettings};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Where the pixels of a finished render came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upload {
    Live { realtime: bool },
    Cached,
    Failed,
}

/// Bounded cache of render slots keyed by asset and size.
///
/// Driven from the UI thread only. GPU work is expressed as
/// [`RenderCommand`]s on the owned [`RenderThread`], so slot bookkeeping
/// needs no locks.
///
/// Every key can be in one of three places:
/// - resident: bound to a slot, possibly queued for a render
/// - pending: referenced but waiting for capacity (no slot)
/// - absent
///
/// Unreferenced resident entries stay bound until another key needs the
/// capacity or [`free_thumbnail`](Self::free_thumbnail) is called.
pub struct ThumbnailPool {
    settings: ThumbnailSettings,
    render: RenderThread,
    assets: Arc<dyn AssetSource>,
    cache: Arc<dyn ThumbnailCache>,
    clock: Box<dyn Clock>,
    max_texture_size: u32,

    entries: HashMap<ThumbnailKey, ThumbnailEntry>,
    /// Most recently freed last.
    free_slots: Vec<Arc<ThumbnailRenderSlot>>,
    allocated_slots: usize,
    next_slot_id: u32,
    access_seq: u64,

    refs: ReferenceTracker,
    queue: RenderQueue,
    realtime_allowed: bool,
    subscribers: Vec<Sender<ThumbnailEvent>>,
    shut_down: bool,

    counters: Counter,
    tick_timer: TickTimer,
}

impl ThumbnailPool {
    pub fn new(
        settings: ThumbnailSettings,
        render: RenderThread,
        assets: Arc<dyn AssetSource>,
        cache: Arc<dyn ThumbnailCache>,
    ) -> Self {
        let max_texture_size = render.capabilities().max_texture_size;
        tracing::info!(
            capacity = settings.pool_capacity,
            max_texture_size,
            "thumbnail pool created"
        );

        Self {
            settings,
            render,
            assets,
            cache,
            clock: Box::new(MonotonicClock::new()),
            max_texture_size,
            entries: HashMap::new(),
            free_slots: Vec::new(),
            allocated_slots: 0,
            next_slot_id: 0,
            access_seq: 0,
            refs: ReferenceTracker::new(),
            queue: RenderQueue::new(),
            realtime_allowed: true,
            subscribers: Vec::new(),
            shut_down: false,
            counters: Counter::new(),
            tick_timer: TickTimer::new(120),
        }
    }

    /// Replace the time source used for access stamps and the tick budget.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Per-pool switch for real-time thumbnails, combined with the global
    /// `realtime_enabled` setting.
    pub fn with_realtime_allowed(mut self, allowed: bool) -> Self {
        self.realtime_allowed = allowed;
        self
    }

    pub fn set_realtime_allowed(&mut self, allowed: bool) {
        self.realtime_allowed = allowed;
    }

    pub fn settings(&self) -> &ThumbnailSettings {
        &self.settings
    }

    pub fn capacity(&self) -> usize {
        self.settings.pool_capacity
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    /// Return the slot bound to `key`, binding one if needed.
    ///
    /// A freshly bound slot is queued for a one-shot render. When every slot
    /// belongs to a referenced key this fails with the retryable
    /// [`PoolError::Exhausted`]; a referenced key then stays pending and is
    /// bound by a later [`tick`](Self::tick).
    pub fn acquire_slot(
        &mut self,
        key: &ThumbnailKey,
    ) -> Result<Arc<ThumbnailRenderSlot>, PoolError> {
        self.validate_size(key.width(), key.height())?;
        let now = self.clock.now();
        let seq = self.next_access();

        if let Some(entry) = self.entries.get_mut(key) {
            entry.touch(now, seq);
            if let Some(slot) = &entry.slot {
                return Ok(Arc::clone(slot));
            }
        }

        match self.take_slot(key)? {
            Some(slot) => {
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| ThumbnailEntry::new(key.clone(), now, seq));
                entry.bind(Arc::clone(&slot));
                self.queue.push(key.clone());
                tracing::trace!(%key, slot = %slot.id(), "thumbnail bound");
                Ok(slot)
            }
            None => {
                if self.refs.is_referenced(key) {
                    self.entries
                        .entry(key.clone())
                        .or_insert_with(|| ThumbnailEntry::new(key.clone(), now, seq));
                } else {
                    self.entries.remove(key);
                }
                metrics! {
                    self.counters.increment("exhausted", 1);
                }
                tracing::warn!(
                    %key,
                    capacity = self.settings.pool_capacity,
                    "thumbnail pool exhausted"
                );
                Err(PoolError::Exhausted {
                    capacity: self.settings.pool_capacity,
                })
            }
        }
    }

    /// Returns the new reference count.
    pub fn add_referencer(&mut self, key: &ThumbnailKey) -> u32 {
        let count = self.refs.add(key);
        tracing::trace!(%key, count, "referencer added");
        count
    }

    /// Returns the new reference count. Unmatched calls are ignored.
    ///
    /// At zero the entry only becomes a recycling candidate; its slot stays
    /// bound so a later acquire is still a cache hit.
    pub fn remove_referencer(&mut self, key: &ThumbnailKey) -> u32 {
        match self.refs.remove(key) {
            None => {
                tracing::trace!(%key, "remove_referencer without a matching add ignored");
                0
            }
            Some(0) => {
                if self.entries.get(key).is_some_and(|entry| !entry.is_resident()) {
                    self.entries.remove(key);
                    self.queue.remove(key);
                    tracing::trace!(%key, "pending thumbnail dropped");
                }
                0
            }
            Some(count) => count,
        }
    }

    /// Drop an unreferenced entry and keep its slot for the next acquisition.
    pub fn free_thumbnail(&mut self, key: &ThumbnailKey) -> Result<(), PoolError> {
        let count = self.refs.count(key);
        if count > 0 {
            return Err(PoolError::StillReferenced {
                key: key.clone(),
                count,
            });
        }
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| PoolError::UnknownKey(key.clone()))?;
        self.queue.remove(key);

        if let Some(slot) = entry.slot {
            tracing::debug!(%key, slot = %slot.id(), "slot freed");
            self.free_slots.push(slot);
        }
        Ok(())
    }

    fn next_access(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    fn validate_size(&self, width: u32, height: u32) -> Result<(), PoolError> {
        let max = self.max_texture_size;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(PoolError::InvalidDimensions { width, height, max });
        }
        Ok(())
    }

    /// Free list first, then a new slot while under capacity, then the least
    /// recently accessed unreferenced entry. `None` means exhausted.
    fn take_slot(
        &mut self,
        key: &ThumbnailKey,
    ) -> Result<Option<Arc<ThumbnailRenderSlot>>, PoolError> {
        let (width, height) = key.size();

        if let Some(slot) = self.free_slots.pop() {
            tracing::debug!(%key, slot = %slot.id(), "reusing freed slot");
            return self.fit_slot(slot, width, height).map(Some);
        }

        if self.allocated_slots < self.settings.pool_capacity {
            let id = SlotId(self.next_slot_id);
            self.render.submit(RenderCommand::Allocate {
                slot: id,
                width,
                height,
            })?;
            self.next_slot_id += 1;
            self.allocated_slots += 1;
            metrics! {
                self.counters.increment("slots_allocated", 1);
            }
            tracing::debug!(%key, slot = %id, allocated = self.allocated_slots, "slot allocated");
            return Ok(Some(Arc::new(ThumbnailRenderSlot::new(id, width, height))));
        }

        let Some(victim) = self.recycle_candidate() else {
            return Ok(None);
        };
        let Some(slot) = self.entries.remove(&victim).and_then(|entry| entry.slot) else {
            return Ok(None);
        };
        self.queue.remove(&victim);
        metrics! {
            self.counters.increment("slots_recycled", 1);
        }
        tracing::debug!(from = %victim, to = %key, slot = %slot.id(), "slot recycled");
        self.fit_slot(slot, width, height).map(Some)
    }

    fn recycle_candidate(&self) -> Option<ThumbnailKey> {
        self.entries
            .values()
            .filter(|entry| entry.is_resident() && !self.refs.is_referenced(&entry.key))
            .min_by_key(|entry| entry.lru_rank())
            .map(|entry| entry.key.clone())
    }

    fn fit_slot(
        &mut self,
        slot: Arc<ThumbnailRenderSlot>,
        width: u32,
        height: u32,
    ) -> Result<Arc<ThumbnailRenderSlot>, PoolError> {
        if slot.size() == (width, height) {
            return Ok(slot);
        }
        let resize = RenderCommand::Resize {
            slot: slot.id(),
            width,
            height,
        };
        if let Err(err) = self.render.submit(resize) {
            // Keep the handle accounted for so shutdown still sees it.
            self.free_slots.push(slot);
            return Err(err.into());
        }
        slot.set_size(width, height);
        Ok(slot)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Drain the render queues using the configured budget.
    pub fn tick(&mut self, conditions: &EditorConditions) -> Result<TickReport, PoolError> {
        let budget = self.settings.max_frame_time();
        let max_realtime = self.settings.max_realtime_per_tick;
        self.tick_with_budget(conditions, budget, max_realtime)
    }

    /// One UI frame of background rendering.
    ///
    /// Waiting entries are bound first. Then the one-shot queue drains while
    /// `max_frame_time` lasts, and at most `max_realtime` real-time entries
    /// are re-rendered with whatever budget is left.
    pub fn tick_with_budget(
        &mut self,
        conditions: &EditorConditions,
        max_frame_time: Duration,
        max_realtime: usize,
    ) -> Result<TickReport, PoolError> {
        let mut report = TickReport::default();
        if conditions.should_skip_background_work() {
            tracing::trace!("thumbnail tick skipped while throttled");
            report.skipped = true;
            return Ok(report);
        }

        self.tick_timer.begin();
        let start = self.clock.now();
        report.failed += self.collect_render_failures();
        report.pending_bound = self.bind_pending()?;

        let realtime_active = self.realtime_active(conditions);
        let mut rendered = HashSet::new();

        while self.within_budget(start, max_frame_time) {
            let Some(key) = self.queue.pop() else {
                break;
            };
            match self.render_entry(&key, realtime_active)? {
                Some(Upload::Failed) => report.failed += 1,
                Some(upload) => {
                    report.rendered += 1;
                    if upload == Upload::Cached {
                        report.from_cache += 1;
                    }
                    rendered.insert(key);
                }
                None => {}
            }
        }

        if realtime_active {
            let mut attempts = 0;
            for key in self.realtime_due() {
                if attempts >= max_realtime || !self.within_budget(start, max_frame_time) {
                    break;
                }
                if rendered.contains(&key) {
                    continue;
                }
                attempts += 1;
                match self.render_entry(&key, realtime_active)? {
                    Some(Upload::Failed) => report.failed += 1,
                    Some(upload) => {
                        report.realtime_rendered += 1;
                        if upload == Upload::Cached {
                            report.from_cache += 1;
                        }
                    }
                    None => {}
                }
            }
        }

        self.tick_timer.end();
        metrics! {
            self.counters.increment("renders", report.rendered as u64);
            self.counters.increment("realtime_renders", report.realtime_rendered as u64);
            self.counters.increment("render_failures", report.failed as u64);
        }
        if report != TickReport::default() {
            tracing::debug!(
                rendered = report.rendered,
                realtime = report.realtime_rendered,
                from_cache = report.from_cache,
                failed = report.failed,
                pending_bound = report.pending_bound,
                "thumbnail tick"
            );
        }
        Ok(report)
    }

    /// Mark entries whose `Update` failed on the render thread as failed.
    ///
    /// The slot is looked up by id, so a slot recycled since the failing
    /// update reports against its current key.
    fn collect_render_failures(&mut self) -> usize {
        let mut count = 0;
        for slot in self.render.take_failed_updates() {
            let Some(key) = self
                .entries
                .values()
                .find(|entry| entry.slot.as_ref().is_some_and(|bound| bound.id() == slot))
                .map(|entry| entry.key.clone())
            else {
                continue;
            };
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.state = RenderState::Failed;
                entry.realtime = false;
            }
            self.queue.remove_realtime(&key);
            tracing::warn!(%key, %slot, "thumbnail upload failed on the render thread");
            self.broadcast(ThumbnailEvent::RenderFailed(key.asset().clone()));
            count += 1;
        }
        count
    }

    fn within_budget(&self, start: Duration, budget: Duration) -> bool {
        self.clock.now().saturating_sub(start) < budget
    }

    fn realtime_active(&self, conditions: &EditorConditions) -> bool {
        self.settings.realtime_enabled && self.realtime_allowed && !conditions.play_in_editor
    }

    /// Bind referenced entries that were turned away by an earlier
    /// acquisition, oldest access first.
    fn bind_pending(&mut self) -> Result<usize, PoolError> {
        let mut waiting: Vec<_> = self
            .entries
            .values()
            .filter(|entry| !entry.is_resident() && self.refs.is_referenced(&entry.key))
            .map(|entry| (entry.lru_rank(), entry.key.clone()))
            .collect();
        waiting.sort_by_key(|(rank, _)| *rank);

        let mut bound = 0;
        for (_, key) in waiting {
            let Some(slot) = self.take_slot(&key)? else {
                break;
            };
            match self.entries.get_mut(&key) {
                Some(entry) => {
                    tracing::trace!(%key, slot = %slot.id(), "pending thumbnail bound");
                    entry.bind(slot);
                    self.queue.push(key);
                    bound += 1;
                }
                None => self.free_slots.push(slot),
            }
        }
        Ok(bound)
    }

    /// Real-time keys due for a re-render, least recently rendered first.
    /// Keys whose asset is gone leave the real-time queue.
    fn realtime_due(&mut self) -> Vec<ThumbnailKey> {
        let now = self.clock.now();
        let window = self.settings.realtime_access_window();
        let mut stale = Vec::new();
        let mut due = Vec::new();

        for key in self.queue.realtime_keys() {
            let entry = match self.entries.get(key) {
                Some(entry) if entry.is_resident() => entry,
                _ => {
                    stale.push(key.clone());
                    continue;
                }
            };
            if self.assets.find_loaded(key.asset()).is_none() {
                stale.push(key.clone());
                continue;
            }
            if now.saturating_sub(entry.last_access) <= window {
                due.push((entry.last_render, key.clone()));
            }
        }

        for key in stale {
            tracing::trace!(%key, "real-time thumbnail retired");
            self.queue.remove_realtime(&key);
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.realtime = false;
            }
        }

        due.sort_by_key(|(last_render, _)| *last_render);
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Render `key` into its slot: live renderer first, serialized cache
    /// second. `None` when the key is no longer resident.
    ///
    /// `Rendered` means the upload was submitted. An upload that then fails
    /// on the render thread turns into `RenderFailed` on the next tick.
    fn render_entry(
        &mut self,
        key: &ThumbnailKey,
        realtime_active: bool,
    ) -> Result<Option<Upload>, PoolError> {
        let Some(slot) = self
            .entries
            .get(key)
            .and_then(|entry| entry.slot.as_ref())
            .map(|slot| slot.id())
        else {
            return Ok(None);
        };

        let (upload, image) = match self.live_image(key) {
            Some((image, realtime)) => (Upload::Live { realtime }, Some(image)),
            None => match self.cached_image(key) {
                Some(image) => (Upload::Cached, Some(image)),
                None => (Upload::Failed, None),
            },
        };

        if let Some(image) = image {
            self.render.submit(RenderCommand::Update { slot, image })?;
        }

        let now = self.clock.now();
        let keep_realtime = realtime_active && upload == (Upload::Live { realtime: true });
        if let Some(entry) = self.entries.get_mut(key) {
            if upload == Upload::Failed {
                entry.state = RenderState::Failed;
            } else {
                entry.state = RenderState::Rendered;
                entry.last_render = Some(now);
            }
            entry.realtime = keep_realtime;
        }
        if keep_realtime {
            self.queue.add_realtime(key.clone());
        } else {
            self.queue.remove_realtime(key);
        }

        let asset = key.asset().clone();
        if upload == Upload::Failed {
            tracing::warn!(%key, "no live renderer or cached thumbnail");
            self.broadcast(ThumbnailEvent::RenderFailed(asset));
        } else {
            tracing::trace!(%key, %slot, ?upload, "thumbnail rendered");
            self.broadcast(ThumbnailEvent::Rendered(asset));
        }
        Ok(Some(upload))
    }

    fn live_image(&self, key: &ThumbnailKey) -> Option<(ThumbnailImage, bool)> {
        let renderer = self.assets.find_loaded(key.asset())?;
        if !renderer.can_render_thumbnail() {
            return None;
        }
        let (width, height) = key.size();
        let result = renderer
            .render_thumbnail(width, height)
            .and_then(|image| fit_image(image, width, height).map_err(RenderThumbnailError::from));
        match result {
            Ok(image) => Some((image, renderer.supports_realtime())),
            Err(err) => {
                tracing::warn!(%key, "live thumbnail render failed: {err}");
                None
            }
        }
    }

    fn cached_image(&self, key: &ThumbnailKey) -> Option<ThumbnailImage> {
        let cached = self.cache.find(key.asset().full_name())?;
        let (width, height) = key.size();
        match fit_image(cached.into_image(), width, height) {
            Ok(image) => Some(image),
            Err(err) => {
                tracing::warn!(%key, "cached thumbnail unusable: {err}");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Re-queue every resident size variant of `asset` and mark its
    /// serialized thumbnail dirty. Returns the number of entries queued.
    pub fn notify_asset_changed(&mut self, asset: &AssetId) -> usize {
        let mut keys: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.key.asset() == asset && entry.is_resident())
            .map(|entry| (entry.lru_rank(), entry.key.clone()))
            .collect();
        keys.sort_by_key(|(rank, _)| *rank);

        let count = keys.len();
        for (_, key) in keys {
            self.queue.push(key);
        }
        if self.cache.mark_dirty(asset.full_name()) {
            tracing::debug!(%asset, "serialized thumbnail marked dirty");
        }
        tracing::trace!(%asset, count, "asset changed");
        count
    }

    /// Queue one resident key for another render. Returns `false` if the key
    /// has no slot.
    pub fn refresh_thumbnail(&mut self, key: &ThumbnailKey) -> bool {
        if !self.entries.get(key).is_some_and(ThumbnailEntry::is_resident) {
            return false;
        }
        self.queue.push(key.clone());
        true
    }

    /// Render these keys before anything else still queued.
    pub fn prioritize(&mut self, keys: &[ThumbnailKey]) {
        self.queue.prioritize(keys);
    }

    /// Render `asset` through its live renderer and store the result as its
    /// serialized thumbnail, clearing the dirty flag.
    pub fn regenerate_cached_thumbnail(
        &self,
        asset: &AssetId,
        width: u32,
        height: u32,
    ) -> Result<(), PoolError> {
        self.validate_size(width, height)?;
        let renderer = self
            .assets
            .find_loaded(asset)
            .ok_or_else(|| PoolError::NotLoaded(asset.clone()))?;
        if !renderer.can_render_thumbnail() {
            return Err(RenderThumbnailError::Unsupported.into());
        }

        let image = renderer.render_thumbnail(width, height)?;
        let image = fit_image(image, width, height).map_err(RenderThumbnailError::from)?;
        self.cache
            .store(asset.full_name(), ObjectThumbnail::new(image))?;
        tracing::debug!(%asset, width, height, "serialized thumbnail regenerated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn subscribe(&mut self) -> Receiver<ThumbnailEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    fn broadcast(&mut self, event: ThumbnailEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn is_rendered(&self, key: &ThumbnailKey) -> bool {
        self.render_state(key) == Some(RenderState::Rendered)
    }

    /// Waiting for a render, or for a slot.
    pub fn is_queued(&self, key: &ThumbnailKey) -> bool {
        self.queue.contains(key)
            || self
                .entries
                .get(key)
                .is_some_and(|entry| !entry.is_resident())
    }

    pub fn render_state(&self, key: &ThumbnailKey) -> Option<RenderState> {
        self.entries.get(key).map(|entry| entry.state)
    }

    pub fn reference_count(&self, key: &ThumbnailKey) -> u32 {
        self.refs.count(key)
    }

    pub fn slot(&self, key: &ThumbnailKey) -> Option<Arc<ThumbnailRenderSlot>> {
        self.entries.get(key).and_then(|entry| entry.slot.clone())
    }

    /// Re-rendered every tick while it stays visible.
    pub fn is_realtime(&self, key: &ThumbnailKey) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.realtime)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            entries: self.entries.len(),
            resident: self.entries.values().filter(|e| e.is_resident()).count(),
            allocated_slots: self.allocated_slots,
            free_slots: self.free_slots.len(),
            referenced_keys: self.refs.len(),
            one_shot_queued: self.queue.one_shot_len(),
            realtime_queued: self.queue.realtime_len(),
        }
    }

    /// Blocking copy of what `key`'s display texture currently shows.
    pub fn read_back(&self, key: &ThumbnailKey) -> Result<ThumbnailImage, PoolError> {
        let slot = self
            .entries
            .get(key)
            .and_then(|entry| entry.slot.as_ref())
            .map(|slot| slot.id())
            .ok_or_else(|| PoolError::UnknownKey(key.clone()))?;
        Ok(self.render.read_display(slot)?)
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn tick_timer(&self) -> &TickTimer {
        &self.tick_timer
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Release every slot on the render thread, wait for it, then verify the
    /// pool held the last handle to each slot before stopping the thread.
    pub fn shutdown(mut self) -> Result<ShutdownReport, PoolError> {
        self.release_resources()
    }

    fn release_resources(&mut self) -> Result<ShutdownReport, PoolError> {
        self.shut_down = true;
        self.queue.clear();

        let mut slots: Vec<_> = self.free_slots.drain(..).collect();
        slots.extend(self.entries.drain().filter_map(|(_, entry)| entry.slot));
        slots.sort_by_key(|slot| slot.id());
        if slots.len() != self.allocated_slots {
            tracing::warn!(
                held = slots.len(),
                allocated = self.allocated_slots,
                "slot count drifted"
            );
        }

        for slot in &slots {
            self.render.submit(RenderCommand::Release { slot: slot.id() })?;
        }
        self.render.flush()?;

        // Host-side handles are dropped only after the render thread has
        // consumed every release.
        let leaked: Vec<SlotId> = slots
            .iter()
            .filter(|slot| Arc::strong_count(slot) != 1)
            .map(|slot| slot.id())
            .collect();
        let released_slots = slots.len();
        drop(slots);
        self.allocated_slots = 0;
        self.subscribers.clear();

        let render = self.render.shutdown()?;
        if !leaked.is_empty() {
            tracing::error!(?leaked, "thumbnail slots still referenced after shutdown");
            return Err(PoolError::LeakedSlots { slots: leaked });
        }

        tracing::info!(
            released_slots,
            commands = render.commands,
            "thumbnail pool shut down"
        );
        Ok(ShutdownReport {
            released_slots,
            render,
        })
    }
}

impl Drop for ThumbnailPool {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(err) = self.release_resources() {
                tracing::error!("thumbnail pool teardown failed: {err}");
                // Release builds keep running; debug builds stop on a leak.
                debug_assert!(
                    std::thread::panicking() || !matches!(err, PoolError::LeakedSlots { .. }),
                    "thumbnail pool dropped with leaked slots: {err}"
                );
            }
        }
    }
}

fn fit_image(image: ThumbnailImage, width: u32, height: u32) -> Result<ThumbnailImage, PixelError> {
    if image.size() == (width, height) {
        Ok(image)
    } else {
        image.resized(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use mosaic_asset::{AssetRegistry, DiskThumbnailCache, MemoryThumbnailCache, ThumbnailRenderer};
    use mosaic_render::{DeviceCapabilities, RenderBackend, RenderError, SoftwareBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[derive(Default)]
    struct TestAsset {
        color: [u8; 4],
        gradient: bool,
        realtime: bool,
        cost: Option<(ManualClock, Duration)>,
        renders: AtomicUsize,
    }

    impl TestAsset {
        fn solid(color: [u8; 4]) -> Arc<Self> {
            Arc::new(Self {
                color,
                ..Default::default()
            })
        }

        fn realtime() -> Arc<Self> {
            Arc::new(Self {
                color: BLUE,
                realtime: true,
                ..Default::default()
            })
        }

        fn renders(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }
    }

    impl ThumbnailRenderer for TestAsset {
        fn supports_realtime(&self) -> bool {
            self.realtime
        }

        fn render_thumbnail(
            &self,
            width: u32,
            height: u32,
        ) -> Result<ThumbnailImage, RenderThumbnailError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if let Some((clock, cost)) = &self.cost {
                clock.advance(*cost);
            }
            if self.gradient {
                Ok(ThumbnailImage::from_fn(width, height, |x, y| {
                    [(x * 4) as u8, (y * 4) as u8, (x ^ y) as u8, 255]
                })?)
            } else {
                Ok(ThumbnailImage::filled(width, height, self.color)?)
            }
        }
    }

    /// Software slots whose uploads always fail, like a lost device.
    struct LostDevice(SoftwareBackend);

    impl RenderBackend for LostDevice {
        fn capabilities(&self) -> DeviceCapabilities {
            self.0.capabilities()
        }

        fn allocate(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
            self.0.allocate(slot, width, height)
        }

        fn resize(&mut self, slot: SlotId, width: u32, height: u32) -> Result<(), RenderError> {
            self.0.resize(slot, width, height)
        }

        fn update(&mut self, _slot: SlotId, _image: &ThumbnailImage) -> Result<(), RenderError> {
            Err(RenderError::Device("device lost".to_string()))
        }

        fn release(&mut self, slot: SlotId) -> Result<(), RenderError> {
            self.0.release(slot)
        }

        fn read_display(&mut self, slot: SlotId) -> Result<ThumbnailImage, RenderError> {
            self.0.read_display(slot)
        }

        fn live_slots(&self) -> usize {
            self.0.live_slots()
        }
    }

    struct Harness {
        pool: ThumbnailPool,
        assets: Arc<AssetRegistry>,
        cache: Arc<MemoryThumbnailCache>,
        clock: ManualClock,
        events: Receiver<ThumbnailEvent>,
    }

    impl Harness {
        fn new(capacity: usize) -> Self {
            Self::with_settings(ThumbnailSettings {
                pool_capacity: capacity,
                ..Default::default()
            })
        }

        fn with_settings(settings: ThumbnailSettings) -> Self {
            Self::with_backend(settings, Box::new(SoftwareBackend::with_max_texture_size(512)))
        }

        fn with_backend(settings: ThumbnailSettings, backend: Box<dyn RenderBackend>) -> Self {
            let assets = Arc::new(AssetRegistry::new());
            let cache = Arc::new(MemoryThumbnailCache::new());
            let clock = ManualClock::new();
            let render = RenderThread::spawn(backend, 64).unwrap();
            let mut pool = ThumbnailPool::new(settings, render, assets.clone(), cache.clone())
                .with_clock(clock.clone());
            let events = pool.subscribe();
            Self {
                pool,
                assets,
                cache,
                clock,
                events,
            }
        }

        fn load(&self, name: &str, asset: Arc<TestAsset>) -> Arc<TestAsset> {
            self.assets.load(AssetId::new(name), asset.clone());
            asset
        }

        fn acquire(&mut self, key: &ThumbnailKey) -> Arc<ThumbnailRenderSlot> {
            self.clock.advance(Duration::from_millis(1));
            self.pool.acquire_slot(key).unwrap()
        }

        fn tick(&mut self) -> TickReport {
            self.pool.tick(&EditorConditions::default()).unwrap()
        }

        fn events(&self) -> Vec<ThumbnailEvent> {
            self.events.try_iter().collect()
        }
    }

    fn key(name: &str) -> ThumbnailKey {
        ThumbnailKey::square(name, 64)
    }

    // ------------------------------------------------------------------
    // Acquisition and recycling
    // ------------------------------------------------------------------

    #[test]
    fn repeated_acquire_returns_the_same_slot() {
        let mut h = Harness::new(4);
        let first = h.acquire(&key("/Game/A.A"));
        let second = h.acquire(&key("/Game/A.A"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.pool.stats().allocated_slots, 1);
        assert_eq!(first.size(), (64, 64));
    }

    #[test]
    fn full_pool_recycles_the_oldest_unreferenced_entry() {
        let mut h = Harness::new(2);
        let a = h.acquire(&key("/Game/A.A"));
        let b = h.acquire(&key("/Game/B.B"));
        let c = h.acquire(&key("/Game/C.C"));

        assert_eq!(c.id(), a.id());
        assert_ne!(c.id(), b.id());
        assert_eq!(h.pool.render_state(&key("/Game/A.A")), None);
        assert!(h.pool.slot(&key("/Game/B.B")).is_some());
        assert!(h.pool.slot(&key("/Game/C.C")).is_some());
        assert!(!h.pool.is_queued(&key("/Game/A.A")));
        assert_eq!(h.pool.stats().allocated_slots, 2);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn counters_track_slot_churn() {
        let mut h = Harness::new(1);
        h.acquire(&key("/Game/A.A"));
        h.acquire(&key("/Game/B.B"));
        h.tick();
        assert_eq!(h.pool.counters().get("slots_allocated"), 1);
        assert_eq!(h.pool.counters().get("slots_recycled"), 1);
        assert_eq!(h.pool.counters().get("render_failures"), 1);
        assert_eq!(h.pool.tick_timer().samples(), 1);
    }

    #[test]
    fn referenced_entries_are_never_recycled() {
        let mut h = Harness::new(2);
        h.pool.add_referencer(&key("/Game/A.A"));
        let a = h.acquire(&key("/Game/A.A"));
        let b = h.acquire(&key("/Game/B.B"));

        // A is older but held, so B goes.
        let c = h.acquire(&key("/Game/C.C"));
        assert_eq!(c.id(), b.id());
        assert!(Arc::ptr_eq(&a, &h.pool.slot(&key("/Game/A.A")).unwrap()));
    }

    #[test]
    fn exhaustion_when_every_slot_is_referenced() {
        let mut h = Harness::new(2);
        for name in ["/Game/A.A", "/Game/B.B"] {
            h.pool.add_referencer(&key(name));
            h.acquire(&key(name));
        }
        let a = h.pool.slot(&key("/Game/A.A")).unwrap();

        let err = h.pool.acquire_slot(&key("/Game/C.C")).unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { capacity: 2 }));
        assert!(err.is_retryable());
        assert!(Arc::ptr_eq(&a, &h.pool.slot(&key("/Game/A.A")).unwrap()));
        // Nobody holds C, so nothing waits for it.
        assert_eq!(h.pool.render_state(&key("/Game/C.C")), None);

        h.pool.remove_referencer(&key("/Game/B.B"));
        let b_id = h.pool.slot(&key("/Game/B.B")).unwrap().id();
        let c = h.acquire(&key("/Game/C.C"));
        assert_eq!(c.id(), b_id);
        assert!(Arc::ptr_eq(&a, &h.pool.slot(&key("/Game/A.A")).unwrap()));
    }

    #[test]
    fn equal_timestamps_recycle_in_access_order() {
        let mut h = Harness::new(2);
        // Same frame: the clock does not move between acquisitions.
        let a = h.pool.acquire_slot(&key("/Game/A.A")).unwrap();
        let b = h.pool.acquire_slot(&key("/Game/B.B")).unwrap();
        h.pool.acquire_slot(&key("/Game/A.A")).unwrap();

        let c = h.pool.acquire_slot(&key("/Game/C.C")).unwrap();
        assert_eq!(c.id(), b.id());
        assert!(Arc::ptr_eq(&a, &h.pool.slot(&key("/Game/A.A")).unwrap()));
    }

    #[test]
    fn add_then_remove_referencer_keeps_the_slot() {
        let mut h = Harness::new(1);
        let a = h.acquire(&key("/Game/A.A"));
        assert_eq!(h.pool.add_referencer(&key("/Game/A.A")), 1);
        assert_eq!(h.pool.remove_referencer(&key("/Game/A.A")), 0);

        assert_eq!(h.pool.reference_count(&key("/Game/A.A")), 0);
        assert!(Arc::ptr_eq(&a, &h.pool.slot(&key("/Game/A.A")).unwrap()));
        assert!(Arc::ptr_eq(&a, &h.acquire(&key("/Game/A.A"))));
    }

    #[test]
    fn unmatched_remove_referencer_is_ignored() {
        let mut h = Harness::new(2);
        h.pool.add_referencer(&key("/Game/A.A"));
        assert_eq!(h.pool.remove_referencer(&key("/Game/B.B")), 0);
        assert_eq!(h.pool.remove_referencer(&key("/Game/B.B")), 0);
        assert_eq!(h.pool.reference_count(&key("/Game/A.A")), 1);
        assert_eq!(h.pool.reference_count(&key("/Game/B.B")), 0);
    }

    #[test]
    fn freed_slots_are_reused_most_recent_first_and_resized() {
        let mut h = Harness::new(2);
        h.acquire(&key("/Game/A.A"));
        let b = h.acquire(&key("/Game/B.B"));
        h.pool.free_thumbnail(&key("/Game/A.A")).unwrap();
        h.pool.free_thumbnail(&key("/Game/B.B")).unwrap();
        assert_eq!(h.pool.stats().free_slots, 2);

        let small = ThumbnailKey::square("/Game/D.D", 32);
        let d = h.acquire(&small);
        assert_eq!(d.id(), b.id());
        assert_eq!(d.size(), (32, 32));
        assert_eq!(h.pool.stats().free_slots, 1);
        assert_eq!(h.pool.stats().allocated_slots, 2);

        h.assets.load(AssetId::new("/Game/D.D"), TestAsset::solid(RED));
        h.tick();
        assert_eq!(
            h.pool.read_back(&small).unwrap(),
            ThumbnailImage::filled(32, 32, RED).unwrap()
        );
    }

    #[test]
    fn free_thumbnail_rejects_held_and_unknown_keys() {
        let mut h = Harness::new(2);
        h.pool.add_referencer(&key("/Game/A.A"));
        h.acquire(&key("/Game/A.A"));

        assert!(matches!(
            h.pool.free_thumbnail(&key("/Game/A.A")),
            Err(PoolError::StillReferenced { count: 1, .. })
        ));
        assert!(matches!(
            h.pool.free_thumbnail(&key("/Game/B.B")),
            Err(PoolError::UnknownKey(_))
        ));
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        let mut h = Harness::new(2);
        assert!(matches!(
            h.pool.acquire_slot(&ThumbnailKey::new("/Game/A.A", 0, 64)),
            Err(PoolError::InvalidDimensions { width: 0, height: 64, max: 512 })
        ));
        assert!(matches!(
            h.pool.acquire_slot(&ThumbnailKey::new("/Game/A.A", 64, 1024)),
            Err(PoolError::InvalidDimensions { .. })
        ));
        assert_eq!(h.pool.stats().allocated_slots, 0);
    }

    #[test]
    fn referenced_key_waits_for_capacity_and_binds_on_tick() {
        let mut h = Harness::new(1);
        h.load("/Game/B.B", TestAsset::solid(RED));
        h.pool.add_referencer(&key("/Game/A.A"));
        let a = h.acquire(&key("/Game/A.A"));

        h.pool.add_referencer(&key("/Game/B.B"));
        assert!(h.pool.acquire_slot(&key("/Game/B.B")).is_err());
        assert!(h.pool.is_queued(&key("/Game/B.B")));
        assert_eq!(h.pool.render_state(&key("/Game/B.B")), Some(RenderState::Pending));

        // Still held: nothing to bind.
        assert_eq!(h.tick().pending_bound, 0);

        h.pool.remove_referencer(&key("/Game/A.A"));
        let report = h.tick();
        assert_eq!(report.pending_bound, 1);
        assert_eq!(report.rendered, 1);
        assert_eq!(h.pool.slot(&key("/Game/B.B")).unwrap().id(), a.id());
        assert!(h.pool.is_rendered(&key("/Game/B.B")));
        assert_eq!(h.pool.render_state(&key("/Game/A.A")), None);
        drop(a);
    }

    #[test]
    fn releasing_a_pending_key_forgets_it() {
        let mut h = Harness::new(1);
        h.pool.add_referencer(&key("/Game/A.A"));
        h.acquire(&key("/Game/A.A"));
        h.pool.add_referencer(&key("/Game/B.B"));
        assert!(h.pool.acquire_slot(&key("/Game/B.B")).is_err());

        h.pool.remove_referencer(&key("/Game/B.B"));
        assert!(!h.pool.is_queued(&key("/Game/B.B")));
        assert_eq!(h.pool.render_state(&key("/Game/B.B")), None);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    #[test]
    fn tick_renders_queued_entries_and_notifies() {
        let mut h = Harness::new(4);
        h.load("/Game/A.A", TestAsset::solid(RED));
        h.acquire(&key("/Game/A.A"));
        assert!(h.pool.is_queued(&key("/Game/A.A")));
        assert!(!h.pool.is_rendered(&key("/Game/A.A")));

        let report = h.tick();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.failed, 0);
        assert!(h.pool.is_rendered(&key("/Game/A.A")));
        assert!(!h.pool.is_queued(&key("/Game/A.A")));
        assert_eq!(
            h.events(),
            vec![ThumbnailEvent::Rendered(AssetId::new("/Game/A.A"))]
        );
        assert_eq!(
            h.pool.read_back(&key("/Game/A.A")).unwrap(),
            ThumbnailImage::filled(64, 64, RED).unwrap()
        );

        // Nothing left to do.
        assert_eq!(h.tick(), TickReport::default());
    }

    #[test]
    fn throttling_skips_the_tick_unless_interacting() {
        let mut h = Harness::new(4);
        h.load("/Game/A.A", TestAsset::solid(RED));
        h.acquire(&key("/Game/A.A"));

        let throttled = EditorConditions {
            throttling: true,
            ..Default::default()
        };
        let report = h.pool.tick(&throttled).unwrap();
        assert!(report.skipped);
        assert!(h.pool.is_queued(&key("/Game/A.A")));

        let dragging = EditorConditions {
            throttling: true,
            interacting: true,
            ..Default::default()
        };
        let report = h.pool.tick(&dragging).unwrap();
        assert!(!report.skipped);
        assert_eq!(report.rendered, 1);
    }

    #[test]
    fn tick_stops_when_the_frame_budget_is_spent() {
        let mut h = Harness::new(8);
        let names: Vec<String> = (0..5).map(|i| format!("/Game/Slow{i}.Slow{i}")).collect();
        for name in &names {
            h.load(
                name,
                Arc::new(TestAsset {
                    cost: Some((h.clock.clone(), Duration::from_millis(2))),
                    ..Default::default()
                }),
            );
            h.acquire(&key(name));
        }

        // 5ms budget: renders start at 0, 2 and 4ms.
        let report = h.tick();
        assert_eq!(report.rendered, 3);
        assert_eq!(h.pool.stats().one_shot_queued, 2);
        assert!(h.pool.is_rendered(&key(&names[2])));
        assert!(h.pool.is_queued(&key(&names[3])));

        assert_eq!(h.tick().rendered, 2);
    }

    #[test]
    fn prioritized_keys_render_first() {
        let mut h = Harness::new(8);
        for name in ["/Game/A.A", "/Game/B.B", "/Game/C.C", "/Game/D.D"] {
            h.load(name, TestAsset::solid(RED));
            h.acquire(&key(name));
        }
        h.pool.prioritize(&[key("/Game/D.D"), key("/Game/B.B")]);
        h.tick();

        let order: Vec<_> = h
            .events()
            .into_iter()
            .map(|event| match event {
                ThumbnailEvent::Rendered(id) => id.to_string(),
                ThumbnailEvent::RenderFailed(id) => format!("failed {id}"),
            })
            .collect();
        assert_eq!(order, ["/Game/D.D", "/Game/B.B", "/Game/A.A", "/Game/C.C"]);
    }

    #[test]
    fn realtime_renders_are_capped_per_tick() {
        let mut h = Harness::new(16);
        let assets: Vec<_> = (0..6)
            .map(|i| {
                let name = format!("/Game/Fx{i}.Fx{i}");
                let asset = h.load(&name, TestAsset::realtime());
                h.acquire(&key(&name));
                asset
            })
            .collect();

        // First pass is the one-shot render; everything joins the real-time set.
        let report = h.tick();
        assert_eq!(report.rendered, 6);
        assert_eq!(report.realtime_rendered, 0);
        assert_eq!(h.pool.stats().realtime_queued, 6);

        h.clock.advance(Duration::from_millis(16));
        let report = h.tick();
        assert_eq!(report.realtime_rendered, 3);
        let twice = assets.iter().filter(|asset| asset.renders() == 2).count();
        assert_eq!(twice, 3);

        // Least recently rendered go next.
        h.clock.advance(Duration::from_millis(16));
        assert_eq!(h.tick().realtime_rendered, 3);
        assert!(assets.iter().all(|asset| asset.renders() == 2));
    }

    #[test]
    fn realtime_needs_setting_pool_permission_and_no_play_session() {
        let mut h = Harness::new(4);
        h.load("/Game/Fx.Fx", TestAsset::realtime());
        h.acquire(&key("/Game/Fx.Fx"));

        let playing = EditorConditions {
            play_in_editor: true,
            ..Default::default()
        };
        h.pool.tick(&playing).unwrap();
        assert!(h.pool.is_rendered(&key("/Game/Fx.Fx")));
        assert!(!h.pool.is_realtime(&key("/Game/Fx.Fx")));

        h.pool.set_realtime_allowed(false);
        h.pool.refresh_thumbnail(&key("/Game/Fx.Fx"));
        h.tick();
        assert!(!h.pool.is_realtime(&key("/Game/Fx.Fx")));

        h.pool.set_realtime_allowed(true);
        h.pool.refresh_thumbnail(&key("/Game/Fx.Fx"));
        h.tick();
        assert!(h.pool.is_realtime(&key("/Game/Fx.Fx")));

        let mut off = Harness::with_settings(ThumbnailSettings {
            realtime_enabled: false,
            ..Default::default()
        });
        off.load("/Game/Fx.Fx", TestAsset::realtime());
        off.acquire(&key("/Game/Fx.Fx"));
        off.tick();
        assert!(!off.pool.is_realtime(&key("/Game/Fx.Fx")));
    }

    #[test]
    fn realtime_only_rerenders_recently_accessed_entries() {
        let mut h = Harness::new(4);
        let fx = h.load("/Game/Fx.Fx", TestAsset::realtime());
        h.acquire(&key("/Game/Fx.Fx"));
        h.tick();
        assert_eq!(fx.renders(), 1);

        // Scrolled out of view for longer than the access window.
        h.clock.advance(Duration::from_secs(2));
        assert_eq!(h.tick().realtime_rendered, 0);
        assert!(h.pool.is_realtime(&key("/Game/Fx.Fx")));

        h.acquire(&key("/Game/Fx.Fx"));
        assert_eq!(h.tick().realtime_rendered, 1);
        assert_eq!(fx.renders(), 2);
    }

    #[test]
    fn unloaded_assets_leave_the_realtime_queue() {
        let mut h = Harness::new(4);
        h.load("/Game/Fx.Fx", TestAsset::realtime());
        h.acquire(&key("/Game/Fx.Fx"));
        h.tick();
        assert!(h.pool.is_realtime(&key("/Game/Fx.Fx")));

        h.assets.unload(&AssetId::new("/Game/Fx.Fx"));
        assert_eq!(h.tick().realtime_rendered, 0);
        assert!(!h.pool.is_realtime(&key("/Game/Fx.Fx")));
        assert!(h.pool.is_rendered(&key("/Game/Fx.Fx")));
    }

    #[test]
    fn missing_renderer_falls_back_to_the_serialized_cache() {
        let mut h = Harness::new(4);
        h.cache
            .store(
                "/Game/A.A",
                ObjectThumbnail::new(ThumbnailImage::filled(128, 128, BLUE).unwrap()),
            )
            .unwrap();
        h.acquire(&key("/Game/A.A"));

        let report = h.tick();
        assert_eq!(report.rendered, 1);
        assert_eq!(report.from_cache, 1);
        assert_eq!(
            h.events(),
            vec![ThumbnailEvent::Rendered(AssetId::new("/Game/A.A"))]
        );
        // Resized to the slot.
        assert_eq!(
            h.pool.read_back(&key("/Game/A.A")).unwrap(),
            ThumbnailImage::filled(64, 64, BLUE).unwrap()
        );
        assert!(!h.pool.is_realtime(&key("/Game/A.A")));
    }

    #[test]
    fn failed_render_is_not_retried_until_the_asset_changes() {
        let mut h = Harness::new(4);
        h.acquire(&key("/Game/A.A"));

        let report = h.tick();
        assert_eq!(report.failed, 1);
        assert_eq!(
            h.pool.render_state(&key("/Game/A.A")),
            Some(RenderState::Failed)
        );
        assert_eq!(
            h.events(),
            vec![ThumbnailEvent::RenderFailed(AssetId::new("/Game/A.A"))]
        );
        assert_eq!(h.tick(), TickReport::default());

        h.load("/Game/A.A", TestAsset::solid(RED));
        assert_eq!(h.pool.notify_asset_changed(&AssetId::new("/Game/A.A")), 1);
        assert_eq!(h.tick().rendered, 1);
        assert!(h.pool.is_rendered(&key("/Game/A.A")));
    }

    #[test]
    fn asset_change_requeues_every_size_variant_and_only_those() {
        let mut h = Harness::new(8);
        for name in ["/Game/A.A", "/Game/B.B"] {
            h.load(name, TestAsset::solid(RED));
        }
        let small = key("/Game/A.A");
        let large = ThumbnailKey::square("/Game/A.A", 128);
        let other = key("/Game/B.B");
        for k in [&small, &large, &other] {
            h.acquire(k);
        }
        h.tick();
        h.cache
            .store(
                "/Game/A.A",
                ObjectThumbnail::new(ThumbnailImage::filled(64, 64, RED).unwrap()),
            )
            .unwrap();

        assert_eq!(h.pool.notify_asset_changed(&AssetId::new("/Game/A.A")), 2);
        assert!(h.pool.is_queued(&small));
        assert!(h.pool.is_queued(&large));
        assert!(!h.pool.is_queued(&other));
        assert_eq!(h.cache.dirty_names(), vec!["/Game/A.A".to_string()]);

        assert_eq!(h.tick().rendered, 2);
    }

    #[test]
    fn upload_failure_on_the_render_thread_marks_the_entry_failed() {
        let mut h = Harness::with_backend(
            ThumbnailSettings::default(),
            Box::new(LostDevice(SoftwareBackend::new())),
        );
        h.load("/Game/A.A", TestAsset::solid(RED));
        h.acquire(&key("/Game/A.A"));

        assert_eq!(h.tick().rendered, 1);
        assert!(h.pool.is_rendered(&key("/Game/A.A")));
        // Readback runs after the update, so its failure has been reported.
        h.pool.read_back(&key("/Game/A.A")).unwrap();

        let report = h.tick();
        assert_eq!(report.failed, 1);
        assert_eq!(
            h.pool.render_state(&key("/Game/A.A")),
            Some(RenderState::Failed)
        );
        assert_eq!(
            h.events(),
            vec![
                ThumbnailEvent::Rendered(AssetId::new("/Game/A.A")),
                ThumbnailEvent::RenderFailed(AssetId::new("/Game/A.A")),
            ]
        );
        assert_eq!(h.tick(), TickReport::default());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut h = Harness::new(4);
        h.load("/Game/A.A", TestAsset::solid(RED));
        let extra = h.pool.subscribe();
        drop(extra);
        h.acquire(&key("/Game/A.A"));
        h.tick();
        assert_eq!(h.events().len(), 1);
        assert_eq!(h.pool.subscribers.len(), 1);
    }

    // ------------------------------------------------------------------
    // Serialized cache round trip
    // ------------------------------------------------------------------

    fn gradient() -> Arc<TestAsset> {
        Arc::new(TestAsset {
            gradient: true,
            ..Default::default()
        })
    }

    #[test]
    fn cached_thumbnail_matches_the_live_render() {
        let mut h = Harness::new(4);
        let id = AssetId::new("/Game/Rock.Rock");
        h.load("/Game/Rock.Rock", gradient());
        h.acquire(&key("/Game/Rock.Rock"));
        h.tick();
        let live = h.pool.read_back(&key("/Game/Rock.Rock")).unwrap();

        h.pool.regenerate_cached_thumbnail(&id, 64, 64).unwrap();
        h.assets.unload(&id);
        h.pool.notify_asset_changed(&id);
        let report = h.tick();
        assert_eq!(report.from_cache, 1);
        assert_eq!(h.pool.read_back(&key("/Game/Rock.Rock")).unwrap(), live);
    }

    #[test]
    fn disk_cached_thumbnail_matches_the_live_render() {
        let dir = tempfile::tempdir().unwrap();
        let id = AssetId::new("/Game/Rock.Rock");
        let assets = Arc::new(AssetRegistry::new());
        assets.load(id.clone(), gradient());

        let live = {
            let cache = Arc::new(DiskThumbnailCache::open(dir.path()).unwrap());
            let render = RenderThread::spawn(Box::new(SoftwareBackend::new()), 16).unwrap();
            let mut pool =
                ThumbnailPool::new(ThumbnailSettings::default(), render, assets.clone(), cache)
                    .with_clock(ManualClock::new());
            pool.acquire_slot(&key("/Game/Rock.Rock")).unwrap();
            pool.tick(&EditorConditions::default()).unwrap();
            pool.regenerate_cached_thumbnail(&id, 64, 64).unwrap();
            let live = pool.read_back(&key("/Game/Rock.Rock")).unwrap();
            pool.shutdown().unwrap();
            live
        };

        // A fresh session with the asset unloaded reads the PNG back.
        assets.unload(&id);
        let cache = Arc::new(DiskThumbnailCache::open(dir.path()).unwrap());
        let render = RenderThread::spawn(Box::new(SoftwareBackend::new()), 16).unwrap();
        let mut pool = ThumbnailPool::new(ThumbnailSettings::default(), render, assets, cache)
            .with_clock(ManualClock::new());
        pool.acquire_slot(&key("/Game/Rock.Rock")).unwrap();
        assert_eq!(pool.tick(&EditorConditions::default()).unwrap().from_cache, 1);
        assert_eq!(pool.read_back(&key("/Game/Rock.Rock")).unwrap(), live);
    }

    #[test]
    fn regenerate_requires_a_loaded_asset() {
        let h = Harness::new(4);
        let id = AssetId::new("/Game/Missing.Missing");
        assert!(matches!(
            h.pool.regenerate_cached_thumbnail(&id, 64, 64),
            Err(PoolError::NotLoaded(_))
        ));
        assert!(h.cache.is_empty());
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    #[test]
    fn shutdown_releases_every_slot() {
        let mut h = Harness::new(3);
        for name in ["/Game/A.A", "/Game/B.B", "/Game/C.C"] {
            h.acquire(&key(name));
        }
        h.pool.free_thumbnail(&key("/Game/B.B")).unwrap();

        let report = h.pool.shutdown().unwrap();
        assert_eq!(report.released_slots, 3);
        assert_eq!(report.render.live_slots, 0);
        assert_eq!(report.render.failures, 0);
    }

    #[test]
    fn shutdown_reports_slots_held_outside_the_pool() {
        let mut h = Harness::new(2);
        let held = h.acquire(&key("/Game/A.A"));
        h.acquire(&key("/Game/B.B"));

        match h.pool.shutdown() {
            Err(PoolError::LeakedSlots { slots }) => assert_eq!(slots, vec![held.id()]),
            other => panic!("expected a leak, got {other:?}"),
        }
    }

    #[test]
    fn shutdown_reports_held_slots_that_were_resized() {
        let mut h = Harness::new(1);
        let held = h.acquire(&key("/Game/A.A"));

        // Recycled for a smaller key while the old handle is still out.
        let small = h.acquire(&ThumbnailKey::square("/Game/B.B", 32));
        assert!(Arc::ptr_eq(&held, &small));
        assert_eq!(held.size(), (32, 32));
        drop(small);

        match h.pool.shutdown() {
            Err(PoolError::LeakedSlots { slots }) => assert_eq!(slots, vec![held.id()]),
            other => panic!("expected a leak, got {other:?}"),
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "leaked slots")]
    fn dropping_the_pool_with_a_held_slot_asserts() {
        let mut h = Harness::new(1);
        let _held = h.acquire(&key("/Game/A.A"));
        drop(h);
    }

    #[test]
    fn dropping_the_pool_tears_down_cleanly() {
        let mut h = Harness::new(2);
        h.acquire(&key("/Game/A.A"));
        let Harness { pool, events, .. } = h;
        drop(pool);
        assert!(events.try_recv().is_err());
    }
}
