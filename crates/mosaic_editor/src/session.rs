//! Editor session: owns the thumbnail pool and plays UI frames against it

use crate::assets;
use mosaic_asset::{AssetId, AssetRegistry, ThumbnailCache};
use mosaic_core::{PoolError, ShutdownReport, ThumbnailEvent, ThumbnailKey, ThumbnailPool, TickReport};
use mosaic_render::RenderThread;
use mosaic_services::{EditorConditions, ThumbnailSettings};
use std::collections::HashSet;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Shape of the simulated content browser.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub asset_count: usize,
    /// Tiles on screen at once.
    pub visible_tiles: usize,
    pub tile_size: u32,
    pub frames: usize,
    /// The view scrolls by one row every this many frames.
    pub frames_per_scroll: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            asset_count: 48,
            visible_tiles: 12,
            tile_size: 64,
            frames: 120,
            frames_per_scroll: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames: usize,
    pub skipped_ticks: usize,
    pub rendered: usize,
    pub realtime_rendered: usize,
    pub from_cache: usize,
    pub failed: usize,
    pub exhausted: usize,
    pub rendered_events: usize,
    pub failed_events: usize,
    pub regenerated: usize,
}

impl SessionSummary {
    fn record(&mut self, report: &TickReport) {
        self.frames += 1;
        self.skipped_ticks += report.skipped as usize;
        self.rendered += report.rendered;
        self.realtime_rendered += report.realtime_rendered;
        self.from_cache += report.from_cache;
        self.failed += report.failed;
    }
}

/// One pool per session, shared with every tile by `&mut` access through
/// the session.
pub struct EditorSession {
    pool: ThumbnailPool,
    registry: Arc<AssetRegistry>,
    cache: Arc<dyn ThumbnailCache>,
    events: Receiver<ThumbnailEvent>,
    config: SessionConfig,
    assets: Vec<AssetId>,
    visible: Vec<ThumbnailKey>,
    summary: SessionSummary,
}

impl EditorSession {
    pub fn new(
        settings: ThumbnailSettings,
        render: RenderThread,
        registry: Arc<AssetRegistry>,
        cache: Arc<dyn ThumbnailCache>,
        config: SessionConfig,
    ) -> Self {
        let assets = assets::populate(&registry, config.asset_count);
        let mut pool = ThumbnailPool::new(settings, render, registry.clone(), cache.clone());
        let events = pool.subscribe();
        tracing::info!(
            assets = assets.len(),
            visible = config.visible_tiles,
            "editor session opened"
        );

        Self {
            pool,
            registry,
            cache,
            events,
            config,
            assets,
            visible: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn pool(&self) -> &ThumbnailPool {
        &self.pool
    }

    /// Keys on screen for `frame`: a window over the asset list that moves
    /// one row at a time.
    fn view(&self, frame: usize) -> Vec<ThumbnailKey> {
        if self.assets.is_empty() {
            return Vec::new();
        }
        let row = 4;
        let start = (frame / self.config.frames_per_scroll.max(1)) * row;
        (0..self.config.visible_tiles.min(self.assets.len()))
            .map(|offset| {
                let id = &self.assets[(start + offset) % self.assets.len()];
                ThumbnailKey::square(id.clone(), self.config.tile_size)
            })
            .collect()
    }

    /// Tiles that scrolled in take a reference, tiles that scrolled out drop
    /// theirs, then every visible tile reads its slot.
    fn update_view(&mut self, frame: usize) -> Result<(), PoolError> {
        let next = self.view(frame);
        let next_set: HashSet<_> = next.iter().cloned().collect();
        let previous: HashSet<_> = self.visible.iter().cloned().collect();

        for key in self.visible.iter().filter(|key| !next_set.contains(*key)) {
            self.pool.remove_referencer(key);
        }
        for key in next.iter().filter(|key| !previous.contains(*key)) {
            self.pool.add_referencer(key);
        }

        for key in &next {
            match self.pool.acquire_slot(key) {
                Ok(_) => {}
                Err(err) if err.is_retryable() => self.summary.exhausted += 1,
                Err(err) => return Err(err),
            }
        }
        self.pool.prioritize(&next);
        self.visible = next;
        Ok(())
    }

    /// Run one UI frame.
    pub fn frame(
        &mut self,
        frame: usize,
        conditions: &EditorConditions,
    ) -> Result<TickReport, PoolError> {
        self.update_view(frame)?;
        let report = self.pool.tick(conditions)?;
        self.summary.record(&report);

        for event in self.events.try_iter() {
            match event {
                ThumbnailEvent::Rendered(_) => self.summary.rendered_events += 1,
                ThumbnailEvent::RenderFailed(id) => {
                    self.summary.failed_events += 1;
                    tracing::debug!(asset = %id, "tile shows placeholder");
                }
            }
        }
        Ok(report)
    }

    /// Simulated frame conditions: an occasional throttled frame and a short
    /// play-in-editor session in the middle.
    fn conditions(&self, frame: usize) -> EditorConditions {
        let frames = self.config.frames;
        EditorConditions {
            throttling: frame % 7 == 6,
            interacting: frame % 21 == 20,
            play_in_editor: (frames / 2..frames / 2 + 10).contains(&frame),
        }
    }

    /// Play every frame, edit an asset halfway through, then save the dirty
    /// serialized thumbnails and shut the pool down.
    pub fn run(mut self) -> Result<(SessionSummary, ShutdownReport), PoolError> {
        for frame in 0..self.config.frames {
            if frame == self.config.frames / 3 {
                self.save_thumbnails()?;
            }
            if frame == self.config.frames / 2 {
                if let Some(edited) = self.visible.first().map(|key| key.asset().clone()) {
                    let queued = self.pool.notify_asset_changed(&edited);
                    tracing::info!(asset = %edited, queued, "asset edited");
                }
            }
            let conditions = self.conditions(frame);
            self.frame(frame, &conditions)?;
        }
        self.save_thumbnails()?;

        for key in std::mem::take(&mut self.visible) {
            self.pool.remove_referencer(&key);
        }

        let stats = self.pool.stats();
        tracing::info!(
            entries = stats.entries,
            allocated = stats.allocated_slots,
            queued = stats.one_shot_queued,
            realtime = stats.realtime_queued,
            avg_tick_ms = self.pool.tick_timer().average_ms(),
            "session finished"
        );
        for (name, value) in self.pool.counters().snapshot() {
            tracing::debug!(counter = name, value, "pool counter");
        }

        let Self { pool, summary, .. } = self;
        let report = pool.shutdown()?;
        Ok((summary, report))
    }

    /// Store a serialized thumbnail for every visible asset that has none,
    /// and regenerate the ones marked dirty.
    fn save_thumbnails(&mut self) -> Result<(), PoolError> {
        let size = self.config.tile_size;
        let mut targets: Vec<AssetId> = self
            .cache
            .dirty_names()
            .into_iter()
            .map(AssetId::from)
            .collect();
        targets.extend(
            self.visible
                .iter()
                .map(|key| key.asset().clone())
                .filter(|id| self.cache.find(id.full_name()).is_none()),
        );
        targets.sort();
        targets.dedup();

        for id in targets {
            if !self.registry.is_loaded(&id) {
                continue;
            }
            match self.pool.regenerate_cached_thumbnail(&id, size, size) {
                Ok(()) => self.summary.regenerated += 1,
                Err(PoolError::RenderThumbnail(err)) => {
                    tracing::debug!(asset = %id, "no serialized thumbnail: {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
