//! Mosaic Editor
//!
//! Headless content-browser session that drives the thumbnail pool.
//!
//! Usage: `mosaic-editor [settings.json] [thumbnail-cache-dir]`

mod assets;
mod session;

use anyhow::{Context, Result};
use mosaic_asset::{AssetRegistry, DiskThumbnailCache, MemoryThumbnailCache, ThumbnailCache};
use mosaic_render::{create_backend, RenderThread};
use mosaic_services::Settings;
use session::{EditorSession, SessionConfig};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Mosaic Editor v{}", mosaic_core::VERSION);

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load_or_default(Path::new(&path))
            .with_context(|| format!("failed to load settings from {path}"))?,
        None => Settings::default(),
    };

    let cache: Arc<dyn ThumbnailCache> = match args.next() {
        Some(dir) => Arc::new(
            DiskThumbnailCache::open(&dir)
                .with_context(|| format!("failed to open thumbnail cache at {dir}"))?,
        ),
        None => Arc::new(MemoryThumbnailCache::new()),
    };

    let backend = create_backend(&settings.render).context("no render backend available")?;
    let render = RenderThread::spawn(backend, settings.thumbnails.command_queue_capacity)?;

    let session = EditorSession::new(
        settings.thumbnails,
        render,
        Arc::new(AssetRegistry::new()),
        cache,
        SessionConfig::default(),
    );
    let (summary, report) = session.run()?;

    tracing::info!(
        frames = summary.frames,
        skipped = summary.skipped_ticks,
        rendered = summary.rendered,
        realtime = summary.realtime_rendered,
        from_cache = summary.from_cache,
        failed = summary.failed,
        exhausted = summary.exhausted,
        regenerated = summary.regenerated,
        "thumbnail summary"
    );
    tracing::info!(
        released_slots = report.released_slots,
        render_commands = report.render.commands,
        render_failures = report.render.failures,
        "editor shut down"
    );

    Ok(())
}
