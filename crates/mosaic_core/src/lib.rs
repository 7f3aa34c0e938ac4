//! Mosaic Core
//!
//! The asset thumbnail pool:
//! - Slot acquisition, reference counting and LRU recycling
//! - Time-budgeted render queue draining
//! - Render-thread synchronized shutdown
//! - Clocks for access stamps and tick budgets

pub mod pool;
pub mod time;

pub use pool::{
    PoolError, PoolStats, ReferenceTracker, RenderQueue, RenderState, ShutdownReport,
    ThumbnailEvent, ThumbnailKey, ThumbnailPool, ThumbnailRenderSlot, TickReport,
};
pub use time::{Clock, ManualClock, MonotonicClock};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
