//! Settings management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings io: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Editor settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thumbnails: ThumbnailSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Maximum number of live render slots.
    pub pool_capacity: usize,
    /// Time budget for draining the render queue in one tick.
    pub max_frame_time_ms: f64,
    /// Upper bound on real-time re-renders per tick.
    pub max_realtime_per_tick: usize,
    /// Global switch for real-time thumbnails.
    pub realtime_enabled: bool,
    /// Real-time entries not accessed within this window are not re-rendered.
    pub realtime_access_window_ms: f64,
    /// Capacity of the render-thread command channel.
    pub command_queue_capacity: usize,
}

impl ThumbnailSettings {
    pub fn max_frame_time(&self) -> Duration {
        millis(self.max_frame_time_ms)
    }

    pub fn realtime_access_window(&self) -> Duration {
        millis(self.realtime_access_window_ms)
    }
}

fn millis(ms: f64) -> Duration {
    Duration::from_micros((ms.max(0.0) * 1000.0).round() as u64)
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            pool_capacity: 1024,
            max_frame_time_ms: 5.0,
            max_realtime_per_tick: 3,
            realtime_enabled: true,
            realtime_access_window_ms: 1000.0,
            command_queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// CPU-side buffers; always available.
    Software,
    /// wgpu device; fails when no adapter is present.
    Gpu,
    /// Try the GPU, fall back to software.
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub backend: BackendPreference,
    /// Largest texture edge the software backend accepts.
    pub software_max_texture_size: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            software_max_texture_size: 8192,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path.display(), "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
