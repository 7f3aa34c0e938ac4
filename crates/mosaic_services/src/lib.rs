//! Mosaic Services Layer
//!
//! Settings persistence and the editor-session state the thumbnail pool
//! consults every frame.

pub mod conditions;
pub mod settings;

pub use conditions::EditorConditions;
pub use settings::{BackendPreference, RenderSettings, Settings, SettingsError, ThumbnailSettings};
