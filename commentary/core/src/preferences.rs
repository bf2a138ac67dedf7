//! User Preferences
//!
//! The render mode and stream quality survive process restarts. They are
//! written only by explicit user action and read by every sink.
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/autorec/preferences.json`:
//!
//! ```json
//! { "render_mode": "overlay", "stream_quality": "medium" }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How comments are presented
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// No commentary shown
    Off,
    /// Scrolling comments over the video
    #[default]
    Overlay,
    /// Chat-style list beside the video
    Sidebar,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Overlay => "overlay",
            Self::Sidebar => "sidebar",
        })
    }
}

impl FromStr for RenderMode {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "overlay" => Ok(Self::Overlay),
            "sidebar" => Ok(Self::Sidebar),
            other => Err(PreferenceError::UnknownValue(other.to_string())),
        }
    }
}

/// Live stream transcode quality
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    /// Smallest bitrate
    Low,
    /// Balanced
    #[default]
    Medium,
    /// Highest bitrate
    High,
}

impl StreamQuality {
    /// Query-string value understood by the live stream endpoint
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for StreamQuality {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(PreferenceError::UnknownValue(other.to_string())),
        }
    }
}

/// Persisted user setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPreference {
    /// Active render mode
    pub render_mode: RenderMode,
    /// Preferred live stream quality
    pub stream_quality: StreamQuality,
}

/// Errors from the preference store
#[derive(Debug, Error)]
pub enum PreferenceError {
    /// Reading or writing the preference file failed
    #[error("Preference file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The preference file is not valid JSON
    #[error("Malformed preference file: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A value could not be parsed
    #[error("Unknown preference value: {0}")]
    UnknownValue(String),
}

/// Shared, persisted preference store
///
/// Cloning shares the same state and file.
#[derive(Clone, Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    current: Arc<RwLock<RenderPreference>>,
}

impl PreferenceStore {
    /// Default preference file path
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("autorec").join("preferences.json"))
    }

    /// Load from the default path
    #[must_use]
    pub fn load_default() -> Self {
        match Self::default_path() {
            Some(path) => Self::load(path),
            None => Self::in_memory(),
        }
    }

    /// Load preferences from `path`
    ///
    /// A missing or unreadable file yields defaults; the file is (re)written
    /// on the next change.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match read_preference(&path) {
            Ok(Some(pref)) => pref,
            Ok(None) => RenderPreference::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable preferences, using defaults");
                RenderPreference::default()
            }
        };

        Self {
            path: Some(path),
            current: Arc::new(RwLock::new(current)),
        }
    }

    /// A store that never touches disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Arc::new(RwLock::new(RenderPreference::default())),
        }
    }

    /// Current preference
    #[must_use]
    pub fn get(&self) -> RenderPreference {
        *self.current.read()
    }

    /// Current render mode
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.current.read().render_mode
    }

    /// Current stream quality
    #[must_use]
    pub fn stream_quality(&self) -> StreamQuality {
        self.current.read().stream_quality
    }

    /// Change the render mode and persist it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written. The in-memory value is
    /// updated regardless.
    pub fn set_mode(&self, mode: RenderMode) -> Result<(), PreferenceError> {
        self.update(|pref| pref.render_mode = mode)
    }

    /// Change the stream quality and persist it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written. The in-memory value is
    /// updated regardless.
    pub fn set_stream_quality(&self, quality: StreamQuality) -> Result<(), PreferenceError> {
        self.update(|pref| pref.stream_quality = quality)
    }

    fn update(&self, apply: impl FnOnce(&mut RenderPreference)) -> Result<(), PreferenceError> {
        let snapshot = {
            let mut current = self.current.write();
            apply(&mut current);
            *current
        };

        let Some(path) = &self.path else {
            return Ok(());
        };
        write_preference(path, &snapshot)?;
        tracing::debug!(
            path = %path.display(),
            mode = %snapshot.render_mode,
            quality = snapshot.stream_quality.as_str(),
            "Preferences saved"
        );
        Ok(())
    }
}

fn read_preference(path: &Path) -> Result<Option<RenderPreference>, PreferenceError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PreferenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_preference(path: &Path, pref: &RenderPreference) -> Result<(), PreferenceError> {
    let io_err = |source| PreferenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(pref)?;
    std::fs::write(path, json).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let store = PreferenceStore::in_memory();
        assert_eq!(store.mode(), RenderMode::Overlay);
        assert_eq!(store.stream_quality(), StreamQuality::Medium);
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let store = PreferenceStore::load(&path);
        store.set_mode(RenderMode::Sidebar).unwrap();
        store.set_stream_quality(StreamQuality::High).unwrap();

        let reloaded = PreferenceStore::load(&path);
        assert_eq!(reloaded.mode(), RenderMode::Sidebar);
        assert_eq!(reloaded.stream_quality(), StreamQuality::High);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = PreferenceStore::load(&path);
        assert_eq!(store.get(), RenderPreference::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, r#"{"render_mode":"off"}"#).unwrap();

        let store = PreferenceStore::load(&path);
        assert_eq!(store.mode(), RenderMode::Off);
        assert_eq!(store.stream_quality(), StreamQuality::Medium);
    }

    #[test]
    fn test_clones_share_state() {
        let store = PreferenceStore::in_memory();
        let other = store.clone();
        store.set_mode(RenderMode::Off).unwrap();
        assert_eq!(other.mode(), RenderMode::Off);
    }

    #[test]
    fn test_parse_values() {
        assert_eq!("Sidebar".parse::<RenderMode>().unwrap(), RenderMode::Sidebar);
        assert_eq!("low".parse::<StreamQuality>().unwrap(), StreamQuality::Low);
        assert!(matches!(
            "loud".parse::<RenderMode>(),
            Err(PreferenceError::UnknownValue(_))
        ));
    }
}
