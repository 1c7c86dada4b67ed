//! Application configuration.
//!
//! A JSON document in the application data directory, deserialized with
//! per-section defaults so a partial or missing file always yields a usable
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HostError, HostResult};

/// Configuration file name inside the data directory.
const CONFIG_FILE_NAME: &str = "config.json";

/// Camera capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    /// Preferred capture device, `None` for the platform default.
    pub device_id: Option<String>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            width: 640,
            height: 480,
            frame_rate: 30,
        }
    }
}

/// Detection tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectionConfig {
    pub min_confidence: f64,
    pub max_results: u32,
    pub eye_contact_threshold: f64,
    /// Frames a result must persist before it is reported.
    pub stabilization_frames: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            max_results: 5,
            eye_contact_threshold: 0.7,
            stabilization_frames: 3,
        }
    }
}

/// Capture storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaConfig {
    pub format: String,
    /// Directory captures are written to, `None` for the platform pictures
    /// directory.
    pub save_path: Option<PathBuf>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            format: "png".to_string(),
            save_path: None,
        }
    }
}

/// UI preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiConfig {
    pub theme: String,
    pub show_face_panels: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            show_face_panels: true,
        }
    }
}

/// The full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub media: MediaConfig,
    pub ui: UiConfig,
}

/// Owns the configuration document and its file.
pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<AppConfig>,
}

impl ConfigStore {
    /// Creates a store persisting under `data_dir`, loading any existing
    /// file. A missing or unreadable file falls back to defaults.
    #[must_use]
    pub fn new(data_dir: &Path) -> Arc<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let config = load_config(&path);
        Arc::new(Self {
            path,
            config: RwLock::new(config),
        })
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Current configuration as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.get()).unwrap_or(Value::Null)
    }

    /// Applies a partial update and persists the result.
    ///
    /// The patch is merged per section: `{ "camera": { "frameRate": 15 } }`
    /// only touches that one field.
    ///
    /// # Errors
    ///
    /// Returns an error when the patch is not an object, the merged document
    /// does not deserialize, or the file cannot be written.
    pub fn update(&self, patch: &Value) -> HostResult<AppConfig> {
        if !patch.is_object() {
            return Err(HostError::Handler("config patch must be an object".to_string()));
        }

        let merged = {
            let mut current = serde_json::to_value(self.get())?;
            merge_values(&mut current, patch);
            serde_json::from_value::<AppConfig>(current)?
        };

        *self.config.write() = merged.clone();
        self.save()?;
        debug!("configuration updated");
        Ok(merged)
    }

    /// Writes the current configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or file cannot be written.
    pub fn save(&self) -> HostResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.get())?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }
}

fn load_config(path: &Path) -> AppConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                info!("loaded configuration from {}", path.display());
                config
            }
            Err(err) => {
                warn!("invalid configuration file, using defaults: {err}");
                AppConfig::default()
            }
        },
        Err(_) => AppConfig::default(),
    }
}

/// Deep-merges `patch` into `target`. Objects merge recursively, everything
/// else replaces.
fn merge_values(target: &mut Value, patch: &Value) {
    if let (Value::Object(target_map), Value::Object(patch_map)) = (&mut *target, patch) {
        for (key, value) in patch_map {
            match target_map.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => {
                    merge_values(existing, value);
                }
                _ => {
                    target_map.insert(key.clone(), value.clone());
                }
            }
        }
    } else {
        *target = patch.clone();
    }
}
