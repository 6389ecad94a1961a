use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{Error, Result};

/// Static description of a multi-camera project: where the data lives, which
/// views and keypoints exist, and how playback time maps to frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_video_dir")]
    pub video_dir: String,
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: String,
    /// Single-letter camera identifiers, in display order.
    #[serde(default = "default_views")]
    pub views: Vec<String>,
    /// Keypoint names, in the body part order of the prediction files.
    #[serde(default = "default_keypoints")]
    pub keypoints: Vec<String>,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,
    /// Token in a session key standing for the camera, e.g. `Cam-N`.
    #[serde(default = "default_camera_placeholder")]
    pub camera_placeholder: String,
    /// Removed from the key when deriving a prediction file name.
    #[serde(default = "default_quality_suffix")]
    pub quality_suffix: String,
    #[serde(default = "default_tile_width")]
    pub tile_width: f32,
    #[serde(default = "default_prediction_cache_size")]
    pub prediction_cache_size: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_video_dir() -> String {
    "videos".to_string()
}
fn default_predictions_dir() -> String {
    "video_preds".to_string()
}
fn default_views() -> Vec<String> {
    ["A", "B", "C", "D", "E", "F"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}
fn default_keypoints() -> Vec<String> {
    let mut names = Vec::new();
    for side in ['L', 'R'] {
        for leg in 1..=3 {
            for joint in ['A', 'B', 'C', 'D', 'E'] {
                names.push(format!("{}{}{}", side, leg, joint));
            }
        }
    }
    names
}
fn default_frame_rate() -> f64 {
    300.0
}
fn default_camera_placeholder() -> String {
    "Cam-N".to_string()
}
fn default_quality_suffix() -> String {
    ".fine".to_string()
}
fn default_tile_width() -> f32 {
    360.0
}
fn default_prediction_cache_size() -> usize {
    16
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            video_dir: default_video_dir(),
            predictions_dir: default_predictions_dir(),
            views: default_views(),
            keypoints: default_keypoints(),
            frame_rate: default_frame_rate(),
            camera_placeholder: default_camera_placeholder(),
            quality_suffix: default_quality_suffix(),
            tile_width: default_tile_width(),
            prediction_cache_size: default_prediction_cache_size(),
        }
    }
}

impl ProjectMetadata {
    /// Save the project metadata to a JSON file at the given path.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load project metadata from a JSON file at the given path.
    pub fn load_from_file(path: &Path) -> Result<ProjectMetadata> {
        let mut file = File::open(path)?;
        let mut json = String::new();
        file.read_to_string(&mut json)?;
        let project: ProjectMetadata = serde_json::from_str(&json)?;
        project.validate()?;
        Ok(project)
    }

    /// Loads `path`, falling back to defaults if it is missing or invalid.
    pub fn load_or_default(path: &Path) -> ProjectMetadata {
        if !path.exists() {
            info!("No project file at {}, using defaults", path.display());
            return ProjectMetadata::default();
        }
        match Self::load_from_file(path) {
            Ok(project) => {
                info!("Loaded project from {}", path.display());
                project
            }
            Err(e) => {
                warn!("Ignoring project file {}: {}", path.display(), e);
                ProjectMetadata::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(Error::Config(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.views.is_empty() {
            return Err(Error::Config("at least one view is required".to_string()));
        }
        if self.camera_placeholder.is_empty() {
            return Err(Error::Config("camera_placeholder is empty".to_string()));
        }
        if !(self.tile_width.is_finite() && self.tile_width > 0.0) {
            return Err(Error::Config(format!(
                "tile_width must be positive, got {}",
                self.tile_width
            )));
        }
        Ok(())
    }

    pub fn video_root(&self) -> PathBuf {
        self.data_dir.join(&self.video_dir)
    }

    pub fn predictions_root(&self) -> PathBuf {
        self.data_dir.join(&self.predictions_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posesync.json");
        let project = ProjectMetadata {
            views: vec!["A".to_string(), "B".to_string()],
            frame_rate: 60.0,
            ..ProjectMetadata::default()
        };
        project.save_to_file(&path).unwrap();
        let loaded = ProjectMetadata::load_from_file(&path).unwrap();
        assert_eq!(project, loaded);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posesync.json");
        std::fs::write(&path, r#"{ "views": ["A"] }"#).unwrap();
        let loaded = ProjectMetadata::load_from_file(&path).unwrap();
        assert_eq!(loaded.views, vec!["A".to_string()]);
        assert_eq!(loaded.frame_rate, 300.0);
        assert_eq!(loaded.keypoints.len(), 30);
        assert_eq!(loaded.keypoints[0], "L1A");
        assert_eq!(loaded.keypoints[29], "R3E");
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posesync.json");
        std::fs::write(&path, r#"{ "frame_rate": -1.0 }"#).unwrap();
        assert!(matches!(
            ProjectMetadata::load_from_file(&path),
            Err(Error::Config(_))
        ));
        assert_eq!(
            ProjectMetadata::load_or_default(&path),
            ProjectMetadata::default()
        );
        assert_eq!(
            ProjectMetadata::load_or_default(&dir.path().join("missing.json")),
            ProjectMetadata::default()
        );
    }
}
