//! Session keys and the per-view resources they name.
//!
//! A session key is a video file stem in which the camera token has been
//! replaced by the project's camera placeholder, e.g.
//! `05272019_fly3_0_R1C24_Cam-N_rot-ccw-0.06_sec.fine`. The last character of
//! the placeholder stands for the view letter.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;
use crate::types::project::ProjectMetadata;

const VIDEO_EXTENSION: &str = ".mp4";
const PREDICTION_EXTENSION: &str = ".csv";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    pub key: String,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Session { key: key.into() }
    }

    /// The key with the camera placeholder replaced by `view`.
    pub fn view_stem(&self, placeholder: &str, view: &str) -> String {
        self.key.replace(placeholder, &camera_token(placeholder, view))
    }

    pub fn video_path(&self, project: &ProjectMetadata, view: &str) -> PathBuf {
        let stem = self.view_stem(&project.camera_placeholder, view);
        project
            .video_root()
            .join(format!("{}{}", stem, VIDEO_EXTENSION))
    }

    /// Predictions are named after the video without its quality suffix.
    pub fn prediction_path(&self, project: &ProjectMetadata, view: &str) -> PathBuf {
        let stem = self.view_stem(&project.camera_placeholder, view);
        let stem = if project.quality_suffix.is_empty() {
            stem
        } else {
            stem.replacen(&project.quality_suffix, "", 1)
        };
        project
            .predictions_root()
            .join(format!("{}{}", stem, PREDICTION_EXTENSION))
    }
}

fn camera_token(placeholder: &str, view: &str) -> String {
    let mut prefix = placeholder.chars();
    prefix.next_back();
    format!("{}{}", prefix.as_str(), view)
}

/// Collapses per-camera video file names into session keys, keeping the
/// order in which each session is first seen. Names without a camera token
/// are kept as their own session.
pub fn session_keys<'a>(
    file_names: impl IntoIterator<Item = &'a str>,
    placeholder: &str,
    views: &[String],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for name in file_names {
        let Some(stem) = name.strip_suffix(VIDEO_EXTENSION) else {
            continue;
        };
        let key = views
            .iter()
            .map(|view| format!("_{}_", camera_token(placeholder, view)))
            .find(|token| stem.contains(token.as_str()))
            .map(|token| stem.replacen(&token, &format!("_{}_", placeholder), 1))
            .unwrap_or_else(|| stem.to_string());
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

/// Lists the sessions available in the project's video directory.
pub fn scan_sessions(project: &ProjectMetadata) -> Result<Vec<Session>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(project.video_root())? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(session_keys(
        names.iter().map(String::as_str),
        &project.camera_placeholder,
        &project.views,
    )
    .into_iter()
    .map(Session::new)
    .collect())
}
