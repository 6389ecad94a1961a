mod error;
mod ops;
mod renderer;
mod types;
mod ui;

use crate::types::project::ProjectMetadata;
use crate::ui::app::PoseSyncApp;
use gstreamer as gst;
use log::{error, info};

use std::path::PathBuf;

const DEFAULT_PROJECT_FILE: &str = "posesync.json";

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = gst::init() {
        error!("Failed to initialize GStreamer: {}", e);
    }

    let project_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_FILE));
    let project = ProjectMetadata::load_or_default(&project_path);
    info!(
        "Data directory {}, {} views, {} keypoints at {} fps",
        project.data_dir.display(),
        project.views.len(),
        project.keypoints.len(),
        project.frame_rate
    );

    let app = PoseSyncApp::new(project, project_path);

    let native_options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1400.0, 900.0]),
        ..Default::default()
    };
    eframe::run_native(
        "PoseSync",
        native_options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;
    Ok(())
}
