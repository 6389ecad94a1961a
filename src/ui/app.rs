use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use log::{info, warn};

use crate::ops::session_loader::{FsPredictionSource, LoadState, SessionLoader};
use crate::renderer::gst_video::GstMediaDiscoverer;
use crate::renderer::playback_coordinator::PlaybackCoordinator;
use crate::types::keypoint::DEFAULT_KEYPOINT_COLOR;
use crate::types::project::ProjectMetadata;
use crate::types::session::{Session, scan_sessions};
use crate::ui::session_list::{SessionListEvent, session_list_panel};
use crate::ui::video_tile::VideoTile;

pub struct PoseSyncApp {
    project: ProjectMetadata,
    project_path: PathBuf,
    coordinator: Rc<RefCell<PlaybackCoordinator>>,
    loader: SessionLoader,
    sessions: Vec<Session>,
    scan_error: Option<String>,
    tiles: Vec<VideoTile>,
    keypoint_colors: Vec<egui::Color32>,
    show_labels: bool,
}

impl PoseSyncApp {
    pub fn new(project: ProjectMetadata, project_path: PathBuf) -> Self {
        let coordinator = PlaybackCoordinator::shared(project.frame_rate);
        let loader = SessionLoader::new(
            Arc::new(FsPredictionSource),
            Arc::new(GstMediaDiscoverer),
            project.prediction_cache_size,
        );
        let keypoint_colors = vec![DEFAULT_KEYPOINT_COLOR; project.keypoints.len()];
        let mut app = Self {
            project,
            project_path,
            coordinator,
            loader,
            sessions: Vec::new(),
            scan_error: None,
            tiles: Vec::new(),
            keypoint_colors,
            show_labels: false,
        };
        app.rescan();
        app
    }

    fn rescan(&mut self) {
        match scan_sessions(&self.project) {
            Ok(sessions) => {
                info!(
                    "Found {} sessions in {}",
                    sessions.len(),
                    self.project.video_root().display()
                );
                self.sessions = sessions;
                self.scan_error = None;
            }
            Err(e) => {
                warn!(
                    "Cannot list videos in {}: {}",
                    self.project.video_root().display(),
                    e
                );
                self.sessions.clear();
                self.scan_error = Some(e.to_string());
            }
        }
    }

    fn select_session(&mut self, session: Session) {
        // Tiles unregister from the coordinator on drop, so no borrow of it
        // may be held here.
        self.tiles.clear();
        self.loader.load_session(
            session,
            &self.project,
            &mut self.coordinator.borrow_mut(),
        );
        if self.loader.state() == LoadState::Loaded {
            self.rebuild_tiles();
        }
    }

    fn rebuild_tiles(&mut self) {
        self.tiles.clear();
        for model in self.loader.widget_models(&self.project) {
            let mut tile = VideoTile::new(model, &self.coordinator, self.project.tile_width);
            for (body_part, color) in self.keypoint_colors.iter().enumerate() {
                tile.set_keypoint_color(body_part, *color);
            }
            self.tiles.push(tile);
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        let mut coordinator = self.coordinator.borrow_mut();
        ui.horizontal(|ui| {
            if ui
                .button(if coordinator.is_playing() { "Pause" } else { "Play" })
                .clicked()
            {
                coordinator.toggle_playing();
            }
            if ui.button("<<").on_hover_text("Previous frame").clicked() {
                coordinator.step_frames(-1);
            }
            if ui.button(">>").on_hover_text("Next frame").clicked() {
                coordinator.step_frames(1);
            }

            let duration = coordinator.duration().max(0.0);
            let mut time = coordinator.current_time().clamp(0.0, duration);
            ui.spacing_mut().slider_width = (ui.available_width() - 260.0).max(100.0);
            let slider = egui::Slider::new(&mut time, 0.0..=duration)
                .show_value(false)
                .text("Seek");
            if ui.add(slider).changed() {
                coordinator.seek(time);
            }

            ui.label(
                egui::RichText::new(format!(
                    "{:.3} s / {:.3} s  frame {}",
                    coordinator.current_time(),
                    duration,
                    coordinator.current_frame()
                ))
                .monospace(),
            );
            ui.checkbox(&mut self.show_labels, "Labels");
        });
    }

    fn keypoint_colors_panel(&mut self, ui: &mut egui::Ui) {
        egui::CollapsingHeader::new("Keypoint colors").show(ui, |ui| {
            egui::ScrollArea::vertical()
                .id_salt("keypoint_colors")
                .max_height(240.0)
                .show(ui, |ui| {
                    for (body_part, name) in self.project.keypoints.iter().enumerate() {
                        let Some(color) = self.keypoint_colors.get_mut(body_part) else {
                            continue;
                        };
                        ui.horizontal(|ui| {
                            if ui.color_edit_button_srgba(color).changed() {
                                for tile in &mut self.tiles {
                                    tile.set_keypoint_color(body_part, *color);
                                }
                            }
                            ui.label(name);
                        });
                    }
                });
        });
    }
}

impl eframe::App for PoseSyncApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.loader.poll() {
            self.rebuild_tiles();
        }

        for tile in &mut self.tiles {
            tile.update(ctx);
            self.coordinator.borrow_mut().on_time_update(tile.stream());
        }

        // Left: sessions
        let mut event = None;
        egui::SidePanel::left("session_panel")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                event = session_list_panel(
                    ui,
                    &self.sessions,
                    self.loader.session(),
                    self.loader.state(),
                    self.scan_error.as_deref(),
                );
                ui.separator();
                self.keypoint_colors_panel(ui);
            });
        match event {
            Some(SessionListEvent::Selected(session)) => self.select_session(session),
            Some(SessionListEvent::DataDirPicked(path)) => {
                info!("Switching data directory to {}", path.display());
                self.project.data_dir = path;
                match self.project.save_to_file(&self.project_path) {
                    Ok(()) => info!("Saved project to {}", self.project_path.display()),
                    Err(e) => warn!(
                        "Failed to save project to {}: {}",
                        self.project_path.display(),
                        e
                    ),
                }
                self.rescan();
            }
            None => {}
        }

        // Bottom: playback controls
        egui::TopBottomPanel::bottom("controls_panel").show(ctx, |ui| {
            ui.add_space(4.0);
            self.controls(ui);
            ui.add_space(4.0);
        });

        // Center: one tile per view
        egui::CentralPanel::default().show(ctx, |ui| {
            if self.loader.session().is_none() {
                ui.label("Select a session");
            } else if self.loader.state() == LoadState::Loading {
                ui.spinner();
            }
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.horizontal_wrapped(|ui| {
                    for tile in &self.tiles {
                        tile.show(ui, self.show_labels);
                    }
                });
            });
        });

        self.coordinator.borrow_mut().after_render();

        if self.coordinator.borrow().is_playing() {
            ctx.request_repaint();
        } else {
            // Decoded frames land asynchronously after seeks.
            ctx.request_repaint_after(Duration::from_millis(50));
        }
    }
}
