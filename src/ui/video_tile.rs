use eframe::egui;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::error;

use crate::error::Error;
use crate::ops::keypoint_projector::{GeometryProvider, KeypointLayer};
use crate::ops::session_loader::VideoWidgetModel;
use crate::renderer::gst_video::GstVideo;
use crate::renderer::playback_coordinator::{PlaybackCoordinator, StreamRegistration};
use crate::types::media::{VideoFrame, VideoMetadata};
use crate::types::stream::{MediaHandle, Stream, StreamRef};
use crate::ui::keypoint_container::keypoint_container;

/// One camera view: its video, registered with the coordinator for as long
/// as the tile lives, and its keypoint overlay.
pub struct VideoTile {
    id: String,
    video_path: PathBuf,
    stream: StreamRef,
    _registration: StreamRegistration,
    scale: Rc<Cell<f64>>,
    width: f32,
    metadata: Option<VideoMetadata>,
    frame_slot: Option<Arc<Mutex<Option<VideoFrame>>>>,
    texture: Option<egui::TextureHandle>,
    layer: Option<KeypointLayer>,
    error: Option<String>,
}

impl VideoTile {
    pub fn new(
        model: VideoWidgetModel,
        coordinator: &Rc<RefCell<PlaybackCoordinator>>,
        width: f32,
    ) -> Self {
        let scale = Rc::new(Cell::new(1.0));
        let mut metadata = None;
        let mut frame_slot = None;
        let mut error_message = None;

        let opened = match model.metadata {
            Some(meta) => GstVideo::open(&model.video_path, width.round() as u32, meta),
            None => Err(Error::Gstreamer("video unavailable".to_string())),
        };
        let media: Option<Box<dyn MediaHandle>> = match opened {
            Ok(video) => {
                let meta = video.metadata();
                scale.set(meta.scale_factor(width));
                coordinator.borrow_mut().report_duration(meta.duration);
                metadata = Some(meta);
                frame_slot = Some(video.frame_slot());
                Some(Box::new(video))
            }
            Err(e) => {
                error!(
                    "Failed to open view {} ({}): {}",
                    model.id,
                    model.video_path.display(),
                    e
                );
                error_message = Some(e.to_string());
                None
            }
        };

        let stream = Stream::shared(media);
        let registration = PlaybackCoordinator::register_scoped(coordinator, &stream);

        let layer = model.tensor.map(|tensor| {
            let cursor = coordinator.borrow_mut().frame_cursor();
            let geometry: Rc<dyn GeometryProvider> = scale.clone();
            let mut layer = KeypointLayer::new(model.keypoints, tensor, geometry, cursor);
            layer.initialize();
            layer
        });

        Self {
            id: model.id,
            video_path: model.video_path,
            stream,
            _registration: registration,
            scale,
            width,
            metadata,
            frame_slot,
            texture: None,
            layer,
            error: error_message,
        }
    }

    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }

    pub fn set_keypoint_color(&mut self, body_part: usize, color: egui::Color32) {
        if let Some(layer) = self.layer.as_mut() {
            for keypoint in layer.keypoints_mut() {
                if keypoint.body_part == body_part {
                    keypoint.color = color;
                }
            }
        }
    }

    /// Drains media events and uploads the newest decoded frame, if any.
    pub fn update(&mut self, ctx: &egui::Context) {
        if let Ok(stream) = self.stream.try_borrow() {
            if let Some(media) = stream.media.as_ref() {
                media.poll_events();
            }
        }

        let Some(frame) = self
            .frame_slot
            .as_ref()
            .and_then(|slot| slot.lock().ok().and_then(|mut f| f.take()))
        else {
            return;
        };
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.data,
        );
        match self.texture.as_mut() {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture(
                    format!("view_{}", self.id),
                    image,
                    egui::TextureOptions::LINEAR,
                ))
            }
        }
    }

    pub fn show(&self, ui: &mut egui::Ui, show_labels: bool) {
        ui.vertical(|ui| {
            let is_primary = self.stream.try_borrow().is_ok_and(|s| s.is_primary);
            let title = if is_primary {
                format!("Camera {} (lead)", self.id)
            } else {
                format!("Camera {}", self.id)
            };
            ui.label(egui::RichText::new(title).strong());
            let height = self
                .metadata
                .map(|m| m.rendered_height(self.width))
                .unwrap_or(self.width * 9.0 / 16.0);
            let (rect, _) =
                ui.allocate_exact_size(egui::vec2(self.width, height), egui::Sense::hover());
            let painter = ui.painter_at(rect);
            painter.rect_filled(rect, 0.0, egui::Color32::BLACK);

            if let Some(texture) = &self.texture {
                painter.image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            } else if let Some(error) = &self.error {
                painter.text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    error,
                    egui::FontId::proportional(11.0),
                    egui::Color32::LIGHT_RED,
                );
            }

            if let Some(layer) = &self.layer {
                keypoint_container(&painter, rect.min, layer, show_labels);
            }
        })
        .response
        .on_hover_text(self.hover_text());
    }

    fn hover_text(&self) -> String {
        let predictions = match &self.layer {
            Some(layer) => {
                let [frames, body_parts, _] = layer.tensor().shape();
                format!("{} frames x {} body parts", frames, body_parts)
            }
            None => "no predictions".to_string(),
        };
        format!(
            "{}\nscale {:.3}, {}",
            self.video_path.display(),
            self.scale.get(),
            predictions
        )
    }
}
