use eframe::egui;

use crate::ops::keypoint_projector::KeypointLayer;

const KEYPOINT_RADIUS: f32 = 3.0;

/// Draws a view's keypoints on top of its video frame.
/// - `painter`: Painter clipped to the video rect.
/// - `origin`: Top-left corner of the rendered video.
/// - `layer`: Keypoints and their projected positions for the current frame.
/// - `show_labels`: Whether to write each keypoint's name next to it.
///
/// Keypoints without a position are skipped.
pub fn keypoint_container(
    painter: &egui::Painter,
    origin: egui::Pos2,
    layer: &KeypointLayer,
    show_labels: bool,
) {
    let positions = layer.positions();
    for (keypoint, point) in layer.keypoints().iter().zip(positions.iter()) {
        if point.is_missing() {
            continue;
        }
        let center = origin + egui::vec2(point.x as f32, point.y as f32);
        painter.circle(
            center,
            KEYPOINT_RADIUS,
            keypoint.color,
            egui::Stroke::new(1.0, egui::Color32::BLACK),
        );
        if show_labels {
            painter.text(
                center + egui::vec2(KEYPOINT_RADIUS + 2.0, 0.0),
                egui::Align2::LEFT_CENTER,
                &keypoint.name,
                egui::FontId::proportional(9.0),
                keypoint.color,
            );
        }
    }
}
