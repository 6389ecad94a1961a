use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::renderer::playback_coordinator::FrameCursor;
use crate::types::keypoint::{KeypointModel, Point};
use crate::types::prediction::PredictionTensor;

/// Source of a view's rendered-to-native pixel ratio.
pub trait GeometryProvider {
    fn scale_factor(&self) -> f64;
}

impl GeometryProvider for Cell<f64> {
    fn scale_factor(&self) -> f64 {
        self.get()
    }
}

/// Position of one body part at one frame, in rendered pixels.
///
/// Frames past the end clamp to the last frame. An empty tensor or unknown
/// body part yields [`Point::MISSING`].
pub fn project(
    tensor: &PredictionTensor,
    scale_factor: f64,
    frame: usize,
    body_part: usize,
) -> Point {
    let Some(frame) = tensor.clamp_frame(frame) else {
        return Point::MISSING;
    };
    match tensor.get(frame, body_part) {
        Some([x, y]) => Point {
            x: x * scale_factor,
            y: y * scale_factor,
        },
        None => Point::MISSING,
    }
}

#[derive(Debug)]
struct Projection {
    scale_factor: f64,
    positions: Vec<Point>,
    valid: bool,
}

/// The keypoints of one view with their positions for the current frame.
///
/// Positions are recomputed lazily on read, and only after the frame changed
/// or the view was rescaled.
pub struct KeypointLayer {
    keypoints: Vec<KeypointModel>,
    tensor: Arc<PredictionTensor>,
    geometry: Rc<dyn GeometryProvider>,
    cursor: FrameCursor,
    projection: RefCell<Projection>,
    initial_position: Option<Point>,
}

impl KeypointLayer {
    pub fn new(
        keypoints: Vec<KeypointModel>,
        tensor: Arc<PredictionTensor>,
        geometry: Rc<dyn GeometryProvider>,
        cursor: FrameCursor,
    ) -> Self {
        Self {
            keypoints,
            tensor,
            geometry,
            cursor,
            projection: RefCell::new(Projection {
                scale_factor: f64::NAN,
                positions: Vec::new(),
                valid: false,
            }),
            initial_position: None,
        }
    }

    pub fn keypoints(&self) -> &[KeypointModel] {
        &self.keypoints
    }

    pub fn keypoints_mut(&mut self) -> &mut [KeypointModel] {
        &mut self.keypoints
    }

    pub fn tensor(&self) -> &Arc<PredictionTensor> {
        &self.tensor
    }

    /// Positions of every keypoint, in the order of [`keypoints`](Self::keypoints).
    pub fn positions(&self) -> Ref<'_, [Point]> {
        let scale_factor = self.geometry.scale_factor();
        let frame_changed = self.cursor.take_changed();
        {
            let mut projection = self.projection.borrow_mut();
            if frame_changed || !projection.valid || projection.scale_factor != scale_factor {
                let frame = self.cursor.frame();
                projection.positions = self
                    .keypoints
                    .iter()
                    .map(|k| project(&self.tensor, scale_factor, frame, k.body_part))
                    .collect();
                projection.scale_factor = scale_factor;
                projection.valid = true;
            }
        }
        Ref::map(self.projection.borrow(), |p| p.positions.as_slice())
    }

    /// Records the first keypoint's position the first time keypoints are
    /// available. Later calls keep the recorded value.
    pub fn initialize(&mut self) -> Option<Point> {
        if self.initial_position.is_none() && !self.keypoints.is_empty() {
            let first = self.positions().first().copied();
            self.initial_position = first;
        }
        self.initial_position
    }
}
