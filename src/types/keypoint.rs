use eframe::egui::Color32;

/// Default keypoint fill, a pale sky blue.
pub const DEFAULT_KEYPOINT_COLOR: Color32 = Color32::from_rgb(224, 242, 254);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const MISSING: Point = Point {
        x: f64::NAN,
        y: f64::NAN,
    };

    pub fn is_missing(&self) -> bool {
        !(self.x.is_finite() && self.y.is_finite())
    }
}

/// One keypoint displayed on one view.
///
/// The position is not stored here; it is derived from the view's prediction
/// tensor for the current frame, see
/// [`KeypointLayer`](crate::ops::keypoint_projector::KeypointLayer).
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointModel {
    pub name: String,
    /// Index into the body part axis of the prediction tensor.
    pub body_part: usize,
    pub color: Color32,
}

impl KeypointModel {
    pub fn new(name: impl Into<String>, body_part: usize) -> Self {
        KeypointModel {
            name: name.into(),
            body_part,
            color: DEFAULT_KEYPOINT_COLOR,
        }
    }
}

/// Builds one keypoint model per requested name, in order.
pub fn keypoint_models(names: &[String]) -> Vec<KeypointModel> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| KeypointModel::new(name.clone(), i))
        .collect()
}
