/// Dense `[frames, body_parts, 2]` array of predicted keypoint coordinates.
///
/// Stored row-major in a flat buffer. `NaN` marks a missing coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTensor {
    data: Vec<f64>,
    num_frames: usize,
    num_body_parts: usize,
}

impl PredictionTensor {
    /// Builds a tensor from a flat buffer. Returns `None` if the buffer length
    /// does not match the shape.
    pub fn from_flat(data: Vec<f64>, num_frames: usize, num_body_parts: usize) -> Option<Self> {
        if data.len() != num_frames * num_body_parts * 2 {
            return None;
        }
        Some(Self {
            data,
            num_frames,
            num_body_parts,
        })
    }

    /// An empty tensor with a known body part count, e.g. `[0, B, 2]`.
    pub fn empty(num_body_parts: usize) -> Self {
        Self {
            data: Vec::new(),
            num_frames: 0,
            num_body_parts,
        }
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.num_frames, self.num_body_parts, 2]
    }

    /// Returns `[x, y]` for a frame and body part, or `None` if out of range.
    pub fn get(&self, frame: usize, body_part: usize) -> Option<[f64; 2]> {
        if frame >= self.num_frames || body_part >= self.num_body_parts {
            return None;
        }
        let i = (frame * self.num_body_parts + body_part) * 2;
        Some([self.data[i], self.data[i + 1]])
    }

    /// Nearest valid frame index, or `None` if the tensor has no frames.
    pub fn clamp_frame(&self, frame: usize) -> Option<usize> {
        if self.num_frames == 0 {
            None
        } else {
            Some(frame.min(self.num_frames - 1))
        }
    }
}
