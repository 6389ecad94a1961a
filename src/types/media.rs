#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoMetadata {
    /// Native frame size in pixels.
    pub width: u32,
    pub height: u32,
    /// Seconds; 0 when unknown.
    pub duration: f64,
}

impl VideoMetadata {
    /// Ratio of rendered to native width. 1 when the native width is unknown.
    pub fn scale_factor(&self, rendered_width: f32) -> f64 {
        if self.width == 0 {
            1.0
        } else {
            rendered_width as f64 / self.width as f64
        }
    }

    /// Height of the video when rendered `rendered_width` pixels wide.
    pub fn rendered_height(&self, rendered_width: f32) -> f32 {
        if self.width == 0 {
            rendered_width * 9.0 / 16.0
        } else {
            rendered_width * self.height as f32 / self.width as f32
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Tightly packed RGBA pixels.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factor() {
        let meta = VideoMetadata {
            width: 1280,
            height: 720,
            duration: 2.0,
        };
        assert_eq!(meta.scale_factor(320.0), 0.25);
        assert_eq!(meta.rendered_height(320.0), 180.0);
    }

    #[test]
    fn test_unknown_size() {
        let meta = VideoMetadata {
            width: 0,
            height: 0,
            duration: 0.0,
        };
        assert_eq!(meta.scale_factor(320.0), 1.0);
        assert_eq!(meta.rendered_height(320.0), 180.0);
    }
}
