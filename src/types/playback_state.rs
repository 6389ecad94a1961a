use crate::types::observable::Observable;

/// Shared playback state for one viewing session.
///
/// `current_time` and `is_playing` are observable so derived values (current
/// frame, keypoint positions) can react to changes.
#[derive(Debug)]
pub struct PlaybackState {
    pub current_time: Observable<f64>,
    pub is_playing: Observable<bool>,
    pub duration: f64,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            current_time: Observable::new(0.0),
            is_playing: Observable::new(false),
            duration: 0.0,
        }
    }

    pub fn current_time(&self) -> f64 {
        *self.current_time.get()
    }

    pub fn is_playing(&self) -> bool {
        *self.is_playing.get()
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}
