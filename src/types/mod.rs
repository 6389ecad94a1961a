pub mod keypoint;
pub mod media;
pub mod observable;
pub mod playback_state;
pub mod prediction;
pub mod project;
pub mod session;
pub mod stream;
