pub mod gst_video;
pub mod playback_coordinator;
