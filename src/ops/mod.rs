pub mod frame_index;
pub mod keypoint_projector;
pub mod prediction_decoder;
pub mod session_loader;
