pub mod app;
pub mod keypoint_container;
pub mod session_list;
pub mod video_tile;
