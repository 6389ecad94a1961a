/// Converts a playback time in seconds into a frame index at `frame_rate`.
///
/// Negative or non-finite input saturates to frame 0.
pub fn frame_of(time_seconds: f64, frame_rate: f64) -> usize {
    let frame = (time_seconds * frame_rate).floor();
    if frame.is_nan() || frame <= 0.0 {
        0
    } else {
        frame as usize
    }
}

/// Time in seconds half way through `frame`.
///
/// `frame_of(mid_frame_time(n, rate), rate) == n`, which does not hold for
/// a frame's exact start time once it is rounded to `f64`.
pub fn mid_frame_time(frame: usize, frame_rate: f64) -> f64 {
    if frame_rate > 0.0 {
        (frame as f64 + 0.5) / frame_rate
    } else {
        0.0
    }
}
