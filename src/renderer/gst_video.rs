//! GStreamer playback of one video file, exposed as a [`MediaHandle`].

use std::cell::Cell;
use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_pbutils as gst_pbutils;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::VideoFrameExt;
use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::ops::session_loader::MediaDiscoverer;
use crate::types::media::{VideoFrame, VideoMetadata};
use crate::types::stream::MediaHandle;

#[cfg(windows)]
fn path_to_file_uri(path: &str) -> String {
    // Remove UNC prefix if present
    let mut path = path.replace("\\", "/");
    if let Some(stripped) = path.strip_prefix("//?/") {
        path = stripped.to_string();
    }
    format!("file:///{}", path)
}

#[cfg(not(windows))]
fn path_to_file_uri(path: &str) -> String {
    format!("file://{}", path)
}

/// Reads size and duration of a video with the GStreamer discoverer. Blocks
/// for up to the discoverer timeout.
fn discover_metadata(path: &Path) -> Result<VideoMetadata> {
    let abs_path = std::fs::canonicalize(path)?;
    let uri = path_to_file_uri(&abs_path.to_string_lossy());
    let discoverer = gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(5))?;
    let info = discoverer.discover_uri(&uri)?;

    let (width, height) = info
        .video_streams()
        .first()
        .map(|v| (v.width(), v.height()))
        .unwrap_or((0, 0));
    let duration = info
        .duration()
        .map(|d| d.nseconds() as f64 / 1_000_000_000.0)
        .unwrap_or(0.0);
    debug!(
        "Discovered {}: {}x{}, {:.3}s",
        path.display(),
        width,
        height,
        duration
    );
    Ok(VideoMetadata {
        width,
        height,
        duration,
    })
}

/// Reads video metadata with the GStreamer discoverer. Meant to run off the UI
/// thread, e.g. from the session loader's worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstMediaDiscoverer;

impl MediaDiscoverer for GstMediaDiscoverer {
    fn discover(&self, path: &Path) -> BoxFuture<'static, Result<VideoMetadata>> {
        let path = path.to_path_buf();
        async move { discover_metadata(&path) }.boxed()
    }
}

fn sample_to_frame(sample: &gst::Sample) -> Option<VideoFrame> {
    let buffer = sample.buffer()?;
    let caps = sample.caps()?;
    let info = gst_video::VideoInfo::from_caps(caps).ok()?;
    let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info).ok()?;

    let width = frame.width();
    let height = frame.height();
    let stride = frame.plane_stride()[0] as usize;
    let plane = frame.plane_data(0).ok()?;
    let row_bytes = width as usize * 4;

    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in plane.chunks(stride).take(height as usize) {
        data.extend_from_slice(row.get(..row_bytes)?);
    }
    Some(VideoFrame {
        data,
        width,
        height,
    })
}

/// A paused-on-open playback pipeline decoding RGBA frames into memory.
pub struct GstVideo {
    pipeline: gst::Pipeline,
    metadata: VideoMetadata,
    latest_frame: Arc<Mutex<Option<VideoFrame>>>,
    last_position: Cell<f64>,
}

impl GstVideo {
    /// Opens `path`, decoding frames scaled to `decode_width` pixels wide.
    /// `metadata` comes from a prior [`GstMediaDiscoverer`] run. The pipeline
    /// prerolls asynchronously.
    pub fn open(path: &Path, decode_width: u32, metadata: VideoMetadata) -> Result<Self> {
        let _ = gst::init(); // Safe to call multiple times

        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("video file does not exist: {}", path.display()),
            )));
        }

        let width = if metadata.width == 0 {
            decode_width
        } else {
            decode_width.min(metadata.width)
        };
        // Even dimensions keep most decoders and converters happy.
        let width = (width.max(2) / 2) * 2;
        let height = ((metadata.rendered_height(width as f32).round() as u32).max(2) / 2) * 2;

        let pipeline_str = format!(
            "filesrc location=\"{}\" ! decodebin ! videoconvert ! videoscale ! video/x-raw,format=RGBA,width={},height={} ! appsink name=sink",
            path.display(),
            width,
            height
        );
        let pipeline = gst::parse::launch(&pipeline_str)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Gstreamer("expected a pipeline".to_string()))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| Error::Gstreamer("pipeline has no appsink".to_string()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Gstreamer("sink is not an appsink".to_string()))?;

        sink.set_property("max-buffers", 1u32);
        sink.set_property("drop", true);

        let latest_frame = Arc::new(Mutex::new(None));
        let on_sample = latest_frame.clone();
        let on_preroll = latest_frame.clone();
        sink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    if let (Some(frame), Ok(mut slot)) = (sample_to_frame(&sample), on_sample.lock())
                    {
                        *slot = Some(frame);
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .new_preroll(move |sink| {
                    let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Eos)?;
                    if let (Some(frame), Ok(mut slot)) = (sample_to_frame(&sample), on_preroll.lock())
                    {
                        *slot = Some(frame);
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline.set_state(gst::State::Paused)?;
        info!(
            "Opened {} ({}x{} decoded at {}x{})",
            path.display(),
            metadata.width,
            metadata.height,
            width,
            height
        );

        Ok(Self {
            pipeline,
            metadata,
            latest_frame,
            last_position: Cell::new(0.0),
        })
    }

    pub fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    /// Shared slot the decoder writes the newest frame into.
    pub fn frame_slot(&self) -> Arc<Mutex<Option<VideoFrame>>> {
        self.latest_frame.clone()
    }

    /// Logs pipeline errors and end of stream. Non-blocking.
    fn poll_bus(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    error!("Pipeline error: {} ({:?})", err.error(), err.debug());
                }
                gst::MessageView::Warning(w) => {
                    warn!("Pipeline warning: {}", w.error());
                }
                gst::MessageView::Eos(_) => {
                    debug!("End of stream");
                }
                _ => {}
            }
        }
    }
}

impl MediaHandle for GstVideo {
    fn position(&self) -> f64 {
        if let Some(position) = self.pipeline.query_position::<gst::ClockTime>() {
            self.last_position
                .set(position.nseconds() as f64 / 1_000_000_000.0);
        }
        self.last_position.get()
    }

    fn set_position(&mut self, seconds: f64) {
        let seek_time_ns = (seconds.max(0.0) * 1_000_000_000.0) as u64;
        match self.pipeline.seek_simple(
            gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
            gst::ClockTime::from_nseconds(seek_time_ns),
        ) {
            Ok(()) => self.last_position.set(seconds.max(0.0)),
            Err(e) => warn!("Seek to {:.3}s failed: {}", seconds, e),
        }
    }

    fn play(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Playing) {
            warn!("Failed to set pipeline to PLAYING: {}", e);
        }
    }

    fn pause(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Paused) {
            warn!("Failed to set pipeline to PAUSED: {}", e);
        }
    }

    fn poll_events(&self) {
        self.poll_bus();
    }
}

impl Drop for GstVideo {
    fn drop(&mut self) {
        self.pipeline.set_state(gst::State::Null).ok();
    }
}
