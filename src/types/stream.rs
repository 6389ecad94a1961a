use std::cell::RefCell;
use std::rc::Rc;

use uuid::Uuid;

/// Control surface of one playing video, as seen by the playback coordinator.
pub trait MediaHandle {
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    fn set_position(&mut self, seconds: f64);
    fn play(&mut self);
    fn pause(&mut self);
    /// Drains pending backend events. Called once per UI frame.
    fn poll_events(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    pub fn new() -> Self {
        StreamId(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

/// One video source taking part in synchronized playback.
///
/// `media` is `None` until the video is attached; such streams are skipped
/// by the coordinator.
pub struct Stream {
    pub id: StreamId,
    pub media: Option<Box<dyn MediaHandle>>,
    pub is_primary: bool,
    /// Last position observed from the media. Diagnostic only for followers.
    pub local_time: f64,
}

pub type StreamRef = Rc<RefCell<Stream>>;

impl Stream {
    pub fn new(media: Option<Box<dyn MediaHandle>>) -> Self {
        Stream {
            id: StreamId::new(),
            media,
            is_primary: false,
            local_time: 0.0,
        }
    }

    pub fn shared(media: Option<Box<dyn MediaHandle>>) -> StreamRef {
        Rc::new(RefCell::new(Self::new(media)))
    }

    /// Re-reads the media position into `local_time`.
    pub fn observe(&mut self) -> Option<f64> {
        let position = self.media.as_ref()?.position();
        self.local_time = position;
        Some(position)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("attached", &self.media.is_some())
            .field("is_primary", &self.is_primary)
            .field("local_time", &self.local_time)
            .finish()
    }
}
