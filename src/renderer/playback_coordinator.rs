//! Leader/follower synchronization of several video streams.
//!
//! Seeking: shared time changes flow down to every stream.
//! Playback: the primary stream pushes its time into the shared state and
//! the others play along on their own clocks, reconciled on pause.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{debug, info};

use crate::ops::frame_index::{frame_of, mid_frame_time};
use crate::types::observable::Observable;
use crate::types::playback_state::PlaybackState;
use crate::types::stream::{Stream, StreamId, StreamRef};

pub struct PlaybackCoordinator {
    state: PlaybackState,
    current_frame: Observable<usize>,
    frame_rate: f64,
    streams: Vec<(StreamId, Weak<RefCell<Stream>>)>,
    primary: Option<StreamId>,
    /// Seek waiting for the current render pass to finish.
    pending_seek: Option<f64>,
}

impl PlaybackCoordinator {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            state: PlaybackState::new(),
            current_frame: Observable::new(0),
            frame_rate,
            streams: Vec::new(),
            primary: None,
            pending_seek: None,
        }
    }

    pub fn shared(frame_rate: f64) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new(frame_rate)))
    }

    pub fn current_time(&self) -> f64 {
        self.state.current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn duration(&self) -> f64 {
        self.state.duration
    }

    pub fn current_frame(&self) -> usize {
        *self.current_frame.get()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    // --- Registration ---

    /// Adds a stream. The first attached stream of a registry without a
    /// primary becomes primary.
    pub fn register_stream(&mut self, stream: &StreamRef) {
        self.prune();
        let mut s = stream.borrow_mut();
        self.streams.push((s.id, Rc::downgrade(stream)));
        if self.primary.is_none() && s.media.is_some() {
            s.is_primary = true;
            self.primary = Some(s.id);
            debug!("Stream {:?} is primary", s.id);
        }
    }

    /// Removes a stream. If it was primary, the next attached stream is
    /// promoted.
    pub fn unregister_stream(&mut self, id: StreamId) {
        self.streams.retain(|(sid, _)| *sid != id);
        if self.primary == Some(id) {
            self.primary = None;
            self.promote_next();
        }
        self.prune();
    }

    /// Registers `stream` for as long as the returned guard lives.
    pub fn register_scoped(this: &Rc<RefCell<Self>>, stream: &StreamRef) -> StreamRegistration {
        this.borrow_mut().register_stream(stream);
        StreamRegistration {
            coordinator: Rc::downgrade(this),
            id: stream.borrow().id,
        }
    }

    /// Drops registry entries whose stream no longer exists, and re-elects
    /// the primary if it is gone or has lost its media.
    fn prune(&mut self) {
        self.streams.retain(|(_, weak)| weak.strong_count() > 0);
        let primary_usable = self.primary.is_some_and(|id| {
            self.streams
                .iter()
                .filter(|(sid, _)| *sid == id)
                .filter_map(|(_, weak)| weak.upgrade())
                // A stream borrowed elsewhere is assumed unchanged.
                .any(|stream| stream.try_borrow().map_or(true, |s| s.media.is_some()))
        });
        if !primary_usable {
            if let Some(id) = self.primary.take() {
                self.demote(id);
            }
            self.promote_next();
        }
    }

    fn demote(&mut self, id: StreamId) {
        let stream = self
            .streams
            .iter()
            .find(|(sid, _)| *sid == id)
            .and_then(|(_, weak)| weak.upgrade());
        if let Some(stream) = stream {
            if let Ok(mut stream) = stream.try_borrow_mut() {
                stream.is_primary = false;
            }
        }
    }

    /// Promotes the first attached stream in registration order.
    fn promote_next(&mut self) {
        for (id, weak) in &self.streams {
            let Some(stream) = weak.upgrade() else {
                continue;
            };
            let Ok(mut stream) = stream.try_borrow_mut() else {
                continue;
            };
            if stream.media.is_none() {
                continue;
            }
            stream.is_primary = true;
            self.primary = Some(*id);
            debug!("Stream {:?} promoted to primary", id);
            return;
        }
    }

    /// Live, currently borrowable streams in registration order.
    fn live_streams(&mut self) -> Vec<StreamRef> {
        self.prune();
        self.streams
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    fn broadcast(&mut self, mut command: impl FnMut(&mut Stream, f64)) {
        let time = self.current_time();
        for stream in self.live_streams() {
            match stream.try_borrow_mut() {
                Ok(mut stream) if stream.media.is_some() => command(&mut stream, time),
                _ => {}
            }
        }
    }

    // --- Play / pause ---

    pub fn play(&mut self) {
        self.set_playing(true);
    }

    pub fn pause(&mut self) {
        self.set_playing(false);
    }

    pub fn toggle_playing(&mut self) {
        let playing = self.is_playing();
        self.set_playing(!playing);
    }

    pub fn set_playing(&mut self, playing: bool) {
        if !self.state.is_playing.set(playing) {
            return;
        }
        if playing {
            // Start every stream from the shared time, then start them all.
            self.broadcast(|stream, time| {
                if let Some(media) = stream.media.as_mut() {
                    media.set_position(time);
                }
            });
            self.broadcast(|stream, _| {
                if let Some(media) = stream.media.as_mut() {
                    media.play();
                }
            });
            self.pending_seek = None;
            info!("Playback started at {:.3}s", self.current_time());
        } else {
            self.broadcast(|stream, _| {
                if let Some(media) = stream.media.as_mut() {
                    media.pause();
                }
            });
            // Reconcile drift accumulated while playing.
            self.broadcast(|stream, time| {
                stream.observe();
                if let Some(media) = stream.media.as_mut() {
                    media.set_position(time);
                }
            });
            self.pending_seek = Some(self.current_time());
            info!("Playback paused at {:.3}s", self.current_time());
        }
    }

    // --- Time ---

    fn write_time(&mut self, time: f64) {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        if self.state.current_time.set(time) {
            self.current_frame.set(frame_of(time, self.frame_rate));
            if !self.is_playing() {
                self.pending_seek = Some(time);
            }
        }
    }

    /// Sets the shared time. While paused the streams follow after the next
    /// render pass, see [`after_render`](Self::after_render).
    pub fn seek(&mut self, time: f64) {
        self.write_time(time);
    }

    /// Seeks by a whole number of frames from the current frame.
    pub fn step_frames(&mut self, delta: i64) {
        let frame = (self.current_frame() as i64 + delta).max(0) as usize;
        self.seek(mid_frame_time(frame, self.frame_rate));
    }

    /// Handles a time update from one stream's media. Only the primary
    /// stream writes the shared time, and only while playing.
    pub fn on_time_update(&mut self, stream: &StreamRef) {
        self.prune();
        let update = {
            let Ok(mut stream) = stream.try_borrow_mut() else {
                return;
            };
            let Some(local) = stream.observe() else {
                return;
            };
            (stream.is_primary && Some(stream.id) == self.primary).then_some(local)
        };
        if let Some(local) = update {
            if self.is_playing() {
                self.write_time(local);
            }
        }
    }

    /// Applies a pending seek to every stream. Called once the frame that
    /// observed the time change has been rendered.
    pub fn after_render(&mut self) {
        let Some(time) = self.pending_seek.take() else {
            return;
        };
        if self.is_playing() {
            return;
        }
        self.broadcast(|stream, _| {
            if let Some(media) = stream.media.as_mut() {
                media.set_position(time);
            }
        });
    }

    /// Records a stream's media duration. The session duration is the
    /// longest one reported.
    pub fn report_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > self.state.duration {
            self.state.duration = duration;
        }
    }

    /// Back to a paused session at time zero with unknown duration.
    pub fn reset(&mut self) {
        self.set_playing(false);
        self.write_time(0.0);
        self.state.duration = 0.0;
    }

    /// A handle that tracks the current frame and flags each change.
    pub fn frame_cursor(&mut self) -> FrameCursor {
        let cursor = FrameCursor {
            frame: Rc::new(Cell::new(self.current_frame())),
            changed: Rc::new(Cell::new(true)),
        };
        let frame = Rc::downgrade(&cursor.frame);
        let changed = Rc::downgrade(&cursor.changed);
        self.current_frame.subscribe(move |value| {
            match (frame.upgrade(), changed.upgrade()) {
                (Some(frame), Some(changed)) => {
                    frame.set(*value);
                    changed.set(true);
                    true
                }
                _ => false,
            }
        });
        cursor
    }
}

/// Current frame as pushed by the coordinator.
#[derive(Debug)]
pub struct FrameCursor {
    frame: Rc<Cell<usize>>,
    changed: Rc<Cell<bool>>,
}

impl FrameCursor {
    /// A cursor fixed at `frame`, not attached to any coordinator.
    pub fn fixed(frame: usize) -> Self {
        Self {
            frame: Rc::new(Cell::new(frame)),
            changed: Rc::new(Cell::new(true)),
        }
    }

    pub fn frame(&self) -> usize {
        self.frame.get()
    }

    /// Returns whether the frame changed since the last call, and clears it.
    pub fn take_changed(&self) -> bool {
        self.changed.replace(false)
    }
}

/// Keeps a stream registered; unregisters it when dropped.
#[must_use]
pub struct StreamRegistration {
    coordinator: Weak<RefCell<PlaybackCoordinator>>,
    id: StreamId,
}

impl Drop for StreamRegistration {
    fn drop(&mut self) {
        let Some(coordinator) = self.coordinator.upgrade() else {
            return;
        };
        // If the coordinator is busy the dead entry is pruned on its next use.
        if let Ok(mut coordinator) = coordinator.try_borrow_mut() {
            coordinator.unregister_stream(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::stream::MediaHandle;

    #[derive(Debug, Default)]
    struct FakeState {
        position: f64,
        playing: bool,
        calls: Vec<String>,
    }

    struct FakeMedia(Rc<RefCell<FakeState>>);

    impl MediaHandle for FakeMedia {
        fn position(&self) -> f64 {
            self.0.borrow().position
        }

        fn set_position(&mut self, seconds: f64) {
            let mut s = self.0.borrow_mut();
            s.position = seconds;
            s.calls.push(format!("seek {}", seconds));
        }

        fn play(&mut self) {
            let mut s = self.0.borrow_mut();
            s.playing = true;
            s.calls.push("play".to_string());
        }

        fn pause(&mut self) {
            let mut s = self.0.borrow_mut();
            s.playing = false;
            s.calls.push("pause".to_string());
        }
    }

    fn fake_stream() -> (StreamRef, Rc<RefCell<FakeState>>) {
        let state = Rc::new(RefCell::new(FakeState::default()));
        let stream = Stream::shared(Some(Box::new(FakeMedia(state.clone()))));
        (stream, state)
    }

    #[test]
    fn test_first_registered_stream_is_primary() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);

        assert!(a.borrow().is_primary);
        assert!(!b.borrow().is_primary);
        assert_eq!(c.primary, Some(a.borrow().id));
    }

    #[test]
    fn test_unregistering_primary_promotes_next() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);

        let a_id = a.borrow().id;
        c.unregister_stream(a_id);
        assert!(b.borrow().is_primary);
        assert_eq!(c.primary, Some(b.borrow().id));
        assert_eq!(c.stream_count(), 1);
    }

    #[test]
    fn test_unregistering_follower_keeps_primary() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);
        let b_id = b.borrow().id;
        c.unregister_stream(b_id);
        assert_eq!(c.primary, Some(a.borrow().id));
    }

    #[test]
    fn test_registration_guard_unregisters_on_drop() {
        let c = PlaybackCoordinator::shared(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        let guard_a = PlaybackCoordinator::register_scoped(&c, &a);
        let _guard_b = PlaybackCoordinator::register_scoped(&c, &b);
        assert_eq!(c.borrow().stream_count(), 2);

        drop(guard_a);
        assert_eq!(c.borrow().stream_count(), 1);
        assert!(b.borrow().is_primary);
    }

    #[test]
    fn test_dropped_primary_stream_is_replaced() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);
        drop(a);

        c.play();
        assert!(b.borrow().is_primary);
        assert_eq!(c.stream_count(), 1);
    }

    #[test]
    fn test_play_syncs_positions_before_starting() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        let (b, b_state) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);
        c.seek(2.5);
        b_state.borrow_mut().position = 9.0;

        c.play();
        for state in [&a_state, &b_state] {
            let s = state.borrow();
            assert!(s.playing);
            assert_eq!(s.calls, vec!["seek 2.5".to_string(), "play".to_string()]);
        }
    }

    #[test]
    fn test_pause_reconciles_drift() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        let (b, b_state) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);
        c.play();

        a_state.borrow_mut().position = 1.0;
        b_state.borrow_mut().position = 1.2;
        c.on_time_update(&a);
        c.on_time_update(&b);
        a_state.borrow_mut().calls.clear();
        b_state.borrow_mut().calls.clear();

        c.pause();
        assert_eq!(c.current_time(), 1.0);
        assert_eq!(b_state.borrow().position, 1.0);
        assert_eq!(
            b_state.borrow().calls,
            vec!["pause".to_string(), "seek 1".to_string()]
        );
        assert_eq!(b.borrow().local_time, 1.2);
    }

    #[test]
    fn test_play_then_pause_keeps_current_time() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        c.register_stream(&a);
        c.seek(3.25);
        c.after_render();

        c.play();
        c.pause();
        assert_eq!(c.current_time(), 3.25);
        assert!(!c.is_playing());
    }

    #[test]
    fn test_only_primary_writes_time_while_playing() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        let (b, b_state) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);
        c.play();

        b_state.borrow_mut().position = 7.0;
        c.on_time_update(&b);
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(b.borrow().local_time, 7.0);

        a_state.borrow_mut().position = 0.5;
        c.on_time_update(&a);
        assert_eq!(c.current_time(), 0.5);
        assert_eq!(c.current_frame(), 15);
    }

    #[test]
    fn test_primary_time_updates_ignored_while_paused() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        c.register_stream(&a);
        a_state.borrow_mut().position = 4.0;
        c.on_time_update(&a);
        assert_eq!(c.current_time(), 0.0);
    }

    #[test]
    fn test_paused_seek_is_deferred_until_after_render() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        let (b, b_state) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);

        c.seek(1.5);
        assert_eq!(c.current_time(), 1.5);
        assert_eq!(a_state.borrow().position, 0.0);
        assert!(c.pending_seek.is_some());

        c.after_render();
        assert_eq!(a_state.borrow().position, 1.5);
        assert_eq!(b_state.borrow().position, 1.5);
        assert!(c.pending_seek.is_none());
    }

    #[test]
    fn test_seek_while_playing_does_not_touch_streams() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        c.register_stream(&a);
        c.play();
        a_state.borrow_mut().calls.clear();

        c.seek(5.0);
        c.after_render();
        assert!(a_state.borrow().calls.is_empty());
    }

    #[test]
    fn test_detached_stream_is_never_primary() {
        let mut c = PlaybackCoordinator::new(30.0);
        let detached = Stream::shared(None);
        let (a, a_state) = fake_stream();
        c.register_stream(&detached);
        c.register_stream(&a);
        assert!(!detached.borrow().is_primary);
        assert!(a.borrow().is_primary);

        c.play();
        a_state.borrow_mut().position = 2.0;
        c.on_time_update(&detached);
        c.on_time_update(&a);
        assert_eq!(c.current_time(), 2.0);
        assert_eq!(c.current_frame(), 60);

        c.pause();
        assert!(!a_state.borrow().playing);
        assert_eq!(detached.borrow().local_time, 0.0);
    }

    #[test]
    fn test_stream_attached_later_becomes_primary() {
        let mut c = PlaybackCoordinator::new(30.0);
        let late = Stream::shared(None);
        c.register_stream(&late);
        assert_eq!(c.primary, None);

        let state = Rc::new(RefCell::new(FakeState::default()));
        late.borrow_mut().media = Some(Box::new(FakeMedia(state.clone())));
        c.play();
        state.borrow_mut().position = 1.5;
        c.on_time_update(&late);

        assert!(late.borrow().is_primary);
        assert_eq!(c.current_time(), 1.5);
    }

    #[test]
    fn test_primary_losing_media_is_replaced() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, _) = fake_stream();
        let (b, _) = fake_stream();
        c.register_stream(&a);
        c.register_stream(&b);

        a.borrow_mut().media = None;
        c.on_time_update(&b);
        assert!(!a.borrow().is_primary);
        assert!(b.borrow().is_primary);
        assert_eq!(c.primary, Some(b.borrow().id));
    }

    #[test]
    fn test_setting_same_state_is_noop() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        c.register_stream(&a);
        c.pause();
        assert!(a_state.borrow().calls.is_empty());
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut c = PlaybackCoordinator::new(30.0);
        let (a, a_state) = fake_stream();
        c.register_stream(&a);
        c.report_duration(12.0);
        c.seek(4.0);
        c.play();

        c.reset();
        assert!(!c.is_playing());
        assert_eq!(c.current_time(), 0.0);
        assert_eq!(c.duration(), 0.0);
        assert!(!a_state.borrow().playing);
        c.after_render();
        assert_eq!(a_state.borrow().position, 0.0);
    }

    #[test]
    fn test_report_duration_keeps_longest() {
        let mut c = PlaybackCoordinator::new(30.0);
        c.report_duration(3.0);
        c.report_duration(2.0);
        c.report_duration(f64::NAN);
        assert_eq!(c.duration(), 3.0);
    }

    #[test]
    fn test_step_frames() {
        let mut c = PlaybackCoordinator::new(10.0);
        c.step_frames(3);
        assert_eq!(c.current_frame(), 3);
        c.step_frames(-10);
        assert_eq!(c.current_frame(), 0);
    }

    #[test]
    fn test_step_forward_advances_one_frame_each_time() {
        let mut c = PlaybackCoordinator::new(300.0);
        for expected in 1..10_000 {
            c.step_frames(1);
            assert_eq!(c.current_frame(), expected);
        }
        for expected in (0..9_999).rev() {
            c.step_frames(-1);
            assert_eq!(c.current_frame(), expected);
        }
    }

    #[test]
    fn test_frame_cursor_follows_current_frame() {
        let mut c = PlaybackCoordinator::new(300.0);
        let cursor = c.frame_cursor();
        assert!(cursor.take_changed());
        assert!(!cursor.take_changed());

        c.seek(0.1);
        assert_eq!(cursor.frame(), 30);
        assert!(cursor.take_changed());

        c.seek(0.1001);
        assert!(!cursor.take_changed());

        drop(cursor);
        c.seek(1.0);
        assert_eq!(c.current_frame.subscriber_count(), 0);
    }
}
