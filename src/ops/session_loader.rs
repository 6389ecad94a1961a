//! Loads the prediction files and video metadata of a session, one per view.
//!
//! All views are fetched and inspected concurrently on a background thread and
//! applied together once everything has settled. A failed view simply has no
//! tensor or no video. Each load gets a new generation number and results
//! from older generations are discarded.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use futures::future::{BoxFuture, FutureExt, join, join_all};
use log::{info, warn};
use lru::LruCache;

use crate::error::{Error, Result};
use crate::ops::prediction_decoder::decode;
use crate::renderer::playback_coordinator::PlaybackCoordinator;
use crate::types::keypoint::{KeypointModel, keypoint_models};
use crate::types::media::VideoMetadata;
use crate::types::prediction::PredictionTensor;
use crate::types::project::ProjectMetadata;
use crate::types::session::Session;

/// Where prediction documents come from.
pub trait PredictionSource: Send + Sync {
    fn fetch(&self, path: &Path) -> BoxFuture<'static, Result<String>>;
}

/// Reads size and duration of a view's video.
pub trait MediaDiscoverer: Send + Sync {
    fn discover(&self, path: &Path) -> BoxFuture<'static, Result<VideoMetadata>>;
}

/// Reads prediction files from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPredictionSource;

impl PredictionSource for FsPredictionSource {
    fn fetch(&self, path: &Path) -> BoxFuture<'static, Result<String>> {
        let path = path.to_path_buf();
        async move {
            std::fs::read_to_string(&path).map_err(|e| Error::Fetch {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct ViewRequest {
    pub view_index: usize,
    pub path: PathBuf,
}

/// The work still needed for one load. Views whose predictions are cached
/// have no prediction request; every view gets its video inspected.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub generation: u64,
    pub requests: Vec<ViewRequest>,
    pub videos: Vec<ViewRequest>,
}

#[derive(Debug)]
pub struct ViewOutcome {
    pub view_index: usize,
    pub path: PathBuf,
    pub result: Result<Arc<PredictionTensor>>,
}

#[derive(Debug)]
pub struct MediaOutcome {
    pub view_index: usize,
    pub result: Result<VideoMetadata>,
}

/// Settled results of every fetch and video lookup of one load.
#[derive(Debug)]
pub struct SessionBatch {
    pub generation: u64,
    pub outcomes: Vec<ViewOutcome>,
    pub media: Vec<MediaOutcome>,
}

/// Fetches and decodes every requested view and inspects every video,
/// concurrently. Individual failures are kept in the batch rather than
/// failing the whole load.
pub async fn fetch_session(
    source: Arc<dyn PredictionSource>,
    discoverer: Arc<dyn MediaDiscoverer>,
    ticket: LoadTicket,
) -> SessionBatch {
    let fetches = ticket.requests.into_iter().map(|request| {
        let source = source.clone();
        async move {
            let result = source
                .fetch(&request.path)
                .await
                .map(|text| Arc::new(decode(&text)));
            ViewOutcome {
                view_index: request.view_index,
                path: request.path,
                result,
            }
        }
    });
    let discoveries = ticket.videos.into_iter().map(|request| {
        let discoverer = discoverer.clone();
        async move {
            MediaOutcome {
                view_index: request.view_index,
                result: discoverer.discover(&request.path).await,
            }
        }
    });
    let (outcomes, media) = join(join_all(fetches), join_all(discoveries)).await;
    SessionBatch {
        generation: ticket.generation,
        outcomes,
        media,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
}

/// Everything one video tile needs to display a view.
#[derive(Debug, Clone)]
pub struct VideoWidgetModel {
    pub id: String,
    pub video_path: PathBuf,
    /// `None` if the video could not be inspected.
    pub metadata: Option<VideoMetadata>,
    pub keypoints: Vec<KeypointModel>,
    pub tensor: Option<Arc<PredictionTensor>>,
}

pub struct SessionLoader {
    source: Arc<dyn PredictionSource>,
    discoverer: Arc<dyn MediaDiscoverer>,
    generation: u64,
    session: Option<Session>,
    state: LoadState,
    tensors: BTreeMap<usize, Arc<PredictionTensor>>,
    metadata: BTreeMap<usize, VideoMetadata>,
    cache: LruCache<PathBuf, Arc<PredictionTensor>>,
    receiver: Option<Receiver<SessionBatch>>,
}

impl SessionLoader {
    pub fn new(
        source: Arc<dyn PredictionSource>,
        discoverer: Arc<dyn MediaDiscoverer>,
        cache_size: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            discoverer,
            generation: 0,
            session: None,
            state: LoadState::Idle,
            tensors: BTreeMap::new(),
            metadata: BTreeMap::new(),
            cache: LruCache::new(capacity),
            receiver: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn tensor(&self, view_index: usize) -> Option<&Arc<PredictionTensor>> {
        self.tensors.get(&view_index)
    }

    /// Starts a new load generation: resets playback, drops the previous
    /// session's results and returns the work to perform. Cached views
    /// are applied right away.
    pub fn begin(
        &mut self,
        session: Session,
        project: &ProjectMetadata,
        coordinator: &mut PlaybackCoordinator,
    ) -> LoadTicket {
        self.generation += 1;
        self.tensors.clear();
        self.metadata.clear();
        self.receiver = None;
        self.state = LoadState::Loading;
        coordinator.reset();

        let mut requests = Vec::new();
        let mut videos = Vec::new();
        for (view_index, view) in project.views.iter().enumerate() {
            let path = session.prediction_path(project, view);
            match self.cache.get(&path) {
                Some(tensor) => {
                    self.tensors.insert(view_index, tensor.clone());
                }
                None => requests.push(ViewRequest { view_index, path }),
            }
            videos.push(ViewRequest {
                view_index,
                path: session.video_path(project, view),
            });
        }
        info!(
            "Loading session {} (generation {}, {} fetches, {} videos)",
            session.key,
            self.generation,
            requests.len(),
            videos.len()
        );
        self.session = Some(session);
        LoadTicket {
            generation: self.generation,
            requests,
            videos,
        }
    }

    /// Applies a settled batch. Returns `false` if it belongs to an older
    /// load and was discarded.
    pub fn apply(&mut self, batch: SessionBatch) -> bool {
        if batch.generation != self.generation {
            info!(
                "Discarding stale results from generation {}",
                batch.generation
            );
            return false;
        }
        for outcome in batch.outcomes {
            match outcome.result {
                Ok(tensor) => {
                    self.cache.put(outcome.path, tensor.clone());
                    self.tensors.insert(outcome.view_index, tensor);
                }
                Err(e) => warn!("No predictions for view {}: {}", outcome.view_index, e),
            }
        }
        for outcome in batch.media {
            match outcome.result {
                Ok(metadata) => {
                    self.metadata.insert(outcome.view_index, metadata);
                }
                Err(e) => warn!("No video for view {}: {}", outcome.view_index, e),
            }
        }
        self.state = LoadState::Loaded;
        true
    }

    /// Begins a load and runs it on a background thread. Results are
    /// picked up by [`poll`](Self::poll).
    pub fn load_session(
        &mut self,
        session: Session,
        project: &ProjectMetadata,
        coordinator: &mut PlaybackCoordinator,
    ) {
        let ticket = self.begin(session, project, coordinator);
        if ticket.requests.is_empty() && ticket.videos.is_empty() {
            self.state = LoadState::Loaded;
            return;
        }
        let (sender, receiver) = mpsc::channel();
        let source = self.source.clone();
        let discoverer = self.discoverer.clone();
        std::thread::spawn(move || {
            let batch = futures::executor::block_on(fetch_session(source, discoverer, ticket));
            // The receiver is gone if another session was loaded meanwhile.
            let _ = sender.send(batch);
        });
        self.receiver = Some(receiver);
    }

    /// Checks the background load. Returns `true` once it has settled, also
    /// when the loader thread died without a result, in which case the
    /// session is shown without predictions or videos.
    pub fn poll(&mut self) -> bool {
        let Some(receiver) = &self.receiver else {
            return false;
        };
        match receiver.try_recv() {
            Ok(batch) => {
                self.receiver = None;
                self.apply(batch)
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                warn!("Session loader stopped without a result");
                self.receiver = None;
                self.state = LoadState::Loaded;
                true
            }
        }
    }

    /// One widget model per configured view. Views without a tensor get no
    /// keypoints.
    pub fn widget_models(&self, project: &ProjectMetadata) -> Vec<VideoWidgetModel> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        project
            .views
            .iter()
            .enumerate()
            .map(|(view_index, view)| {
                let tensor = self.tensors.get(&view_index).cloned();
                let keypoints = match &tensor {
                    Some(_) => keypoint_models(&project.keypoints),
                    None => Vec::new(),
                };
                VideoWidgetModel {
                    id: view.clone(),
                    video_path: session.video_path(project, view),
                    metadata: self.metadata.get(&view_index).copied(),
                    keypoints,
                    tensor,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const CSV: &str = "scorer\nbodyparts,a,a,a,b,b,b\ncoords,x,y,l,x,y,l\n0,1,2,1,3,4,1\n1,5,6,1,7,8,1";

    /// Serves documents from memory and counts fetches.
    #[derive(Default)]
    struct MemorySource {
        files: HashMap<PathBuf, String>,
        fetches: Mutex<usize>,
    }

    impl PredictionSource for MemorySource {
        fn fetch(&self, path: &Path) -> BoxFuture<'static, Result<String>> {
            *self.fetches.lock().unwrap() += 1;
            let result = self.files.get(path).cloned().ok_or_else(|| Error::Fetch {
                path: path.display().to_string(),
                reason: "not found".to_string(),
            });
            async move { result }.boxed()
        }
    }

    /// Reports a fixed size for known videos and fails for the rest.
    struct KnownVideos(Vec<PathBuf>);

    impl MediaDiscoverer for KnownVideos {
        fn discover(&self, path: &Path) -> BoxFuture<'static, Result<VideoMetadata>> {
            let result = if self.0.iter().any(|known| known == path) {
                Ok(VideoMetadata {
                    width: 640,
                    height: 480,
                    duration: 2.5,
                })
            } else {
                Err(Error::Fetch {
                    path: path.display().to_string(),
                    reason: "not found".to_string(),
                })
            };
            async move { result }.boxed()
        }
    }

    fn videos(views: &[&str]) -> Arc<KnownVideos> {
        let session = Session::new("s_Cam-N_x.fine");
        Arc::new(KnownVideos(
            views
                .iter()
                .map(|view| session.video_path(&project(), view))
                .collect(),
        ))
    }

    fn project() -> ProjectMetadata {
        ProjectMetadata {
            data_dir: PathBuf::from("/data"),
            views: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            keypoints: vec!["a".to_string(), "b".to_string()],
            ..ProjectMetadata::default()
        }
    }

    fn source_with(views: &[&str]) -> Arc<MemorySource> {
        let session = Session::new("s_Cam-N_x.fine");
        let mut files = HashMap::new();
        for view in views {
            files.insert(session.prediction_path(&project(), view), CSV.to_string());
        }
        Arc::new(MemorySource {
            files,
            ..MemorySource::default()
        })
    }

    fn run(loader: &mut SessionLoader, source: Arc<MemorySource>, key: &str) -> bool {
        let mut coordinator = PlaybackCoordinator::new(30.0);
        let ticket = loader.begin(Session::new(key), &project(), &mut coordinator);
        let discoverer = loader.discoverer.clone();
        loader.apply(block_on(fetch_session(source, discoverer, ticket)))
    }

    #[test]
    fn test_failed_view_does_not_block_others() {
        let source = source_with(&["A", "C"]);
        let mut loader = SessionLoader::new(source.clone(), videos(&["A", "B"]), 4);
        assert!(run(&mut loader, source, "s_Cam-N_x.fine"));

        assert_eq!(loader.state(), LoadState::Loaded);
        assert_eq!(loader.tensor(0).unwrap().shape(), [2, 2, 2]);
        assert!(loader.tensor(1).is_none());
        assert!(loader.tensor(2).is_some());

        let models = loader.widget_models(&project());
        assert_eq!(models.len(), 3);
        assert_eq!(models[0].keypoints.len(), 2);
        assert!(models[1].keypoints.is_empty());
        assert!(models[1].tensor.is_none());
        assert_eq!(models[0].metadata.map(|m| m.width), Some(640));
        assert!(models[1].metadata.is_some());
        assert!(models[2].metadata.is_none());
        assert_eq!(
            models[1].video_path,
            PathBuf::from("/data/videos/s_Cam-B_x.fine.mp4")
        );
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let source = source_with(&["A", "B", "C"]);
        let mut loader = SessionLoader::new(source.clone(), videos(&[]), 4);
        let mut coordinator = PlaybackCoordinator::new(30.0);

        let first = loader.begin(Session::new("s_Cam-N_x.fine"), &project(), &mut coordinator);
        let second = loader.begin(Session::new("other_Cam-N_y"), &project(), &mut coordinator);

        let stale = block_on(fetch_session(source.clone(), loader.discoverer.clone(), first));
        assert!(!loader.apply(stale));
        assert!(loader.tensor(0).is_none());
        assert_eq!(loader.state(), LoadState::Loading);

        let fresh = block_on(fetch_session(source, loader.discoverer.clone(), second));
        assert!(loader.apply(fresh));
        assert_eq!(loader.session().unwrap().key, "other_Cam-N_y");
        assert!(loader.tensor(0).is_none());
    }

    #[test]
    fn test_begin_resets_playback() {
        let source = source_with(&[]);
        let mut loader = SessionLoader::new(source, videos(&[]), 4);
        let mut coordinator = PlaybackCoordinator::new(30.0);
        coordinator.report_duration(10.0);
        coordinator.seek(4.0);
        coordinator.play();

        loader.begin(Session::new("s_Cam-N_x"), &project(), &mut coordinator);
        assert!(!coordinator.is_playing());
        assert_eq!(coordinator.current_time(), 0.0);
        assert_eq!(coordinator.duration(), 0.0);
    }

    #[test]
    fn test_revisited_session_is_served_from_cache() {
        let source = source_with(&["A", "B", "C"]);
        let mut loader = SessionLoader::new(source.clone(), videos(&[]), 8);
        run(&mut loader, source.clone(), "s_Cam-N_x.fine");
        assert_eq!(*source.fetches.lock().unwrap(), 3);

        let mut coordinator = PlaybackCoordinator::new(30.0);
        let ticket = loader.begin(Session::new("s_Cam-N_x.fine"), &project(), &mut coordinator);
        assert!(ticket.requests.is_empty());
        assert_eq!(ticket.videos.len(), 3);
        assert!(loader.tensor(2).is_some());
    }

    #[test]
    fn test_background_load_is_polled() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectMetadata {
            data_dir: dir.path().to_path_buf(),
            views: vec!["A".to_string()],
            ..ProjectMetadata::default()
        };
        let session = Session::new("s_Cam-N_x.fine");
        let path = session.prediction_path(&project, "A");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, CSV).unwrap();

        let mut loader =
            SessionLoader::new(Arc::new(FsPredictionSource), Arc::new(KnownVideos(Vec::new())), 4);
        let mut coordinator = PlaybackCoordinator::new(30.0);
        loader.load_session(session, &project, &mut coordinator);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !loader.poll() {
            assert!(std::time::Instant::now() < deadline, "load timed out");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(loader.tensor(0).unwrap().get(1, 1), Some([7.0, 8.0]));
    }

    #[test]
    fn test_dead_loader_thread_still_settles() {
        let source = source_with(&["A"]);
        let mut loader = SessionLoader::new(source, videos(&["A"]), 4);
        let mut coordinator = PlaybackCoordinator::new(30.0);
        loader.begin(Session::new("s_Cam-N_x.fine"), &project(), &mut coordinator);

        let (sender, receiver) = mpsc::channel::<SessionBatch>();
        drop(sender);
        loader.receiver = Some(receiver);

        assert!(loader.poll());
        assert_eq!(loader.state(), LoadState::Loaded);
        assert!(!loader.poll());

        let models = loader.widget_models(&project());
        assert_eq!(models.len(), 3);
        assert!(
            models
                .iter()
                .all(|m| m.tensor.is_none() && m.metadata.is_none())
        );
    }

    #[test]
    fn test_missing_file_is_a_fetch_error() {
        let result = block_on(FsPredictionSource.fetch(Path::new("/nonexistent/preds.csv")));
        assert!(matches!(result, Err(Error::Fetch { .. })));
    }
}
