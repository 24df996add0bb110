// Test support utilities for both unit and integration tests

use crate::cloud_storage::{CloudStorage, CloudStorageError};
use crate::media_controls::{MediaSession, MediaStatus, PositionState, TrackMetadata};
use crate::playback::output::{AudioOutput, OutputEvent, OutputEventSender, PlaybackError};
use crate::playback::preload::Preloader;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Mock cloud storage for testing
///
/// Serves keys from memory, counts listing requests per prefix and can
/// hold listings for chosen prefixes until released.
pub struct MockCloudStorage {
    keys: Mutex<Vec<String>>,
    requests: Mutex<HashMap<String, usize>>,
    held: Mutex<HashSet<String>>,
    released: watch::Sender<u64>,
    failing: AtomicBool,
}

impl Default for MockCloudStorage {
    fn default() -> Self {
        let (released, _) = watch::channel(0);
        MockCloudStorage {
            keys: Mutex::new(Vec::new()),
            requests: Mutex::new(HashMap::new()),
            held: Mutex::new(HashSet::new()),
            released,
            failing: AtomicBool::new(false),
        }
    }
}

impl MockCloudStorage {
    #[allow(unused)] // Used in tests
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str) {
        self.keys.lock().unwrap().push(key.to_string());
    }

    /// Number of listings issued for exactly `prefix`
    pub fn requests_for(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(prefix)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }

    /// Make listings for `prefix` block until `release` is called
    pub fn hold(&self, prefix: &str) {
        self.held.lock().unwrap().insert(prefix.to_string());
    }

    pub fn release(&self, prefix: &str) {
        self.held.lock().unwrap().remove(prefix);
        self.released.send_modify(|version| *version += 1);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn wait_until_released(&self, prefix: &str) {
        let mut rx = self.released.subscribe();
        loop {
            let held = self.held.lock().unwrap().contains(prefix);
            if !held {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait::async_trait]
impl CloudStorage for MockCloudStorage {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError> {
        *self
            .requests
            .lock()
            .unwrap()
            .entry(prefix.to_string())
            .or_insert(0) += 1;

        self.wait_until_released(prefix).await;

        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudStorageError::SdkError("mock listing failure".to_string()));
        }

        Ok(self
            .keys
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Debug)]
struct MockOutputState {
    listener: Option<OutputEventSender>,
    source: Option<String>,
    playing: bool,
    current_time: f64,
    duration: f64,
    /// Duration every new source reports
    source_duration: f64,
    seekable_end: Option<f64>,
    reject_play: Option<String>,
    play_calls: usize,
    seeks: Vec<f64>,
}

/// Audio output whose behavior is driven from a `MockOutputHandle`
pub struct MockAudioOutput {
    state: Arc<Mutex<MockOutputState>>,
}

/// Test-side view of a `MockAudioOutput` that was moved into the service
#[derive(Clone)]
pub struct MockOutputHandle {
    state: Arc<Mutex<MockOutputState>>,
}

impl MockAudioOutput {
    pub fn new() -> (Self, MockOutputHandle) {
        let state = Arc::new(Mutex::new(MockOutputState {
            listener: None,
            source: None,
            playing: false,
            current_time: 0.0,
            duration: f64::NAN,
            source_duration: f64::NAN,
            seekable_end: None,
            reject_play: None,
            play_calls: 0,
            seeks: Vec::new(),
        }));
        (
            MockAudioOutput {
                state: state.clone(),
            },
            MockOutputHandle { state },
        )
    }
}

#[async_trait::async_trait(?Send)]
impl AudioOutput for MockAudioOutput {
    fn subscribe(&mut self, events: OutputEventSender) {
        self.state.lock().unwrap().listener = Some(events);
    }

    fn unsubscribe(&mut self) {
        self.state.lock().unwrap().listener = None;
    }

    fn set_source(&mut self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.source = Some(url.to_string());
        state.playing = false;
        state.current_time = 0.0;
        state.duration = state.source_duration;
    }

    fn clear_source(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.source = None;
        state.playing = false;
        state.current_time = 0.0;
        state.duration = f64::NAN;
    }

    async fn play(&mut self) -> Result<(), PlaybackError> {
        let mut state = self.state.lock().unwrap();
        state.play_calls += 1;
        if let Some(reason) = state.reject_play.clone() {
            return Err(PlaybackError::Rejected(reason));
        }
        if state.source.is_none() {
            return Err(PlaybackError::NoSource);
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut state = self.state.lock().unwrap();
        state.current_time = seconds;
        state.seeks.push(seconds);
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn seekable_end(&self) -> Option<f64> {
        self.state.lock().unwrap().seekable_end
    }
}

impl MockOutputHandle {
    /// Set the duration of the current source and of every later one
    pub fn set_duration(&self, duration: f64) {
        let mut state = self.state.lock().unwrap();
        state.duration = duration;
        state.source_duration = duration;
    }

    pub fn set_seekable_end(&self, end: Option<f64>) {
        self.state.lock().unwrap().seekable_end = end;
    }

    /// Move the playhead and raise `TimeUpdate`
    pub fn advance_to(&self, seconds: f64) {
        self.state.lock().unwrap().current_time = seconds;
        self.emit(OutputEvent::TimeUpdate);
    }

    /// Play to the end: the output pauses itself and raises `Ended`
    pub fn finish(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.playing = false;
            if state.duration.is_finite() {
                state.current_time = state.duration;
            }
        }
        self.emit(OutputEvent::Ended);
    }

    /// Make every later `play` fail with `reason`, or succeed again with `None`
    pub fn reject_play(&self, reason: Option<&str>) {
        self.state.lock().unwrap().reject_play = reason.map(str::to_string);
    }

    pub fn emit(&self, event: OutputEvent) {
        if let Some(listener) = self.state.lock().unwrap().listener.as_ref() {
            let _ = listener.send(event);
        }
    }

    pub fn source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().listener.is_some()
    }

    pub fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }
}

/// Preloader that records requested urls
#[derive(Default)]
pub struct RecordingPreloader {
    urls: Mutex<Vec<String>>,
}

impl RecordingPreloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preloaded(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl Preloader for RecordingPreloader {
    fn preload(&self, url: &str) {
        self.urls.lock().unwrap().push(url.to_string());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaSessionCall {
    Metadata(Option<TrackMetadata>),
    Playback(MediaStatus),
    Position(PositionState),
}

/// Media session sink that records every call
#[derive(Debug, Default)]
pub struct RecordingMediaSession {
    pub calls: Vec<MediaSessionCall>,
}

impl RecordingMediaSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(&self) -> Vec<PositionState> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                MediaSessionCall::Position(state) => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn last_status(&self) -> Option<MediaStatus> {
        self.calls.iter().rev().find_map(|call| match call {
            MediaSessionCall::Playback(status) => Some(*status),
            _ => None,
        })
    }
}

impl MediaSession for RecordingMediaSession {
    fn set_metadata(&mut self, metadata: Option<TrackMetadata>) {
        self.calls.push(MediaSessionCall::Metadata(metadata));
    }

    fn set_playback(&mut self, status: MediaStatus) {
        self.calls.push(MediaSessionCall::Playback(status));
    }

    fn set_position_state(&mut self, state: PositionState) {
        self.calls.push(MediaSessionCall::Position(state));
    }
}
