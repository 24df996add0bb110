#![cfg(feature = "test-utils")]

mod support;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::support::{add_album, catalog, eventually, track_url, tracing_init};
use bucketdeck::config::PlayerSettings;
use bucketdeck::media_controls::{
    dispatch_media_action, MediaAction, MediaSession, MediaSessionBridge, MediaStatus,
    PositionState, TrackMetadata,
};
use bucketdeck::playback::output::AudioOutput;
use bucketdeck::playback::{PlaybackHandle, PlaybackService};
use bucketdeck::test_support::{
    MediaSessionCall, MockAudioOutput, MockCloudStorage, MockOutputHandle, RecordingMediaSession,
    RecordingPreloader,
};

const WAIT: Duration = Duration::from_secs(5);

struct MediaSessionFixture {
    handle: PlaybackHandle,
    output: MockOutputHandle,
    session: Arc<Mutex<RecordingMediaSession>>,
    bridge: tokio::task::JoinHandle<()>,
}

impl MediaSessionFixture {
    fn new() -> Self {
        tracing_init();

        let storage = Arc::new(MockCloudStorage::new());
        add_album(&storage, "Artist", "Album", &["01__Intro.mp3", "02__Outro.mp3"]);

        let (output, output_handle) = MockAudioOutput::new();
        let handle = PlaybackService::start(
            catalog(storage),
            Arc::new(RecordingPreloader::new()),
            PlayerSettings::default(),
            move || Ok(Box::new(output) as Box<dyn AudioOutput>),
            tokio::runtime::Handle::current(),
        );

        let session = Arc::new(Mutex::new(RecordingMediaSession::new()));
        let sink: Arc<Mutex<dyn MediaSession>> = session.clone();
        let bridge = MediaSessionBridge::spawn(&handle, sink, &tokio::runtime::Handle::current());

        Self {
            handle,
            output: output_handle,
            session,
            bridge,
        }
    }

    fn calls(&self) -> Vec<MediaSessionCall> {
        self.session.lock().unwrap().calls.clone()
    }

    fn positions(&self) -> Vec<PositionState> {
        self.session.lock().unwrap().positions()
    }

    fn last_status(&self) -> Option<MediaStatus> {
        self.session.lock().unwrap().last_status()
    }

    /// Load the intro track and wait until it plays
    async fn play_intro(&self) {
        self.handle
            .set_track(track_url("Artist", "Album", "01__Intro.mp3"));
        self.handle.set_playing(true);
        assert!(eventually(WAIT, || self.last_status() == Some(MediaStatus::Playing)).await);
    }
}

#[tokio::test]
async fn test_metadata_and_status_follow_track() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    let expected = TrackMetadata {
        title: "Intro".to_string(),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
    };
    assert!(fixture
        .calls()
        .contains(&MediaSessionCall::Metadata(Some(expected))));

    fixture.handle.set_playing(false);
    assert!(eventually(WAIT, || fixture.last_status() == Some(MediaStatus::Paused)).await);

    fixture.handle.clear_track();
    assert!(eventually(WAIT, || fixture.last_status() == Some(MediaStatus::Stopped)).await);
    assert!(fixture.calls().contains(&MediaSessionCall::Metadata(None)));
}

#[tokio::test]
async fn test_metadata_sent_once_per_track() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    fixture.handle.set_playing(false);
    assert!(eventually(WAIT, || fixture.last_status() == Some(MediaStatus::Paused)).await);
    fixture.handle.set_playing(true);
    assert!(eventually(WAIT, || fixture.last_status() == Some(MediaStatus::Playing)).await);

    let metadata_calls = fixture
        .calls()
        .iter()
        .filter(|call| matches!(call, MediaSessionCall::Metadata(_)))
        .count();
    assert_eq!(metadata_calls, 1);
}

#[tokio::test]
async fn test_position_falls_back_to_seekable_end() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    fixture.output.set_seekable_end(Some(60.0));
    fixture.output.advance_to(10.0);

    assert!(eventually(WAIT, || !fixture.positions().is_empty()).await);
    assert_eq!(
        fixture.positions(),
        vec![PositionState {
            position: 10.0,
            duration: 60.0
        }]
    );
}

#[tokio::test]
async fn test_position_tick_skipped_without_length() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    // Neither a duration nor a seekable range
    fixture.output.advance_to(5.0);

    fixture.output.set_duration(100.0);
    fixture.output.advance_to(6.0);

    assert!(eventually(WAIT, || !fixture.positions().is_empty()).await);
    assert_eq!(
        fixture.positions(),
        vec![PositionState {
            position: 6.0,
            duration: 100.0
        }]
    );
}

#[tokio::test]
async fn test_detach_stops_session_and_bridge() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    fixture.handle.detach().await;

    tokio::time::timeout(WAIT, fixture.bridge)
        .await
        .expect("bridge should stop after detach")
        .unwrap();

    let calls = fixture.session.lock().unwrap().calls.clone();
    assert_eq!(
        calls[calls.len() - 2..],
        [
            MediaSessionCall::Metadata(None),
            MediaSessionCall::Playback(MediaStatus::Stopped)
        ]
    );
    assert!(!fixture.output.is_subscribed());
}

#[tokio::test]
async fn test_seek_forward_uses_default_offset() {
    let fixture = MediaSessionFixture::new();
    fixture.output.set_duration(100.0);
    fixture.play_intro().await;
    fixture.output.advance_to(20.0);

    dispatch_media_action(&fixture.handle, MediaAction::SeekForward(None), 10.0);
    fixture.handle.state().await;
    assert_eq!(fixture.output.seeks(), vec![30.0]);

    dispatch_media_action(&fixture.handle, MediaAction::SeekBackward(Some(25.0)), 10.0);
    fixture.handle.state().await;
    assert_eq!(fixture.output.seeks(), vec![30.0, 5.0]);
}

#[tokio::test]
async fn test_seek_ignored_without_duration() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    dispatch_media_action(&fixture.handle, MediaAction::SeekForward(None), 10.0);
    dispatch_media_action(&fixture.handle, MediaAction::SeekTo(42.0), 10.0);
    fixture.handle.state().await;

    assert!(fixture.output.seeks().is_empty());
}

#[tokio::test]
async fn test_transport_actions_reach_controller() {
    let fixture = MediaSessionFixture::new();
    fixture.play_intro().await;

    dispatch_media_action(&fixture.handle, MediaAction::Pause, 10.0);
    let snapshot = fixture.handle.state().await.unwrap();
    assert!(!snapshot.is_playing);

    dispatch_media_action(&fixture.handle, MediaAction::Toggle, 10.0);
    let snapshot = fixture.handle.state().await.unwrap();
    assert!(snapshot.is_playing);

    dispatch_media_action(&fixture.handle, MediaAction::Stop, 10.0);
    let snapshot = fixture.handle.state().await.unwrap();
    assert_eq!(snapshot.current_track, None);
}
