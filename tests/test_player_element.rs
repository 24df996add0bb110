#![cfg(feature = "test-utils")]

mod support;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::support::{add_album, album_url, catalog, track_url, tracing_init};
use bucketdeck::config::PlayerSettings;
use bucketdeck::playback::element::{ALBUM_URL, CURRENT_TRACK_URL, IS_PLAYING};
use bucketdeck::playback::output::AudioOutput;
use bucketdeck::playback::{
    Bounds, HostEvent, Key, PlaybackChange, PlaybackHandle, PlaybackProgress, PlaybackService,
    PlayerElement,
};
use bucketdeck::test_support::{
    MockAudioOutput, MockCloudStorage, MockOutputHandle, RecordingPreloader,
};

const WAIT: Duration = Duration::from_secs(5);

/// Element wired to a controller, with its notifications pumped by hand
struct ElementTestFixture {
    element: PlayerElement,
    handle: PlaybackHandle,
    progress_rx: tokio::sync::mpsc::UnboundedReceiver<PlaybackProgress>,
    output: MockOutputHandle,
    /// `change` events the element raised on the host
    changes: Vec<PlaybackChange>,
}

impl ElementTestFixture {
    fn new() -> Self {
        tracing_init();

        let storage = Arc::new(MockCloudStorage::new());
        add_album(
            &storage,
            "Artist",
            "Album",
            &["01__A.mp3", "02__B.mp3", "03__C.mp3", "folder.png"],
        );

        let (output, output_handle) = MockAudioOutput::new();
        let handle = PlaybackService::start(
            catalog(storage),
            Arc::new(RecordingPreloader::new()),
            PlayerSettings::default(),
            move || Ok(Box::new(output) as Box<dyn AudioOutput>),
            tokio::runtime::Handle::current(),
        );
        let progress_rx = handle.subscribe_progress();

        Self {
            element: PlayerElement::new(handle.clone(), 5.0),
            handle,
            progress_rx,
            output: output_handle,
            changes: Vec::new(),
        }
    }

    /// Feed notifications into the element until `condition` holds
    async fn pump_until<F>(&mut self, condition: F) -> bool
    where
        F: Fn(&PlayerElement) -> bool,
    {
        let deadline = Instant::now() + WAIT;

        while Instant::now() < deadline {
            if condition(&self.element) {
                return true;
            }
            match timeout(Duration::from_millis(100), self.progress_rx.recv()).await {
                Ok(Some(progress)) => {
                    if let Some(change) = self.element.apply(&progress) {
                        self.changes.push(change);
                    }
                }
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        condition(&self.element)
    }

    /// Host markup: album context, first track, playing
    async fn start_album(&mut self) {
        self.element
            .set_attribute(ALBUM_URL, &album_url("Artist", "Album"));
        self.element
            .set_attribute(CURRENT_TRACK_URL, &track_url("Artist", "Album", "01__A.mp3"));
        self.element.set_attribute(IS_PLAYING, "true");

        assert!(
            self.pump_until(|e| e.next_enabled() && e.attribute(IS_PLAYING) == Some("true"))
                .await
        );
    }
}

#[tokio::test]
async fn test_album_navigation_through_element() {
    let mut fixture = ElementTestFixture::new();
    let a = track_url("Artist", "Album", "01__A.mp3");
    let b = track_url("Artist", "Album", "02__B.mp3");

    fixture.start_album().await;
    assert!(fixture.element.transport_visible());
    assert!(!fixture.element.previous_enabled());

    fixture.element.dispatch(HostEvent::PlayNext);
    let b_attr = b.clone();
    assert!(
        fixture
            .pump_until(|e| e.attribute(CURRENT_TRACK_URL) == Some(b_attr.as_str())
                && e.previous_enabled())
            .await
    );
    assert!(fixture.element.next_enabled());
    assert_eq!(fixture.output.source().as_deref(), Some(b.as_str()));
    assert_eq!(
        fixture.changes.last(),
        Some(&PlaybackChange {
            current_track: Some(b.clone()),
            is_playing: true,
        })
    );

    fixture.element.dispatch(HostEvent::PlayPrev);
    let a_attr = a.clone();
    assert!(
        fixture
            .pump_until(|e| e.attribute(CURRENT_TRACK_URL) == Some(a_attr.as_str())
                && !e.previous_enabled())
            .await
    );
    assert_eq!(fixture.output.source().as_deref(), Some(a.as_str()));
}

#[tokio::test]
async fn test_mirrored_state_is_not_dispatched_again() {
    let mut fixture = ElementTestFixture::new();
    let b = track_url("Artist", "Album", "02__B.mp3");

    fixture.start_album().await;
    fixture.element.dispatch(HostEvent::PlayNext);
    let b_attr = b.clone();
    assert!(
        fixture
            .pump_until(|e| e.attribute(CURRENT_TRACK_URL) == Some(b_attr.as_str()))
            .await
    );

    // The host echoing the mirrored values back changes nothing
    fixture.handle.state().await;
    let play_calls = fixture.output.play_calls();
    fixture.element.set_attribute(CURRENT_TRACK_URL, &b);
    fixture.element.set_attribute(IS_PLAYING, "true");
    fixture.handle.state().await;
    assert_eq!(fixture.output.play_calls(), play_calls);

    // Applying a notification only touches the attributes
    let other = track_url("Artist", "Album", "03__C.mp3");
    let change = fixture
        .element
        .apply(&PlaybackProgress::Changed(PlaybackChange {
            current_track: Some(other.clone()),
            is_playing: false,
        }));
    assert!(change.is_some());
    assert_eq!(fixture.element.attribute(CURRENT_TRACK_URL), Some(other.as_str()));
    assert_eq!(fixture.element.attribute(IS_PLAYING), Some("false"));

    let snapshot = fixture.handle.state().await.unwrap();
    assert_eq!(snapshot.current_track.as_deref(), Some(b.as_str()));
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn test_play_toggle_event() {
    let mut fixture = ElementTestFixture::new();
    let a = track_url("Artist", "Album", "01__A.mp3");
    let c = track_url("Artist", "Album", "03__C.mp3");

    fixture.start_album().await;

    fixture.element.dispatch(HostEvent::PlayToggle(Some(a)));
    assert!(fixture.pump_until(|e| e.attribute(IS_PLAYING) == Some("false")).await);

    let c_attr = c.clone();
    fixture.element.dispatch(HostEvent::PlayToggle(Some(c)));
    assert!(
        fixture
            .pump_until(|e| e.attribute(CURRENT_TRACK_URL) == Some(c_attr.as_str())
                && e.attribute(IS_PLAYING) == Some("true"))
            .await
    );

    fixture.element.dispatch(HostEvent::PlayToggle(None));
    assert!(fixture.pump_until(|e| !e.transport_visible()).await);
}

#[tokio::test]
async fn test_removing_track_hides_transport() {
    let mut fixture = ElementTestFixture::new();
    fixture.start_album().await;

    fixture.element.remove_attribute(CURRENT_TRACK_URL);
    assert!(!fixture.element.transport_visible());

    assert!(fixture.pump_until(|e| e.attribute(IS_PLAYING) == Some("false")).await);
    assert!(!fixture.element.transport_visible());
    assert_eq!(
        fixture.changes.last(),
        Some(&PlaybackChange {
            current_track: None,
            is_playing: false,
        })
    );

    let snapshot = fixture.handle.state().await.unwrap();
    assert_eq!(snapshot.current_track, None);
    assert!(!fixture.output.is_playing());
}

#[tokio::test]
async fn test_pointer_and_key_input_seek() {
    let mut fixture = ElementTestFixture::new();
    fixture.output.set_duration(100.0);
    fixture.start_album().await;

    fixture.output.advance_to(40.0);
    assert!(
        fixture
            .pump_until(|e| e.indicator().duration() == 100.0 && e.indicator().current_time() == 40.0)
            .await
    );

    fixture.element.dispatch(HostEvent::Resize(Bounds {
        left: 10.0,
        width: 200.0,
    }));
    fixture.element.dispatch(HostEvent::PointerDown { x: 60.0 });
    assert!(fixture.element.indicator().is_dragging());
    fixture.element.dispatch(HostEvent::PointerMove { x: 110.0 });
    fixture.element.dispatch(HostEvent::PointerUp { x: 500.0 });
    assert!(!fixture.element.indicator().is_dragging());

    // Moves without a drag are ignored
    fixture.element.dispatch(HostEvent::PointerMove { x: 20.0 });

    fixture.handle.state().await;
    assert_eq!(fixture.output.seeks(), vec![25.0, 50.0, 100.0]);

    assert!(fixture.pump_until(|e| e.indicator().current_time() == 100.0).await);
    fixture.element.dispatch(HostEvent::KeyDown(Key::ArrowLeft));
    fixture.element.dispatch(HostEvent::KeyDown(Key::Other));
    fixture.element.dispatch(HostEvent::Seek { time: 30.0 });

    fixture.handle.state().await;
    assert_eq!(fixture.output.seeks(), vec![25.0, 50.0, 100.0, 95.0, 30.0]);
}

#[tokio::test]
async fn test_disconnect_detaches_controller() {
    let mut fixture = ElementTestFixture::new();
    fixture.output.set_duration(100.0);
    fixture.start_album().await;

    fixture.output.advance_to(10.0);
    assert!(fixture.pump_until(|e| e.indicator().duration() == 100.0).await);
    fixture.element.dispatch(HostEvent::Resize(Bounds {
        left: 0.0,
        width: 100.0,
    }));
    fixture.element.dispatch(HostEvent::PointerDown { x: 50.0 });
    assert!(fixture.element.indicator().is_dragging());

    fixture.element.disconnect().await;

    assert!(!fixture.element.indicator().is_dragging());
    assert!(!fixture.output.is_subscribed());
    assert!(fixture.handle.state().await.is_none());
}
