use crate::locator::{Track, TrackLocation};
use crate::playback::{PlaybackHandle, PlaybackProgress};
use souvlaki::{
    MediaControlEvent, MediaControls, MediaMetadata, MediaPlayback, MediaPosition, PlatformConfig,
    SeekDirection,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// Position and duration as reported to the platform media session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionState {
    pub position: f64,
    pub duration: f64,
}

/// Compute the position state for one output tick.
///
/// Streams without a known length fall back to the end of the seekable
/// range. With neither, nothing is reported for this tick.
pub fn position_state(
    position: f64,
    duration: f64,
    seekable_end: Option<f64>,
) -> Option<PositionState> {
    let duration = if duration.is_finite() {
        duration
    } else {
        seekable_end.filter(|end| end.is_finite())?
    };

    if duration < 0.0 {
        return None;
    }

    let position = if position.is_finite() {
        position.clamp(0.0, duration)
    } else {
        0.0
    };

    Some(PositionState { position, duration })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    Playing,
    Paused,
    Stopped,
}

/// Now-playing metadata derived from a track locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl TrackMetadata {
    pub fn from_url(url: &str) -> Self {
        let track = Track::from_url(url);
        let location = TrackLocation::from_url(url);
        TrackMetadata {
            title: track.title,
            artist: location.artist,
            album: location.album,
        }
    }
}

/// Platform sink for transport state and now-playing metadata
pub trait MediaSession: Send {
    fn set_metadata(&mut self, metadata: Option<TrackMetadata>);

    fn set_playback(&mut self, status: MediaStatus);

    fn set_position_state(&mut self, state: PositionState);
}

/// A transport request raised by the platform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaAction {
    Play,
    Pause,
    Toggle,
    Stop,
    Next,
    Previous,
    SeekTo(f64),
    SeekForward(Option<f64>),
    SeekBackward(Option<f64>),
}

/// Forward a platform transport request to the controller
pub fn dispatch_media_action(handle: &PlaybackHandle, action: MediaAction, default_offset: f64) {
    match action {
        MediaAction::Play => handle.set_playing(true),
        MediaAction::Pause => handle.set_playing(false),
        MediaAction::Toggle => handle.toggle_playing(),
        MediaAction::Stop => handle.clear_track(),
        MediaAction::Next => handle.next(),
        MediaAction::Previous => handle.previous(),
        MediaAction::SeekTo(seconds) => handle.seek_to(seconds),
        MediaAction::SeekForward(offset) => handle.seek_by(offset.unwrap_or(default_offset)),
        MediaAction::SeekBackward(offset) => handle.seek_by(-offset.unwrap_or(default_offset)),
    }
}

pub struct MediaSessionBridge;

impl MediaSessionBridge {
    /// Pump controller progress into `session` until the controller detaches
    pub fn spawn(
        handle: &PlaybackHandle,
        session: Arc<Mutex<dyn MediaSession>>,
        runtime_handle: &tokio::runtime::Handle,
    ) -> tokio::task::JoinHandle<()> {
        let mut progress_rx = handle.subscribe_progress_where(|progress| {
            matches!(
                progress,
                PlaybackProgress::Changed(_) | PlaybackProgress::PositionState(_)
            )
        });

        runtime_handle.spawn(async move {
            let mut current_track: Option<String> = None;

            while let Some(progress) = progress_rx.recv().await {
                let mut session = session.lock().unwrap();
                match progress {
                    PlaybackProgress::Changed(change) => {
                        if change.current_track != current_track {
                            let metadata = change.current_track.as_deref().map(TrackMetadata::from_url);
                            debug!("Media session: Now playing {:?}", metadata);
                            session.set_metadata(metadata);
                            current_track = change.current_track.clone();
                        }

                        let status = match (&change.current_track, change.is_playing) {
                            (None, _) => MediaStatus::Stopped,
                            (Some(_), true) => MediaStatus::Playing,
                            (Some(_), false) => MediaStatus::Paused,
                        };
                        session.set_playback(status);
                    }
                    PlaybackProgress::PositionState(state) => {
                        session.set_position_state(state);
                    }
                    PlaybackProgress::Detached => {
                        session.set_metadata(None);
                        session.set_playback(MediaStatus::Stopped);
                        break;
                    }
                    _ => {}
                }
            }

            info!("Media session bridge stopped");
        })
    }
}

/// Map an OS media control event onto a transport request
pub fn media_action_from_event(event: &MediaControlEvent) -> Option<MediaAction> {
    let action = match event {
        MediaControlEvent::Toggle => MediaAction::Toggle,
        MediaControlEvent::Play => MediaAction::Play,
        MediaControlEvent::Pause => MediaAction::Pause,
        MediaControlEvent::Stop => MediaAction::Stop,
        MediaControlEvent::Next => MediaAction::Next,
        MediaControlEvent::Previous => MediaAction::Previous,
        MediaControlEvent::SetPosition(MediaPosition(position)) => {
            MediaAction::SeekTo(position.as_secs_f64())
        }
        MediaControlEvent::Seek(SeekDirection::Forward) => MediaAction::SeekForward(None),
        MediaControlEvent::Seek(SeekDirection::Backward) => MediaAction::SeekBackward(None),
        MediaControlEvent::SeekBy(SeekDirection::Forward, offset) => {
            MediaAction::SeekForward(Some(offset.as_secs_f64()))
        }
        MediaControlEvent::SeekBy(SeekDirection::Backward, offset) => {
            MediaAction::SeekBackward(Some(offset.as_secs_f64()))
        }
        _ => return None,
    };
    Some(action)
}

/// OS media controls (MPRIS on Linux, Now Playing on macOS)
pub struct SouvlakiMediaSession {
    controls: MediaControls,
    metadata: Option<TrackMetadata>,
    status: MediaStatus,
    position: f64,
    duration: Option<f64>,
}

impl SouvlakiMediaSession {
    /// Register with the OS and route its events to `handle`
    pub fn new(handle: PlaybackHandle, seek_offset: f64) -> Result<Self, souvlaki::Error> {
        let config = PlatformConfig {
            dbus_name: "bucketdeck",
            display_name: "bucketdeck",
            hwnd: None,
        };

        let mut controls = MediaControls::new(config)?;

        controls.attach(move |event: MediaControlEvent| {
            match media_action_from_event(&event) {
                Some(action) => {
                    info!("Media control event received: {:?}", action);
                    dispatch_media_action(&handle, action, seek_offset);
                }
                None => debug!("Media control event ignored: {:?}", event),
            }
        })?;

        info!("Media controls initialized");

        Ok(SouvlakiMediaSession {
            controls,
            metadata: None,
            status: MediaStatus::Stopped,
            position: 0.0,
            duration: None,
        })
    }

    fn push_metadata(&mut self) {
        let result = match &self.metadata {
            Some(metadata) => self.controls.set_metadata(MediaMetadata {
                title: Some(metadata.title.as_str()),
                artist: Some(metadata.artist.as_str()).filter(|s| !s.is_empty()),
                album: Some(metadata.album.as_str()).filter(|s| !s.is_empty()),
                cover_url: None,
                duration: self.duration.map(Duration::from_secs_f64),
            }),
            None => self.controls.set_metadata(MediaMetadata::default()),
        };

        if let Err(e) = result {
            error!("Failed to set media metadata: {:?}", e);
        }
    }

    fn push_playback(&mut self) {
        let progress = Some(MediaPosition(Duration::from_secs_f64(self.position)));
        let playback = match self.status {
            MediaStatus::Playing => MediaPlayback::Playing { progress },
            MediaStatus::Paused => MediaPlayback::Paused { progress },
            MediaStatus::Stopped => MediaPlayback::Stopped,
        };

        if let Err(e) = self.controls.set_playback(playback) {
            error!("Failed to set playback state: {:?}", e);
        }
    }
}

impl MediaSession for SouvlakiMediaSession {
    fn set_metadata(&mut self, metadata: Option<TrackMetadata>) {
        self.metadata = metadata;
        self.duration = None;
        self.position = 0.0;
        self.push_metadata();
    }

    fn set_playback(&mut self, status: MediaStatus) {
        self.status = status;
        self.push_playback();
    }

    fn set_position_state(&mut self, state: PositionState) {
        self.position = state.position;
        if self.duration != Some(state.duration) {
            self.duration = Some(state.duration);
            self.push_metadata();
        }
        if self.status != MediaStatus::Stopped {
            self.push_playback();
        }
        trace!("Media controls: Position {:.1}/{:.1}", state.position, state.duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_state_uses_finite_duration() {
        let state = position_state(12.0, 200.0, Some(50.0)).unwrap();
        assert_eq!(state, PositionState { position: 12.0, duration: 200.0 });
    }

    #[test]
    fn test_position_state_falls_back_to_seekable_end() {
        let state = position_state(12.0, f64::INFINITY, Some(50.0)).unwrap();
        assert_eq!(state.duration, 50.0);

        let state = position_state(60.0, f64::NAN, Some(50.0)).unwrap();
        assert_eq!(state.position, 50.0);
    }

    #[test]
    fn test_position_state_skips_without_range() {
        assert!(position_state(12.0, f64::NAN, None).is_none());
        assert!(position_state(12.0, f64::INFINITY, Some(f64::INFINITY)).is_none());
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(
            media_action_from_event(&MediaControlEvent::Toggle),
            Some(MediaAction::Toggle)
        );
        assert_eq!(
            media_action_from_event(&MediaControlEvent::SetPosition(MediaPosition(
                Duration::from_secs(30)
            ))),
            Some(MediaAction::SeekTo(30.0))
        );
        assert_eq!(
            media_action_from_event(&MediaControlEvent::SeekBy(
                SeekDirection::Backward,
                Duration::from_secs(15)
            )),
            Some(MediaAction::SeekBackward(Some(15.0)))
        );
        assert_eq!(media_action_from_event(&MediaControlEvent::Raise), None);
    }

    #[test]
    fn test_metadata_from_locator() {
        let metadata =
            TrackMetadata::from_url("https://music.example.com/The%20Band/Debut/04__Fourth%20Song.mp3");
        assert_eq!(metadata.title, "Fourth Song");
        assert_eq!(metadata.artist, "The Band");
        assert_eq!(metadata.album, "Debut");
    }
}
