// # Player Element
//
// Thin adapter between a host that drives the player through string
// attributes and DOM-style events, and the playback controller. Host
// mutations become handle calls; committed controller state is mirrored
// back into the attributes without being dispatched again.

use super::progress::{PlaybackChange, PlaybackProgress};
use super::progress_indicator::{Bounds, Key, ProgressIndicator};
use super::service::PlaybackHandle;
use crate::playlist::Navigation;
use std::collections::HashMap;
use tracing::debug;

pub const CURRENT_TRACK_URL: &str = "current-track-url";
pub const IS_PLAYING: &str = "is-playing";
pub const ALBUM_URL: &str = "album-url";

/// Events the host raises on the element
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Transport or track-row toggle, optionally naming a track
    PlayToggle(Option<String>),
    PlayNext,
    PlayPrev,
    Seek { time: f64 },
    PointerDown { x: f64 },
    PointerMove { x: f64 },
    PointerUp { x: f64 },
    KeyDown(Key),
    Resize(Bounds),
}

pub struct PlayerElement {
    handle: PlaybackHandle,
    attributes: HashMap<String, String>,
    indicator: ProgressIndicator,
    navigation: Navigation,
}

impl PlayerElement {
    pub fn new(handle: PlaybackHandle, keyboard_seek_step: f64) -> Self {
        PlayerElement {
            handle,
            attributes: HashMap::new(),
            indicator: ProgressIndicator::new(keyboard_seek_step),
            navigation: Navigation::default(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if self.attribute(name) == Some(value) {
            return;
        }
        self.attributes.insert(name.to_string(), value.to_string());

        match name {
            CURRENT_TRACK_URL => self.handle.set_track(value.to_string()),
            IS_PLAYING => self.handle.set_playing(value == "true"),
            ALBUM_URL => self.handle.set_album(Some(value.to_string())),
            _ => debug!("PlayerElement: Ignoring attribute {}", name),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        if self.attributes.remove(name).is_none() {
            return;
        }

        match name {
            CURRENT_TRACK_URL => self.handle.clear_track(),
            IS_PLAYING => self.handle.set_playing(false),
            ALBUM_URL => self.handle.set_album(None),
            _ => {}
        }
    }

    pub fn dispatch(&mut self, event: HostEvent) {
        let intent = match event {
            HostEvent::PlayToggle(track_url) => {
                self.handle.toggle(track_url);
                None
            }
            HostEvent::PlayNext => {
                self.handle.next();
                None
            }
            HostEvent::PlayPrev => {
                self.handle.previous();
                None
            }
            HostEvent::Seek { time } => {
                self.handle.seek_to(time);
                None
            }
            HostEvent::PointerDown { x } => self.indicator.pointer_down(x),
            HostEvent::PointerMove { x } => self.indicator.pointer_move(x),
            HostEvent::PointerUp { x } => self.indicator.pointer_up(x),
            HostEvent::KeyDown(key) => self.indicator.key_down(key),
            HostEvent::Resize(bounds) => {
                self.indicator.set_bounds(bounds);
                None
            }
        };

        if let Some(intent) = intent {
            self.handle.seek_to(intent.time);
        }
    }

    /// Mirror a controller notification into the element.
    ///
    /// Returns the `change` event to raise on the host, if any.
    pub fn apply(&mut self, progress: &PlaybackProgress) -> Option<PlaybackChange> {
        match progress {
            PlaybackProgress::Changed(change) => {
                match &change.current_track {
                    Some(url) => {
                        self.attributes
                            .insert(CURRENT_TRACK_URL.to_string(), url.clone());
                    }
                    None => {
                        self.attributes.remove(CURRENT_TRACK_URL);
                    }
                }
                self.attributes
                    .insert(IS_PLAYING.to_string(), change.is_playing.to_string());
                return Some(change.clone());
            }
            PlaybackProgress::NavigationChanged(navigation) => {
                self.navigation = navigation.clone();
            }
            PlaybackProgress::PositionUpdate { position, duration } => {
                self.indicator.update(*position, *duration);
            }
            PlaybackProgress::Seeked { position } => {
                let duration = self.indicator.duration();
                self.indicator.update(*position, duration);
            }
            PlaybackProgress::Detached => {
                self.indicator.release();
            }
            PlaybackProgress::PositionState(_) | PlaybackProgress::PlayRejected { .. } => {}
        }
        None
    }

    pub fn previous_enabled(&self) -> bool {
        self.navigation.has_previous
    }

    pub fn next_enabled(&self) -> bool {
        self.navigation.has_next
    }

    /// The transport is shown only while a track is loaded
    pub fn transport_visible(&self) -> bool {
        self.attributes.contains_key(CURRENT_TRACK_URL)
    }

    pub fn indicator(&self) -> &ProgressIndicator {
        &self.indicator
    }

    /// Host removed the element: end any drag and detach the controller
    pub async fn disconnect(&mut self) {
        self.indicator.release();
        self.handle.detach().await;
    }
}
