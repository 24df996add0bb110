pub mod handle;

use crate::media_controls::PositionState;
use crate::playlist::Navigation;
pub use handle::{PlaybackProgressHandle, ProgressFilter};
use serde::Serialize;

/// Committed `{current_track, is_playing}` pair, raised after every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackChange {
    pub current_track: Option<String>,
    pub is_playing: bool,
}

/// Progress updates during playback
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackProgress {
    Changed(PlaybackChange),
    NavigationChanged(Navigation),
    PositionUpdate {
        position: f64,
        duration: f64,
    },
    /// Position and duration as reported to the media session
    PositionState(PositionState),
    Seeked {
        position: f64,
    },
    PlayRejected {
        track: String,
        reason: String,
    },
    Detached,
}

impl PlaybackProgress {
    /// Periodic position reports raised while the output is running
    pub fn is_tick(&self) -> bool {
        matches!(
            self,
            PlaybackProgress::PositionUpdate { .. } | PlaybackProgress::PositionState(_)
        )
    }
}
