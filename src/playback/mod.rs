mod cpal_output;
pub mod element;
pub mod output;
pub mod preload;
pub mod progress;
pub mod progress_indicator;
pub mod service;
mod symphonia_decoder;

pub use cpal_output::CpalAudioOutput;
pub use element::{HostEvent, PlayerElement};
pub use output::{AudioOutput, OutputEvent, PlaybackError};
pub use preload::{HttpPreloader, Preloader};
pub use progress::{PlaybackChange, PlaybackProgress};
pub use progress_indicator::{Bounds, Key, ProgressIndicator, SeekIntent};
pub use service::{PlaybackHandle, PlaybackService, PlaybackSnapshot, PlaybackState};
