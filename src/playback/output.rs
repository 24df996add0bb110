use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;

/// Errors surfaced by an audio output
#[derive(Error, Debug, Clone)]
pub enum PlaybackError {
    #[error("No source loaded")]
    NoSource,
    #[error("Fetch failed: {0}")]
    Fetch(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Playback rejected: {0}")]
    Rejected(String),
}

/// Lifecycle events raised by the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    /// Duration (or seekable range) became known
    MetadataLoaded,
    /// Playback position advanced
    TimeUpdate,
    /// Source played to its end; the output is paused
    Ended,
    Play,
    Pause,
}

pub type OutputEventSender = tokio_mpsc::UnboundedSender<OutputEvent>;

/// The single audio output owned by the playback controller.
///
/// Times are seconds as `f64`. `duration` is NaN until the source's length
/// is known and infinite for unbounded streams; callers must check
/// `is_finite` before seeking.
#[async_trait::async_trait(?Send)]
pub trait AudioOutput {
    /// Install the listener that receives output events
    fn subscribe(&mut self, events: OutputEventSender);

    /// Remove the listener installed by `subscribe`
    fn unsubscribe(&mut self);

    fn set_source(&mut self, url: &str);

    fn clear_source(&mut self);

    /// Start or resume playback of the current source
    async fn play(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self);

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, seconds: f64);

    fn duration(&self) -> f64;

    /// Upper bound of the seekable range, if the output has one
    fn seekable_end(&self) -> Option<f64>;
}
