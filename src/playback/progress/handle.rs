use super::PlaybackProgress;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, info};

/// Decides which updates a subscriber receives
pub type ProgressFilter = fn(&PlaybackProgress) -> bool;

struct Subscriber {
    tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    filter: Option<ProgressFilter>,
}

impl Subscriber {
    fn wants(&self, progress: &PlaybackProgress) -> bool {
        // Detached always goes out so every stream can wind down
        matches!(progress, PlaybackProgress::Detached)
            || self.filter.map_or(true, |filter| filter(progress))
    }
}

/// Fans controller updates out to any number of subscribers, in emission order
#[derive(Clone)]
pub struct PlaybackProgressHandle {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl PlaybackProgressHandle {
    /// Spawn the dispatch task that drains `progress_rx`
    pub fn new(
        mut progress_rx: tokio_mpsc::UnboundedReceiver<PlaybackProgress>,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));
        let dispatch = subscribers.clone();

        runtime_handle.spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let mut subscribers = dispatch.lock().unwrap();
                let before = subscribers.len();
                // A failed send means the receiver was dropped
                subscribers.retain(|subscriber| {
                    !subscriber.wants(&progress) || subscriber.tx.send(progress.clone()).is_ok()
                });
                if subscribers.len() < before {
                    debug!("Dropped {} closed progress subscribers", before - subscribers.len());
                }
            }

            info!("Playback progress channel closed, exiting");
            // Dropping the senders ends every subscriber stream
            dispatch.lock().unwrap().clear();
        });

        Self { subscribers }
    }

    /// Receive every update from now on
    pub fn subscribe_all(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.subscribe(None)
    }

    /// Receive only the updates `filter` accepts, plus `Detached`
    pub fn subscribe_where(
        &self,
        filter: ProgressFilter,
    ) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.subscribe(Some(filter))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    fn subscribe(
        &self,
        filter: Option<ProgressFilter>,
    ) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .push(Subscriber { tx, filter });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackChange;
    use std::time::Duration;

    fn change(is_playing: bool) -> PlaybackProgress {
        PlaybackProgress::Changed(PlaybackChange {
            current_track: Some("https://music.example.com/A/B/01__X.mp3".to_string()),
            is_playing,
        })
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_updates_in_order() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut first = handle.subscribe_all();
        let mut second = handle.subscribe_all();

        tx.send(change(true)).unwrap();
        tx.send(change(false)).unwrap();

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await, Some(change(true)));
            assert_eq!(rx.recv().await, Some(change(false)));
        }
    }

    #[tokio::test]
    async fn test_filtered_subscriber_skips_ticks() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut changes = handle.subscribe_where(|progress| !progress.is_tick());

        tx.send(PlaybackProgress::PositionUpdate {
            position: 1.0,
            duration: 10.0,
        })
        .unwrap();
        tx.send(change(true)).unwrap();
        tx.send(PlaybackProgress::Detached).unwrap();

        assert_eq!(changes.recv().await, Some(change(true)));
        assert_eq!(changes.recv().await, Some(PlaybackProgress::Detached));
    }

    #[tokio::test]
    async fn test_dropped_receivers_are_removed() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let kept = handle.subscribe_all();
        drop(handle.subscribe_all());
        assert_eq!(handle.subscriber_count(), 2);

        tx.send(change(true)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(handle.subscriber_count(), 1);
        drop(kept);
    }

    #[tokio::test]
    async fn test_closing_source_ends_streams() {
        let (tx, rx) = tokio_mpsc::unbounded_channel();
        let handle = PlaybackProgressHandle::new(rx, tokio::runtime::Handle::current());
        let mut stream = handle.subscribe_all();

        drop(tx);
        assert_eq!(stream.recv().await, None);
    }
}
