// # Playlist Resolution
//
// `resolve` turns an album listing plus the current track into the two
// sequences the controller navigates with. `PlaylistLoader` runs that
// against the catalog and makes sure a load superseded by a newer one can
// never be applied.

use crate::catalog::TrackCatalog;
use crate::locator::{is_cover_art, track_key, AlbumRef, Track};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Navigation state derived for one (album, current track) pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playlist {
    /// Tracks after the current one, in album order
    pub remaining: Vec<Track>,
    /// Every playable track of the album, in album order
    pub all: Vec<Track>,
    current_key: Option<String>,
}

impl Playlist {
    pub fn has_next(&self) -> bool {
        !self.remaining.is_empty()
    }

    pub fn next_track(&self) -> Option<&Track> {
        self.remaining.first()
    }

    /// The track immediately before the current one, by filename order
    pub fn previous_track(&self) -> Option<&Track> {
        let current = self.current_key.as_deref()?;
        self.all
            .iter()
            .rev()
            .find(|track| track.sort_key() < current)
    }

    pub fn has_previous(&self) -> bool {
        self.previous_track().is_some()
    }
}

/// Compute the playlist for `current_track_url` from an album listing.
///
/// Cover art and other non-audio objects are dropped. Tracks are ordered by
/// their filename segment compared as plain strings.
pub fn resolve(listing: &[String], current_track_url: Option<&str>) -> Playlist {
    let mut all: Vec<Track> = listing
        .iter()
        .filter(|locator| !is_cover_art(locator))
        .map(|locator| Track::from_url(locator.as_str()))
        .collect();
    all.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    all.dedup_by(|a, b| a.url == b.url);

    let Some(current_url) = current_track_url else {
        return Playlist {
            remaining: Vec::new(),
            all,
            current_key: None,
        };
    };

    let current_key = track_key(current_url);
    let remaining = all
        .iter()
        .filter(|track| track.sort_key() > current_key.as_str())
        .cloned()
        .collect();

    Playlist {
        remaining,
        all,
        current_key: Some(current_key),
    }
}

/// Runs playlist resolutions against the catalog, one generation at a time.
///
/// Loads are chained in the order they are issued: each one waits for the
/// load issued just before it, for at most the resolve timeout, before it
/// lists. A hung listing therefore delays only its direct successor.
#[derive(Clone)]
pub struct PlaylistLoader {
    catalog: TrackCatalog,
    generation: Arc<AtomicU64>,
    /// Completion signal of the most recently issued load
    latest: Arc<Mutex<Option<watch::Receiver<()>>>>,
    timeout: Duration,
}

impl PlaylistLoader {
    pub fn new(catalog: TrackCatalog, timeout: Duration) -> Self {
        PlaylistLoader {
            catalog,
            generation: Arc::new(AtomicU64::new(0)),
            latest: Arc::new(Mutex::new(None)),
            timeout,
        }
    }

    pub fn catalog(&self) -> &TrackCatalog {
        &self.catalog
    }

    /// Start a new generation, invalidating every load issued before it
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    /// Resolve the playlist for `token`.
    ///
    /// The load takes its place in the chain when this is called, not when
    /// the returned future is first polled. Resolves to `None` if a newer
    /// generation started before the result was ready. A listing failure
    /// resolves to an empty playlist.
    pub fn load(
        &self,
        token: u64,
        album: Option<AlbumRef>,
        current_track_url: Option<String>,
    ) -> impl Future<Output = Option<(Playlist, Option<Arc<Vec<String>>>)>> + Send + 'static {
        // Dropping the sender is the completion signal
        let (done_tx, done_rx) = watch::channel(());
        let previous = self.latest.lock().unwrap().replace(done_rx);
        let loader = self.clone();

        async move {
            let _done = done_tx;

            if let Some(previous) = previous {
                loader.wait_for(previous).await;
            }

            if !loader.is_current(token) {
                debug!("PlaylistLoader: Load {} superseded before listing", token);
                return None;
            }

            let Some(album) = album else {
                return Some((resolve(&[], current_track_url.as_deref()), None));
            };

            let listing = match loader.catalog.list_album(&album).await {
                Ok(listing) => Some(listing),
                Err(e) => {
                    warn!("PlaylistLoader: Could not list {}: {}", album, e);
                    None
                }
            };

            if !loader.is_current(token) {
                debug!("PlaylistLoader: Dropping stale result for load {}", token);
                return None;
            }

            let playlist = match &listing {
                Some(listing) => resolve(listing, current_track_url.as_deref()),
                None => Playlist::default(),
            };
            Some((playlist, listing))
        }
    }

    async fn wait_for(&self, mut previous: watch::Receiver<()>) {
        // Nothing is ever sent, so this returns once the sender is dropped
        if tokio::time::timeout(self.timeout, previous.changed())
            .await
            .is_err()
        {
            warn!(
                "PlaylistLoader: Previous load still running after {:?}, proceeding without it",
                self.timeout
            );
        }
    }
}

/// Navigation flags published to the transport UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub has_previous: bool,
    pub has_next: bool,
    pub remaining: Vec<Track>,
}

impl From<&Playlist> for Navigation {
    fn from(playlist: &Playlist) -> Self {
        Navigation {
            has_previous: playlist.has_previous(),
            has_next: playlist.has_next(),
            remaining: playlist.remaining.clone(),
        }
    }
}
