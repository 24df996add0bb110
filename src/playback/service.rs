use crate::catalog::{AlbumListing, TrackCatalog};
use crate::config::PlayerSettings;
use crate::locator::AlbumRef;
use crate::media_controls::position_state;
use crate::playback::output::{AudioOutput, OutputEvent, PlaybackError};
use crate::playback::preload::{should_preload, Preloader};
use crate::playback::progress::{
    PlaybackChange, PlaybackProgress, PlaybackProgressHandle, ProgressFilter,
};
use crate::playlist::{resolve, Navigation, Playlist, PlaylistLoader};
use std::sync::Arc;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Playback commands sent to the service
#[derive(Debug)]
pub enum PlaybackCommand {
    SetTrack(String),
    ClearTrack,
    SetPlaying(bool),
    TogglePlaying,
    SetAlbum(Option<String>),
    /// Play/pause/switch dispatch used by the transport buttons and track rows
    Toggle(Option<String>),
    Next,
    Previous,
    SeekTo(f64),
    SeekBy(f64),
    GetState(oneshot::Sender<PlaybackSnapshot>),
    Detach(oneshot::Sender<()>),
}

/// Current playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Paused,
    Playing,
}

/// Point-in-time view of the controller, returned by `PlaybackHandle::state`
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_track: Option<String>,
    pub is_playing: bool,
    pub album: Option<AlbumRef>,
    pub navigation: Navigation,
    pub position: f64,
    pub duration: f64,
}

/// Handle to the playback service for sending commands
#[derive(Clone)]
pub struct PlaybackHandle {
    command_tx: tokio_mpsc::UnboundedSender<PlaybackCommand>,
    progress_handle: PlaybackProgressHandle,
}

impl PlaybackHandle {
    pub fn set_track(&self, url: String) {
        let _ = self.command_tx.send(PlaybackCommand::SetTrack(url));
    }

    pub fn clear_track(&self) {
        let _ = self.command_tx.send(PlaybackCommand::ClearTrack);
    }

    pub fn set_playing(&self, playing: bool) {
        let _ = self.command_tx.send(PlaybackCommand::SetPlaying(playing));
    }

    pub fn toggle_playing(&self) {
        let _ = self.command_tx.send(PlaybackCommand::TogglePlaying);
    }

    pub fn set_album(&self, album_url: Option<String>) {
        let _ = self.command_tx.send(PlaybackCommand::SetAlbum(album_url));
    }

    pub fn toggle(&self, track_url: Option<String>) {
        let _ = self.command_tx.send(PlaybackCommand::Toggle(track_url));
    }

    pub fn next(&self) {
        let _ = self.command_tx.send(PlaybackCommand::Next);
    }

    pub fn previous(&self) {
        let _ = self.command_tx.send(PlaybackCommand::Previous);
    }

    pub fn seek_to(&self, seconds: f64) {
        let _ = self.command_tx.send(PlaybackCommand::SeekTo(seconds));
    }

    pub fn seek_by(&self, offset_seconds: f64) {
        let _ = self.command_tx.send(PlaybackCommand::SeekBy(offset_seconds));
    }

    /// Current state, or `None` once the service has stopped
    pub async fn state(&self) -> Option<PlaybackSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(PlaybackCommand::GetState(tx)).ok()?;
        rx.await.ok()
    }

    /// Tear down the output and stop the service
    pub async fn detach(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(PlaybackCommand::Detach(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn subscribe_progress(&self) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress_handle.subscribe_all()
    }

    /// Subscribe to the updates `filter` accepts; `Detached` is always delivered
    pub fn subscribe_progress_where(
        &self,
        filter: ProgressFilter,
    ) -> tokio_mpsc::UnboundedReceiver<PlaybackProgress> {
        self.progress_handle.subscribe_where(filter)
    }
}

/// Result of a playlist load, tagged with the generation that issued it
struct PlaylistLoaded {
    token: u64,
    playlist: Playlist,
    listing: Option<(AlbumRef, AlbumListing)>,
}

/// Playback service that owns the audio output and every playback transition
pub struct PlaybackService {
    loader: PlaylistLoader,
    preloader: Arc<dyn Preloader>,
    settings: PlayerSettings,
    command_rx: tokio_mpsc::UnboundedReceiver<PlaybackCommand>,
    output_rx: tokio_mpsc::UnboundedReceiver<OutputEvent>,
    playlist_tx: tokio_mpsc::UnboundedSender<PlaylistLoaded>,
    playlist_rx: tokio_mpsc::UnboundedReceiver<PlaylistLoaded>,
    progress_tx: tokio_mpsc::UnboundedSender<PlaybackProgress>,
    output: Option<Box<dyn AudioOutput>>,
    current_track: Option<String>,
    is_playing: bool,
    album: Option<AlbumRef>,
    playlist: Playlist,
    /// Listing behind `playlist`, reused when the track changes within the album
    listing: Option<(AlbumRef, AlbumListing)>,
    navigation: Navigation,
    preloaded: bool,
}

impl PlaybackService {
    /// Start the service on its own thread.
    ///
    /// The output is created by `output_factory` on that thread, since
    /// platform audio streams cannot move between threads. It lives until
    /// the handle detaches or every handle is dropped.
    pub fn start<F>(
        catalog: TrackCatalog,
        preloader: Arc<dyn Preloader>,
        settings: PlayerSettings,
        output_factory: F,
        runtime_handle: tokio::runtime::Handle,
    ) -> PlaybackHandle
    where
        F: FnOnce() -> Result<Box<dyn AudioOutput>, PlaybackError> + Send + 'static,
    {
        let (command_tx, command_rx) = tokio_mpsc::unbounded_channel();
        let (progress_tx, progress_rx) = tokio_mpsc::unbounded_channel();

        let progress_handle = PlaybackProgressHandle::new(progress_rx, runtime_handle);

        let handle = PlaybackHandle {
            command_tx,
            progress_handle,
        };

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create playback runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async move {
                let mut output = match output_factory() {
                    Ok(output) => output,
                    Err(e) => {
                        error!("Failed to initialize audio output: {}", e);
                        return;
                    }
                };

                let (output_tx, output_rx) = tokio_mpsc::unbounded_channel();
                output.subscribe(output_tx);

                let (playlist_tx, playlist_rx) = tokio_mpsc::unbounded_channel();

                let mut service = PlaybackService {
                    loader: PlaylistLoader::new(catalog, settings.resolve_timeout),
                    preloader,
                    settings,
                    command_rx,
                    output_rx,
                    playlist_tx,
                    playlist_rx,
                    progress_tx,
                    output: Some(output),
                    current_track: None,
                    is_playing: false,
                    album: None,
                    playlist: Playlist::default(),
                    listing: None,
                    navigation: Navigation::default(),
                    preloaded: false,
                };

                service.run().await;
            });
        });

        handle
    }

    async fn run(&mut self) {
        info!("PlaybackService started");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        // Every handle is gone
                        self.detach();
                        break;
                    }
                },
                Some(event) = self.output_rx.recv() => {
                    self.handle_output_event(event).await;
                }
                Some(loaded) = self.playlist_rx.recv() => {
                    self.apply_playlist(loaded);
                }
            }
        }

        info!("PlaybackService stopped");
    }

    /// Returns false once the service should stop
    async fn handle_command(&mut self, command: PlaybackCommand) -> bool {
        match command {
            PlaybackCommand::SetTrack(url) => self.set_track(url).await,
            PlaybackCommand::ClearTrack => self.clear_track(),
            PlaybackCommand::SetPlaying(playing) => self.set_playing(playing).await,
            PlaybackCommand::TogglePlaying => {
                let playing = !self.is_playing;
                self.set_playing(playing).await;
            }
            PlaybackCommand::SetAlbum(album_url) => self.set_album(album_url.as_deref()),
            PlaybackCommand::Toggle(track_url) => self.toggle(track_url).await,
            PlaybackCommand::Next => self.next().await,
            PlaybackCommand::Previous => self.previous().await,
            PlaybackCommand::SeekTo(seconds) => self.seek_to(seconds),
            PlaybackCommand::SeekBy(offset) => self.seek_by(offset),
            PlaybackCommand::GetState(reply) => {
                let _ = reply.send(self.snapshot());
            }
            PlaybackCommand::Detach(reply) => {
                self.detach();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn set_track(&mut self, url: String) {
        if self.current_track.as_deref() == Some(url.as_str()) {
            debug!("Track already loaded: {}", url);
            return;
        }

        info!("Loading track: {}", url);

        if let Some(output) = self.output.as_mut() {
            output.set_source(&url);
        }
        self.current_track = Some(url);
        self.preloaded = false;
        self.refresh_playlist();

        if self.is_playing {
            self.start_output().await;
        }

        self.emit_change();
    }

    fn clear_track(&mut self) {
        info!("Clearing track");

        if let Some(output) = self.output.as_mut() {
            output.pause();
            output.clear_source();
        }
        self.current_track = None;
        self.is_playing = false;
        self.preloaded = false;
        self.refresh_playlist();
        self.emit_change();
    }

    async fn set_playing(&mut self, playing: bool) {
        if playing {
            if self.current_track.is_none() {
                debug!("Ignoring play: no track loaded");
                return;
            }
            if self.is_playing {
                return;
            }

            info!("Starting playback");
            self.is_playing = true;
            self.start_output().await;
        } else {
            if !self.is_playing {
                return;
            }

            info!("Pausing playback");
            if let Some(output) = self.output.as_mut() {
                output.pause();
            }
            self.is_playing = false;
        }

        self.emit_change();
    }

    /// Ask the output to play, reverting the playing flag if it refuses
    async fn start_output(&mut self) {
        let result = match self.output.as_mut() {
            Some(output) => output.play().await,
            None => Err(PlaybackError::NoSource),
        };

        if let Err(e) = result {
            warn!("Playback failed to start: {}", e);
            self.is_playing = false;
            let _ = self.progress_tx.send(PlaybackProgress::PlayRejected {
                track: self.current_track.clone().unwrap_or_default(),
                reason: e.to_string(),
            });
        }
    }

    fn set_album(&mut self, album_url: Option<&str>) {
        let album = album_url.map(AlbumRef::new);
        if album == self.album {
            return;
        }

        info!(
            "Album context: {}",
            album.as_ref().map(AlbumRef::as_str).unwrap_or("<none>")
        );
        self.album = album;
        self.preloaded = false;
        self.refresh_playlist();
    }

    async fn toggle(&mut self, track_url: Option<String>) {
        match track_url {
            Some(url) if self.current_track.as_deref() != Some(url.as_str()) => {
                // While playing, set_track already tried to start the new source
                let attempted = self.is_playing;
                self.set_track(url).await;
                if !attempted {
                    self.set_playing(true).await;
                }
            }
            Some(_) => {
                let playing = !self.is_playing;
                self.set_playing(playing).await;
            }
            None => self.clear_track(),
        }
    }

    async fn next(&mut self) {
        let Some(next) = self.playlist.next_track().map(|track| track.url.clone()) else {
            debug!("No next track");
            return;
        };
        self.toggle(Some(next)).await;
    }

    async fn previous(&mut self) {
        let Some(previous) = self
            .playlist
            .previous_track()
            .map(|track| track.url.clone())
        else {
            debug!("No previous track");
            return;
        };
        self.toggle(Some(previous)).await;
    }

    fn seek_to(&mut self, seconds: f64) {
        let Some(output) = self.output.as_mut() else {
            return;
        };

        let duration = output.duration();
        if !duration.is_finite() || !seconds.is_finite() {
            debug!("Ignoring seek to {}: duration {} not known", seconds, duration);
            return;
        }

        let position = seconds.clamp(0.0, duration);
        output.set_current_time(position);
        let _ = self.progress_tx.send(PlaybackProgress::Seeked { position });
    }

    fn seek_by(&mut self, offset: f64) {
        let Some(output) = self.output.as_ref() else {
            return;
        };
        let target = output.current_time() + offset;
        self.seek_to(target);
    }

    async fn handle_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::MetadataLoaded => self.report_position(),
            OutputEvent::TimeUpdate => {
                self.report_position();
                self.maybe_preload();
            }
            OutputEvent::Ended => self.on_track_ended().await,
            OutputEvent::Play | OutputEvent::Pause => {
                debug!("Output event: {:?}", event);
            }
        }
    }

    async fn on_track_ended(&mut self) {
        if self.playlist.has_next() {
            info!("Track ended, advancing");
            self.next().await;
            return;
        }

        info!("Track ended with nothing left to play");
        if self.is_playing {
            self.is_playing = false;
            self.emit_change();
        }
    }

    fn report_position(&mut self) {
        let Some(output) = self.output.as_ref() else {
            return;
        };

        let position = output.current_time();
        let duration = output.duration();
        let seekable_end = output.seekable_end();

        let _ = self
            .progress_tx
            .send(PlaybackProgress::PositionUpdate { position, duration });

        if let Some(state) = position_state(position, duration, seekable_end) {
            let _ = self.progress_tx.send(PlaybackProgress::PositionState(state));
        }
    }

    fn maybe_preload(&mut self) {
        if self.preloaded {
            return;
        }
        let Some(output) = self.output.as_ref() else {
            return;
        };
        if !should_preload(
            output.current_time(),
            output.duration(),
            self.settings.preload_threshold,
        ) {
            return;
        }

        if let Some(next) = self.playlist.next_track() {
            info!("Preloading next track: {}", next.url);
            self.preloaded = true;
            self.preloader.preload(&next.url);
        }
    }

    /// Invalidate in-flight loads and schedule one for the current pair.
    ///
    /// If the album's listing is already held, the playlist is recomputed
    /// from it right away so navigation stays available while reloading.
    fn refresh_playlist(&mut self) {
        let token = self.loader.begin();

        self.playlist = match (&self.listing, &self.album) {
            (Some((listed, listing)), Some(album)) if listed == album => {
                resolve(listing, self.current_track.as_deref())
            }
            _ => Playlist::default(),
        };
        self.emit_navigation();

        if self.current_track.is_none() && self.album.is_none() {
            return;
        }

        let album = self.album.clone();
        let load = self
            .loader
            .load(token, album.clone(), self.current_track.clone());
        let playlist_tx = self.playlist_tx.clone();

        tokio::spawn(async move {
            if let Some((playlist, listing)) = load.await {
                let listing = album.zip(listing);
                let _ = playlist_tx.send(PlaylistLoaded {
                    token,
                    playlist,
                    listing,
                });
            }
        });
    }

    fn apply_playlist(&mut self, loaded: PlaylistLoaded) {
        if !self.loader.is_current(loaded.token) {
            debug!("Discarding stale playlist load {}", loaded.token);
            return;
        }

        debug!(
            "Playlist loaded: {} tracks, {} remaining",
            loaded.playlist.all.len(),
            loaded.playlist.remaining.len()
        );
        self.playlist = loaded.playlist;
        self.listing = loaded.listing;
        self.emit_navigation();
    }

    fn detach(&mut self) {
        info!("Detaching audio output");

        if let Some(mut output) = self.output.take() {
            output.unsubscribe();
            output.pause();
            output.clear_source();
        }
        self.loader.begin();
        self.current_track = None;
        self.is_playing = false;
        self.playlist = Playlist::default();
        self.listing = None;

        let _ = self.progress_tx.send(PlaybackProgress::Detached);
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let state = match (&self.current_track, self.is_playing) {
            (None, _) => PlaybackState::Idle,
            (Some(_), false) => PlaybackState::Paused,
            (Some(_), true) => PlaybackState::Playing,
        };

        let (position, duration) = match self.output.as_ref() {
            Some(output) => (output.current_time(), output.duration()),
            None => (0.0, f64::NAN),
        };

        PlaybackSnapshot {
            state,
            current_track: self.current_track.clone(),
            is_playing: self.is_playing,
            album: self.album.clone(),
            navigation: Navigation::from(&self.playlist),
            position,
            duration,
        }
    }

    fn emit_change(&self) {
        let _ = self
            .progress_tx
            .send(PlaybackProgress::Changed(PlaybackChange {
                current_track: self.current_track.clone(),
                is_playing: self.is_playing,
            }));
    }

    fn emit_navigation(&mut self) {
        let navigation = Navigation::from(&self.playlist);
        if navigation != self.navigation {
            self.navigation = navigation.clone();
            let _ = self
                .progress_tx
                .send(PlaybackProgress::NavigationChanged(navigation));
        }
    }
}
