use bucketdeck::cache::{AudioCache, CacheConfig};
use bucketdeck::catalog::TrackCatalog;
use bucketdeck::cloud_storage::S3CloudStorage;
use bucketdeck::config::Config;
use bucketdeck::locator::AlbumRef;
use bucketdeck::media_controls::{
    dispatch_media_action, MediaAction, MediaSession, MediaSessionBridge, SouvlakiMediaSession,
};
use bucketdeck::playback::element::{ALBUM_URL, CURRENT_TRACK_URL, IS_PLAYING};
use bucketdeck::playback::{
    AudioOutput, CpalAudioOutput, HostEvent, HttpPreloader, PlaybackHandle, PlaybackProgress,
    PlaybackService, PlayerElement,
};
use bucketdeck::playlist::resolve;
use serde_json::json;
use std::env;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{error, info, warn};

enum Command {
    List {
        album_url: String,
    },
    Play {
        track_url: String,
        album_url: Option<String>,
    },
}

fn main() {
    // Use RUST_LOG env var if set, otherwise default to info
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage(&args[0]);
            std::process::exit(1);
        }
    };

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = match command {
        Command::List { album_url } => runtime.block_on(list(&config, &album_url)),
        Command::Play {
            track_url,
            album_url,
        } => play(&runtime, &config, track_url, album_url),
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.get(1).map(String::as_str) {
        Some("list") => {
            let album_url = args.get(2).ok_or("list requires an album url")?;
            Ok(Command::List {
                album_url: album_url.clone(),
            })
        }
        Some("play") => {
            let track_url = args.get(2).ok_or("play requires a track url")?.clone();
            let mut album_url = None;

            let mut i = 3;
            while i < args.len() {
                match args[i].as_str() {
                    "--album" => {
                        let value = args.get(i + 1).ok_or("--album requires an album url")?;
                        album_url = Some(value.clone());
                        i += 2;
                    }
                    other => return Err(format!("Unknown argument: {}", other)),
                }
            }

            Ok(Command::Play {
                track_url,
                album_url,
            })
        }
        Some(other) => Err(format!("Unknown command: {}", other)),
        None => Err("Missing command".to_string()),
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!("  {} list <album-url>", program);
    eprintln!("  {} play <track-url> [--album <album-url>]", program);
    eprintln!();
    eprintln!("While playing, stdin accepts:");
    eprintln!("  toggle | next | prev | seek <secs> | fwd | back | stop | state | quit");
}

async fn catalog(config: &Config) -> Result<TrackCatalog, String> {
    let storage = S3CloudStorage::new(config.s3.clone())
        .await
        .map_err(|e| format!("Failed to connect to bucket: {}", e))?;
    Ok(TrackCatalog::new(Arc::new(storage), &config.base_url))
}

async fn list(config: &Config, album_url: &str) -> Result<(), String> {
    let catalog = catalog(config).await?;
    let album = AlbumRef::new(album_url);
    let listing = catalog
        .list_album(&album)
        .await
        .map_err(|e| format!("Failed to list {}: {}", album, e))?;

    let playlist = resolve(&listing, None);
    if playlist.all.is_empty() {
        println!("No tracks under {}", album);
        return Ok(());
    }

    for track in &playlist.all {
        let number = track
            .number
            .map(|n| format!("{:02}", n))
            .unwrap_or_else(|| "--".to_string());
        println!("{}  {}  {}", number, track.title, track.url);
    }
    Ok(())
}

fn play(
    runtime: &tokio::runtime::Runtime,
    config: &Config,
    track_url: String,
    album_url: Option<String>,
) -> Result<(), String> {
    let catalog = runtime.block_on(catalog(config))?;

    let cache = AudioCache::new(CacheConfig {
        max_size_bytes: config.player.cache_max_bytes,
        ..CacheConfig::default()
    });
    let client = reqwest::Client::new();
    let preloader = Arc::new(HttpPreloader::new(client.clone(), cache.clone()));

    let handle = PlaybackService::start(
        catalog,
        preloader,
        config.player.clone(),
        move || {
            CpalAudioOutput::new(client, cache).map(|output| Box::new(output) as Box<dyn AudioOutput>)
        },
        runtime.handle().clone(),
    );

    // OS media controls are best effort
    match SouvlakiMediaSession::new(handle.clone(), config.player.media_seek_offset) {
        Ok(session) => {
            let session: Arc<std::sync::Mutex<dyn MediaSession>> =
                Arc::new(std::sync::Mutex::new(session));
            MediaSessionBridge::spawn(&handle, session, runtime.handle());
        }
        Err(e) => warn!("Media controls unavailable: {:?}", e),
    }

    let element = Arc::new(tokio::sync::Mutex::new(PlayerElement::new(
        handle.clone(),
        config.player.keyboard_seek_step,
    )));
    spawn_printer(&handle, element.clone(), runtime);

    let album_url = album_url.or_else(|| {
        AlbumRef::from_track_url(&track_url).map(|album| album.as_str().to_string())
    });

    {
        let mut element = element.blocking_lock();
        if let Some(album_url) = &album_url {
            element.set_attribute(ALBUM_URL, album_url);
        }
        element.set_attribute(CURRENT_TRACK_URL, &track_url);
        element.set_attribute(IS_PLAYING, "true");
    }

    for line in std::io::stdin().lock().lines() {
        let line = line.map_err(|e| format!("Failed to read stdin: {}", e))?;
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            continue;
        };

        match word {
            "toggle" => {
                let mut element = element.blocking_lock();
                let current = element.attribute(CURRENT_TRACK_URL).map(str::to_string);
                element.dispatch(HostEvent::PlayToggle(current));
            }
            "next" => element.blocking_lock().dispatch(HostEvent::PlayNext),
            "prev" => element.blocking_lock().dispatch(HostEvent::PlayPrev),
            "seek" => match words.next().map(str::parse::<f64>) {
                Some(Ok(time)) => element.blocking_lock().dispatch(HostEvent::Seek { time }),
                _ => eprintln!("seek requires a number of seconds"),
            },
            "fwd" => dispatch_media_action(
                &handle,
                MediaAction::SeekForward(None),
                config.player.media_seek_offset,
            ),
            "back" => dispatch_media_action(
                &handle,
                MediaAction::SeekBackward(None),
                config.player.media_seek_offset,
            ),
            "stop" => element.blocking_lock().remove_attribute(CURRENT_TRACK_URL),
            "state" => print_state(runtime, &handle),
            "quit" => break,
            other => eprintln!("Unknown command: {}", other),
        }
    }

    info!("Shutting down");
    runtime.block_on(async {
        element.lock().await.disconnect().await;
    });
    Ok(())
}

/// Print committed transitions as JSON lines
fn spawn_printer(
    handle: &PlaybackHandle,
    element: Arc<tokio::sync::Mutex<PlayerElement>>,
    runtime: &tokio::runtime::Runtime,
) {
    let mut progress_rx = handle.subscribe_progress_where(|progress| !progress.is_tick());

    runtime.spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            let change = element.lock().await.apply(&progress);

            let line = match (&progress, change) {
                (_, Some(change)) => json!({ "event": "change", "detail": change }),
                (PlaybackProgress::NavigationChanged(navigation), _) => {
                    json!({ "event": "navigation", "detail": navigation })
                }
                (PlaybackProgress::Seeked { position }, _) => {
                    json!({ "event": "seeked", "detail": { "position": position } })
                }
                (PlaybackProgress::PlayRejected { track, reason }, _) => {
                    json!({ "event": "play-rejected", "detail": { "track": track, "reason": reason } })
                }
                (PlaybackProgress::Detached, _) => json!({ "event": "detached" }),
                _ => continue,
            };

            println!("{}", line);
        }
    });
}

fn print_state(runtime: &tokio::runtime::Runtime, handle: &PlaybackHandle) {
    let Some(snapshot) = runtime.block_on(handle.state()) else {
        eprintln!("Player has stopped");
        return;
    };

    let line = json!({
        "event": "state",
        "detail": {
            "state": format!("{:?}", snapshot.state),
            "currentTrack": snapshot.current_track,
            "isPlaying": snapshot.is_playing,
            "album": snapshot.album.as_ref().map(AlbumRef::as_str),
            "navigation": snapshot.navigation,
            "position": snapshot.position,
            // NaN and infinity have no JSON form
            "duration": snapshot.duration.is_finite().then_some(snapshot.duration),
        }
    });
    println!("{}", line);
}
