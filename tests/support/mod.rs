#![allow(dead_code)]

use bucketdeck::catalog::TrackCatalog;
use bucketdeck::test_support::MockCloudStorage;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const BASE_URL: &str = "https://music.example.com";

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Locator of an album under the test base url
pub fn album_url(artist: &str, album: &str) -> String {
    format!("{}/{}/{}", BASE_URL, artist, album)
}

/// Locator of a file inside an album
pub fn track_url(artist: &str, album: &str, file: &str) -> String {
    format!("{}/{}", album_url(artist, album), file)
}

/// Listing prefix the catalog requests for an album
pub fn album_prefix(artist: &str, album: &str) -> String {
    format!("{}/{}/", artist, album)
}

/// Store `files` under `artist/album/`
pub fn add_album(storage: &MockCloudStorage, artist: &str, album: &str, files: &[&str]) {
    for file in files {
        storage.insert(&format!("{}/{}/{}", artist, album, file));
    }
}

pub fn catalog(storage: Arc<MockCloudStorage>) -> TrackCatalog {
    TrackCatalog::new(storage, BASE_URL)
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
