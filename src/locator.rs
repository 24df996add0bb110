// # Locators
//
// Tracks and albums are identified by the URL of their storage object:
// {base_url}/{artist}/{album}/{NN}__{name}.{ext}
//
// Everything here is pure string work. Parsing never fails; a locator that
// does not follow the convention yields blank display fields.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Suffixes of objects that live next to the audio but are not playable
const COVER_ART_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

fn track_filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{2,})__(.+?)(?:\.[^.]+)?$").expect("track filename pattern is valid")
    })
}

/// A playable track, identified by its locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub url: String,
    /// Ordinal parsed from the `NN__` filename prefix
    pub number: Option<u32>,
    /// Display title parsed from the filename, empty if it could not be parsed
    pub title: String,
    #[serde(skip)]
    key: String,
}

impl Track {
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = track_key(&url);

        let (number, title) = match track_filename_pattern().captures(&filename) {
            Some(caps) => (
                caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()),
                caps.get(2)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            ),
            None => (None, String::new()),
        };

        Track {
            url,
            number,
            title,
            key: filename,
        }
    }

    /// Key used to order tracks within an album.
    ///
    /// This is the percent-decoded trailing filename segment compared as a
    /// string, so "10__x" sorts before "2__y".
    pub fn sort_key(&self) -> &str {
        &self.key
    }
}

/// Artist and album names encoded in a track locator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackLocation {
    pub artist: String,
    pub album: String,
}

impl TrackLocation {
    pub fn from_url(url: &str) -> Self {
        let segments = path_segments(url);
        if segments.len() < 3 {
            return TrackLocation::default();
        }

        let n = segments.len();
        TrackLocation {
            artist: decode_segment(segments[n - 3]),
            album: decode_segment(segments[n - 2]),
        }
    }
}

/// An album, identified by the locator prefix its tracks share
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AlbumRef(String);

impl AlbumRef {
    /// Build from an `album-url` value
    pub fn new(album_url: &str) -> Self {
        AlbumRef(album_url.trim_end_matches('/').to_string())
    }

    /// Derive the album from a track locator by dropping its filename
    pub fn from_track_url(track_url: &str) -> Option<Self> {
        let trimmed = track_url.trim_end_matches('/');
        let (parent, _) = trimmed.rsplit_once('/')?;
        if parent.is_empty() || parent.ends_with(':') || parent.ends_with('/') {
            return None;
        }
        Some(AlbumRef(parent.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the album relative to `base_url`, with percent-encoding removed.
    ///
    /// Returns `None` when the album does not live under `base_url`.
    pub fn key_prefix(&self, base_url: &str) -> Option<String> {
        let base = base_url.trim_end_matches('/');
        let rest = self.0.strip_prefix(base)?.strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }
        let decoded: Vec<String> = rest.split('/').map(decode_segment).collect();
        Some(format!("{}/", decoded.join("/")))
    }
}

impl std::fmt::Display for AlbumRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build a locator for an object key under `base_url`
pub fn key_to_url(base_url: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base_url.trim_end_matches('/'), encoded.join("/"))
}

/// Whether a key or locator names something that is not a playable track
pub fn is_cover_art(key: &str) -> bool {
    if key.ends_with('/') {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    COVER_ART_SUFFIXES
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

/// Last path segment of a locator, still percent-encoded
pub fn file_name(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

/// Filename segment of a locator with percent-encoding removed.
///
/// Catalog locators are encoded while hosts may pass raw names, so both
/// sides of a comparison go through this.
pub fn track_key(url: &str) -> String {
    decode_segment(file_name(url))
}

fn path_segments(url: &str) -> Vec<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    };
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}
