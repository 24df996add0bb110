// Library exports for the player binary and integration tests

pub mod cache;
pub mod catalog;
pub mod cloud_storage;
pub mod config;
pub mod locator;
pub mod media_controls;
pub mod playback;
pub mod playlist;

// Test support (only available with test-utils feature)
#[cfg(feature = "test-utils")]
pub mod test_support;
