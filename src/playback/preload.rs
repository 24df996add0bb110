use crate::cache::AudioCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Warms the cache for an upcoming track.
///
/// Fire-and-forget: implementations must not block and never report errors.
pub trait Preloader: Send + Sync {
    fn preload(&self, url: &str);
}

/// Whether playback is close enough to the end of the track to warm the next one
pub fn should_preload(position: f64, duration: f64, threshold: Duration) -> bool {
    duration.is_finite() && duration - position <= threshold.as_secs_f64()
}

/// Fetches upcoming tracks over HTTP into the shared audio cache
#[derive(Clone)]
pub struct HttpPreloader {
    client: reqwest::Client,
    cache: AudioCache,
}

impl HttpPreloader {
    pub fn new(client: reqwest::Client, cache: AudioCache) -> Self {
        HttpPreloader { client, cache }
    }
}

impl Preloader for HttpPreloader {
    fn preload(&self, url: &str) {
        let client = self.client.clone();
        let cache = self.cache.clone();
        let url = url.to_string();

        tokio::spawn(async move {
            if cache.contains(&url).await {
                debug!("Preload: {} already cached", url);
                return;
            }

            let response = match client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!("Preload: Request for {} failed: {}", url, e);
                    return;
                }
            };

            match response.error_for_status() {
                Ok(response) => match response.bytes().await {
                    Ok(body) => {
                        debug!("Preload: Warmed {} ({} bytes)", url, body.len());
                        cache.put(&url, Arc::new(body.to_vec())).await;
                    }
                    Err(e) => debug!("Preload: Reading {} failed: {}", url, e),
                },
                Err(e) => debug!("Preload: {} returned {}", url, e),
            }
        });
    }
}
