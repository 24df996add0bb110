// # Track Catalog
//
// Resolves an album to the locators stored under its prefix. Each album is
// listed at most once for the lifetime of the catalog: concurrent callers
// share one in-flight listing, later callers get its settled result.
// Album contents are treated as immutable, so entries are never evicted
// unless the owner asks for it with `forget`.

use crate::cloud_storage::{CloudStorage, CloudStorageError};
use crate::locator::{key_to_url, AlbumRef};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Listing failed: {0}")]
    Listing(Arc<CloudStorageError>),
    #[error("Album {0} is not under the catalog base url")]
    ForeignAlbum(String),
}

/// Locators of every object stored under an album
pub type AlbumListing = Arc<Vec<String>>;

type ListingFuture = Shared<BoxFuture<'static, Result<AlbumListing, CatalogError>>>;

/// Single-flight listing cache over a bucket
#[derive(Clone)]
pub struct TrackCatalog {
    storage: Arc<dyn CloudStorage>,
    base_url: Arc<str>,
    entries: Arc<Mutex<HashMap<AlbumRef, ListingFuture>>>,
}

impl std::fmt::Debug for TrackCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackCatalog")
            .field("storage", &"<dyn CloudStorage>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl TrackCatalog {
    pub fn new(storage: Arc<dyn CloudStorage>, base_url: &str) -> Self {
        TrackCatalog {
            storage,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the locators under `album`.
    ///
    /// The first call for an album starts the listing; every other call,
    /// concurrent or later, awaits the same result. Failures are cached too.
    pub async fn list_album(&self, album: &AlbumRef) -> Result<AlbumListing, CatalogError> {
        let listing = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(album) {
                Some(existing) => {
                    debug!("TrackCatalog: Reusing listing for {}", album);
                    existing.clone()
                }
                None => {
                    let listing = self.start_listing(album);
                    entries.insert(album.clone(), listing.clone());
                    listing
                }
            }
        };

        listing.await
    }

    /// Drop the cached listing for `album` so the next call lists it again
    pub fn forget(&self, album: &AlbumRef) {
        if self.entries.lock().unwrap().remove(album).is_some() {
            debug!("TrackCatalog: Forgot listing for {}", album);
        }
    }

    fn start_listing(&self, album: &AlbumRef) -> ListingFuture {
        let storage = self.storage.clone();
        let base_url = self.base_url.clone();
        let album = album.clone();

        async move {
            let prefix = album
                .key_prefix(&base_url)
                .ok_or_else(|| CatalogError::ForeignAlbum(album.to_string()))?;

            info!("TrackCatalog: Listing {}", prefix);

            let keys = storage
                .list_keys(&prefix)
                .await
                .map_err(|e| CatalogError::Listing(Arc::new(e)))?;

            let locators: Vec<String> = keys
                .iter()
                .map(|key| key_to_url(&base_url, key))
                .collect();

            Ok(Arc::new(locators))
        }
        .boxed()
        .shared()
    }
}
