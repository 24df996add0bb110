use crate::cloud_storage::S3Config;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_CACHE_MAX_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
}

/// Controller tunables
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerSettings {
    /// Remaining time at which the next track is preloaded
    pub preload_threshold: Duration,
    /// Longest a playlist load waits behind the previous one
    pub resolve_timeout: Duration,
    /// Arrow-key step of the progress indicator, in seconds
    pub keyboard_seek_step: f64,
    /// Seek-forward/backward offset when the platform gives none, in seconds
    pub media_seek_offset: f64,
    pub cache_max_bytes: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        PlayerSettings {
            preload_threshold: Duration::from_secs(20),
            resolve_timeout: Duration::from_secs(10),
            keyboard_seek_step: 5.0,
            media_seek_offset: 10.0,
            cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
        }
    }
}

/// Application configuration
/// In debug builds: loads a .env file first, then reads the environment
#[derive(Clone, Debug)]
pub struct Config {
    pub s3: S3Config,
    /// Public base url objects are fetched from
    pub base_url: String,
    pub player: PlayerSettings,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                info!("Config: Dev mode activated - loaded .env file");
            } else {
                info!("Config: No .env file found, using environment");
            }
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from a variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bucket_name = var("BUCKETDECK_S3_BUCKET").ok_or(ConfigError::Missing("BUCKETDECK_S3_BUCKET"))?;
        let region = var("BUCKETDECK_S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint_url = var("BUCKETDECK_S3_ENDPOINT");

        let access_key_id = var("BUCKETDECK_S3_ACCESS_KEY_ID");
        let secret_access_key = var("BUCKETDECK_S3_SECRET_ACCESS_KEY");
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(ConfigError::Incomplete(
                "BUCKETDECK_S3_ACCESS_KEY_ID",
                "BUCKETDECK_S3_SECRET_ACCESS_KEY",
            ));
        }

        let s3 = S3Config {
            bucket_name,
            region,
            access_key_id,
            secret_access_key,
            endpoint_url,
        };

        let base_url = var("BUCKETDECK_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| s3.default_base_url());

        let defaults = PlayerSettings::default();
        let player = PlayerSettings {
            preload_threshold: parse_secs(&var, "BUCKETDECK_PRELOAD_THRESHOLD_SECS")?
                .unwrap_or(defaults.preload_threshold),
            resolve_timeout: parse_secs(&var, "BUCKETDECK_RESOLVE_TIMEOUT_SECS")?
                .unwrap_or(defaults.resolve_timeout),
            cache_max_bytes: match var("BUCKETDECK_CACHE_MAX_BYTES") {
                Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "BUCKETDECK_CACHE_MAX_BYTES",
                    value,
                })?,
                None => defaults.cache_max_bytes,
            },
            ..defaults
        };

        info!("Config: Bucket {} at {}", s3.bucket_name, base_url);

        Ok(Config {
            s3,
            base_url,
            player,
        })
    }
}

fn parse_secs<F>(var: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = var(name) else {
        return Ok(None);
    };

    match value.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
