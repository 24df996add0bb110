use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CloudStorageError {
    #[error("S3 SDK error: {0}")]
    SdkError(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// S3 configuration for the music bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    /// Access keys; both absent means the bucket is read anonymously
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>, // For MinIO/S3-compatible services
}

impl S3Config {
    pub fn validate(&self) -> Result<(), CloudStorageError> {
        if self.bucket_name.trim().is_empty() {
            return Err(CloudStorageError::Config(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(CloudStorageError::Config(
                "Region cannot be empty".to_string(),
            ));
        }
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) if id.trim().is_empty() || secret.trim().is_empty() => {
                Err(CloudStorageError::Config(
                    "Access keys cannot be empty".to_string(),
                ))
            }
            (Some(_), None) | (None, Some(_)) => Err(CloudStorageError::Config(
                "Access key ID and secret access key must be set together".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Public URL under which the bucket's objects are served
    pub fn default_base_url(&self) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket_name),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.bucket_name, self.region
            ),
        }
    }
}

/// Trait for cloud storage operations (allows mocking for tests)
#[async_trait::async_trait]
pub trait CloudStorage: Send + Sync {
    /// List every object key under `prefix`
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError>;
}

/// Production S3 cloud storage implementation
pub struct S3CloudStorage {
    client: Client,
    bucket_name: String,
}

impl S3CloudStorage {
    /// Create a new S3 cloud storage client
    pub async fn new(config: S3Config) -> Result<Self, CloudStorageError> {
        config.validate()?;

        let mut aws_config_builder =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region));

        aws_config_builder = match (config.access_key_id, config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                let credentials = Credentials::new(
                    access_key_id,
                    secret_access_key,
                    None, // session_token
                    None, // expiration
                    "bucketdeck-s3-config",
                );
                aws_config_builder.credentials_provider(credentials)
            }
            _ => aws_config_builder.no_credentials(),
        };

        // Set custom endpoint if provided (for S3-compatible services)
        let path_style = config.endpoint_url.is_some();
        if let Some(endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(path_style)
            .build();
        let client = Client::from_conf(s3_config);

        info!("S3CloudStorage: Using bucket {}", config.bucket_name);

        Ok(S3CloudStorage {
            client,
            bucket_name: config.bucket_name,
        })
    }
}

#[async_trait::async_trait]
impl CloudStorage for S3CloudStorage {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, CloudStorageError> {
        debug!("S3CloudStorage: Listing objects under {}", prefix);

        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| CloudStorageError::SdkError(format!("List objects failed: {}", e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(
            "S3CloudStorage: Listed {} objects under {}",
            keys.len(),
            prefix
        );
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            bucket_name: "music".to_string(),
            region: "eu-west-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
        }
    }

    #[test]
    fn test_anonymous_config_is_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let mut config = config();
        config.access_key_id = Some("AKIA".to_string());
        assert!(matches!(
            config.validate(),
            Err(CloudStorageError::Config(_))
        ));
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(
            config().default_base_url(),
            "https://music.s3.eu-west-1.amazonaws.com"
        );

        let mut minio = config();
        minio.endpoint_url = Some("http://localhost:9000/".to_string());
        assert_eq!(minio.default_base_url(), "http://localhost:9000/music");
    }
}
