//! Error types shared by the collector, the storage sources and the settings layer

use thiserror::Error;

/// Boxed error coming from a storage backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure talking to the storage endpoint.
///
/// Every variant is fatal to a run: the collector never hands a partial
/// adjacency map to the materializer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to storage endpoint: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("failed to list objects in bucket `{bucket}`")]
    Listing {
        bucket: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to fetch metadata for object `{key}`")]
    Metadata {
        key: String,
        #[source]
        source: BoxError,
    },
}

impl StorageError {
    pub fn listing(bucket: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Listing {
            bucket: bucket.into(),
            source: source.into(),
        }
    }

    pub fn metadata(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::Metadata {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Invalid or incomplete settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "a bucket must be specified; this value should be the bucket configured for the NAS Bridge"
    )]
    MissingBucket,

    #[error("an S3 endpoint host must be specified")]
    MissingHost,

    #[error("S3 credentials are incomplete: both access id and access secret are required")]
    MissingCredentials,

    #[error("invalid port: {0}")]
    InvalidPort(u16),
}
