//! S3-compatible bucket access through the AWS SDK
//!
//! The NAS bridge writes to StorageGRID-style endpoints addressed by host and
//! port, so requests use path-style addressing. The client is async; a
//! private tokio runtime turns each call into a blocking one so the rest of
//! the pipeline stays synchronous.
//!
//! Keys are passed through exactly as the listing returns them. Entry names
//! may contain any byte a POSIX filename can, and a trailing `/` is a real
//! (empty) entry name, so no path normalization is applied.

use std::collections::HashMap;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;

use super::{ObjectDescriptor, ObjectMetadata, ObjectSource};
use crate::error::StorageError;

/// Connection parameters for an S3-compatible endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub access_id: String,
    pub access_secret: String,
    pub host: String,
    pub port: u16,
    pub is_secure: bool,
    pub region: String,
    pub bucket: String,
}

impl S3Config {
    /// Endpoint URL, e.g. `https://grid.example.com:8082`
    pub fn endpoint(&self) -> String {
        let scheme = if self.is_secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Bucket on an S3-compatible endpoint
pub struct S3Source {
    client: Client,
    runtime: Runtime,
    bucket: String,
}

impl std::fmt::Debug for S3Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Source")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Source {
    /// Build a client for `config`. No request is sent until the bucket is listed.
    pub fn connect(config: &S3Config) -> Result<Self, StorageError> {
        let endpoint = config.endpoint();
        tracing::debug!("Connecting to {} (bucket {})", endpoint, config.bucket);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Connection {
                message: "failed to start I/O runtime".to_string(),
                source: Some(Box::new(e)),
            })?;

        let credentials = Credentials::new(
            config.access_id.clone(),
            config.access_secret.clone(),
            None,
            None,
            "nsotree",
        );
        let sdk_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        // The SDK picks up its sleep and HTTP implementations from the ambient runtime.
        let client = {
            let _guard = runtime.enter();
            Client::from_conf(sdk_config)
        };

        Ok(Self {
            client,
            runtime,
            bucket: config.bucket.clone(),
        })
    }
}

impl ObjectSource for S3Source {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StorageError> {
        self.runtime.block_on(async {
            let mut objects = Vec::new();
            // The paginator follows continuation tokens until the last page.
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| StorageError::listing(&self.bucket, e))?;
                objects.extend(descriptors(page.contents()));
                tracing::debug!("Listed {} objects so far", objects.len());
            }

            Ok(objects)
        })
    }

    fn fetch_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        let head = self
            .runtime
            .block_on(
                self.client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send(),
            )
            .map_err(|e| StorageError::metadata(key, e))?;

        Ok(user_metadata(head.metadata()))
    }
}

/// Keys of one listing page, verbatim
fn descriptors(objects: &[Object]) -> impl Iterator<Item = ObjectDescriptor> + '_ {
    objects
        .iter()
        .filter_map(Object::key)
        .map(ObjectDescriptor::new)
}

/// `x-amz-meta-*` user metadata; the SDK has already stripped the prefix
fn user_metadata(metadata: Option<&HashMap<String, String>>) -> ObjectMetadata {
    metadata.into_iter().flatten().collect()
}
