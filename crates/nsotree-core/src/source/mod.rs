//! Storage sources the adjacency collector can scan
//!
//! A source only needs two capabilities: an exhaustive listing of the bucket
//! and a per-key metadata lookup. Everything else about the connection
//! (credentials, retries, pagination) stays inside the backend.

mod memory;
mod s3;

pub use memory::MemorySource;
pub use s3::{S3Config, S3Source};

use std::collections::HashMap;

use crate::error::StorageError;

/// Metadata field holding the inode an entry object points to
pub const MAPPED_INODE_FIELD: &str = "fs-mapped-inode";

/// Metadata field discriminating inode, superblock and entry objects
pub const SCHEMA_OBJECT_TYPE_FIELD: &str = "fs-schema-object-type";

/// Single object returned by a bucket listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Full storage key (`<parent inode>/<entry name>[/...]`), exactly as listed
    pub key: String,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// User metadata attached to one object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    fields: HashMap<String, String>,
}

impl ObjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ObjectMetadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Bucket the adjacency collector reads from.
///
/// Both calls are fallible and both failures abort collection. Implementations
/// must be `Sync` so metadata can be fetched from several threads at once.
pub trait ObjectSource: Sync {
    /// Name of the bucket being scanned
    fn bucket(&self) -> &str;

    /// List every object in the bucket, draining all pages
    fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StorageError>;

    /// Fetch the user metadata of one object
    fn fetch_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_lookup() {
        let metadata: ObjectMetadata = [
            (MAPPED_INODE_FIELD, "42"),
            (SCHEMA_OBJECT_TYPE_FIELD, "file"),
        ]
        .into_iter()
        .collect();

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get(MAPPED_INODE_FIELD), Some("42"));
        assert_eq!(metadata.get("fs-unknown"), None);
    }
}
