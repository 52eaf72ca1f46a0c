//! In-memory bucket, used for tests and offline demos

use std::collections::{BTreeMap, HashSet};

use super::{
    ObjectDescriptor, ObjectMetadata, ObjectSource, MAPPED_INODE_FIELD, SCHEMA_OBJECT_TYPE_FIELD,
};
use crate::error::StorageError;

/// Bucket held entirely in memory.
///
/// Objects are listed in key order. Listing or per-key metadata failures can
/// be injected to exercise the collector's abort path.
#[derive(Debug, Default)]
pub struct MemorySource {
    bucket: String,
    objects: BTreeMap<String, ObjectMetadata>,
    fail_listing: bool,
    failing_keys: HashSet<String>,
}

impl MemorySource {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Store an object with arbitrary metadata
    pub fn insert(&mut self, key: impl Into<String>, metadata: ObjectMetadata) {
        self.objects.insert(key.into(), metadata);
    }

    /// Store a directory-entry object the way the NAS bridge writes it
    pub fn insert_entry(&mut self, key: &str, schema_object_type: &str, mapped_inode: Option<&str>) {
        let mut metadata =
            ObjectMetadata::new().with(SCHEMA_OBJECT_TYPE_FIELD, schema_object_type);
        if let Some(inode) = mapped_inode {
            metadata.insert(MAPPED_INODE_FIELD, inode);
        }
        self.insert(key, metadata);
    }

    /// Make every subsequent listing fail
    pub fn fail_listing(&mut self) {
        self.fail_listing = true;
    }

    /// Make metadata lookups for `key` fail
    pub fn fail_metadata_for(&mut self, key: impl Into<String>) {
        self.failing_keys.insert(key.into());
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectSource for MemorySource {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_objects(&self) -> Result<Vec<ObjectDescriptor>, StorageError> {
        if self.fail_listing {
            return Err(StorageError::listing(&self.bucket, "listing disabled"));
        }

        Ok(self.objects.keys().map(ObjectDescriptor::new).collect())
    }

    fn fetch_metadata(&self, key: &str) -> Result<ObjectMetadata, StorageError> {
        if self.failing_keys.contains(key) {
            return Err(StorageError::metadata(key, "metadata lookup disabled"));
        }

        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::metadata(key, "no such key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_is_sorted_by_key() {
        let mut source = MemorySource::new("bucket");
        source.insert_entry("2/b", "file", Some("4"));
        source.insert_entry("1/a", "dir", Some("2"));

        let keys: Vec<_> = source
            .list_objects()
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();

        assert_eq!(keys, vec!["1/a", "2/b"]);
    }

    #[test]
    fn test_injected_failures() {
        let mut source = MemorySource::new("bucket");
        source.insert_entry("1/a", "dir", Some("2"));
        source.fail_metadata_for("1/a");

        assert!(matches!(
            source.fetch_metadata("1/a"),
            Err(StorageError::Metadata { .. })
        ));

        source.fail_listing();
        assert!(matches!(
            source.list_objects(),
            Err(StorageError::Listing { .. })
        ));
    }
}
