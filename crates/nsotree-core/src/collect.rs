//! Adjacency collection: one pass over the bucket, one fact per entry object
//!
//! Every object key written by the NAS bridge has the shape
//! `<parent inode>/<entry name>[/...]`, and entry objects carry the inode they
//! point to in their user metadata. Inode and superblock objects share the same
//! key space but describe the inodes themselves, so they are filtered out.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::adjacency::AdjacencyMap;
use crate::error::StorageError;
use crate::source::{
    ObjectDescriptor, ObjectMetadata, ObjectSource, MAPPED_INODE_FIELD, SCHEMA_OBJECT_TYPE_FIELD,
};

/// Representation the bridge uses for a missing `fs-mapped-inode`
const ABSENT_INODE: &str = "None";

/// Collector configuration
#[derive(Debug, Clone, Default)]
pub struct CollectorConfig {
    /// Fetch object metadata on the rayon pool instead of one key at a time
    pub parallel: bool,
}

/// One object as seen by the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub key: String,
    pub mapped_inode: Option<String>,
    pub schema_object_type: Option<String>,
}

/// Why a record did or did not make it into the adjacency map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    /// Entry object with a mapped inode
    Entry,
    /// `inode` or `superblock` object
    Structural,
    /// No mapped inode
    Unmapped,
}

impl ObjectRecord {
    pub fn from_metadata(key: impl Into<String>, metadata: &ObjectMetadata) -> Self {
        let mapped_inode = metadata
            .get(MAPPED_INODE_FIELD)
            .filter(|inode| *inode != ABSENT_INODE)
            .map(str::to_string);

        Self {
            key: key.into(),
            mapped_inode,
            schema_object_type: metadata.get(SCHEMA_OBJECT_TYPE_FIELD).map(str::to_string),
        }
    }

    pub fn disposition(&self) -> RecordDisposition {
        match self.schema_object_type.as_deref() {
            Some("inode") | Some("superblock") => RecordDisposition::Structural,
            _ if self.mapped_inode.is_none() => RecordDisposition::Unmapped,
            _ => RecordDisposition::Entry,
        }
    }
}

/// Split a storage key into its parent inode id and entry name.
///
/// Segments past the second are ignored. Returns `None` for keys that have no
/// entry-name segment at all.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut segments = key.split('/');
    let parent = segments.next()?;
    let name = segments.next()?;
    Some((parent, name))
}

/// Counters describing one collection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Objects returned by the bucket listing
    pub objects_listed: usize,
    /// Objects whose metadata was fetched
    pub objects_inspected: usize,
    /// Facts written to the adjacency map
    pub entries_recorded: usize,
    /// Facts that replaced an earlier fact for the same (parent, name)
    pub entries_replaced: usize,
    /// Inode and superblock objects
    pub skipped_structural: usize,
    /// Objects without a mapped inode
    pub skipped_unmapped: usize,
    /// Keys without an entry-name segment
    pub skipped_malformed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectStage {
    Listing,
    Inspecting,
    Complete,
}

#[derive(Debug, Clone)]
pub struct CollectProgress {
    pub stage: CollectStage,
    pub inspected: usize,
    pub total: usize,
}

/// Result of a full collection pass
#[derive(Debug, Clone)]
pub struct Collection {
    pub adjacency: AdjacencyMap,
    pub stats: CollectStats,
}

/// Scans a bucket and builds its adjacency map
pub struct AdjacencyCollector<'a, S: ObjectSource + ?Sized> {
    source: &'a S,
    config: CollectorConfig,
    progress_callback: Option<Box<dyn Fn(CollectProgress) + Send + Sync + 'a>>,
}

/// Outcome of inspecting one listed object
enum Inspection {
    Malformed,
    Record {
        parent: String,
        name: String,
        record: ObjectRecord,
    },
}

impl<'a, S: ObjectSource + ?Sized> AdjacencyCollector<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self::with_config(source, CollectorConfig::default())
    }

    pub fn with_config(source: &'a S, config: CollectorConfig) -> Self {
        Self {
            source,
            config,
            progress_callback: None,
        }
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(CollectProgress) + Send + Sync + 'a,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    /// Run the collection to completion.
    ///
    /// Any storage failure aborts the pass; no partial map is returned.
    pub fn collect(&self) -> Result<Collection, StorageError> {
        tracing::info!("Collecting information from bucket {}.", self.source.bucket());

        self.emit_progress(CollectStage::Listing, 0, 0);
        let objects = self.source.list_objects()?;
        let total = objects.len();
        tracing::debug!("Listed {} objects", total);

        let inspected = AtomicUsize::new(0);
        let inspect = |object: &ObjectDescriptor| {
            let result = self.inspect(object);
            let done = inspected.fetch_add(1, Ordering::Relaxed) + 1;
            self.emit_progress(CollectStage::Inspecting, done, total);
            result
        };

        // Facts are merged in listing order whichever way they were fetched.
        let inspections: Vec<Inspection> = if self.config.parallel {
            objects.par_iter().map(inspect).collect::<Result<_, _>>()?
        } else {
            objects.iter().map(inspect).collect::<Result<_, _>>()?
        };

        let mut adjacency = AdjacencyMap::new();
        let mut stats = CollectStats {
            objects_listed: total,
            ..Default::default()
        };

        for inspection in inspections {
            let (parent, name, record) = match inspection {
                Inspection::Malformed => {
                    stats.skipped_malformed += 1;
                    continue;
                }
                Inspection::Record {
                    parent,
                    name,
                    record,
                } => (parent, name, record),
            };

            stats.objects_inspected += 1;

            match record.disposition() {
                RecordDisposition::Structural => stats.skipped_structural += 1,
                RecordDisposition::Unmapped => stats.skipped_unmapped += 1,
                RecordDisposition::Entry => {
                    if let Some(child) = record.mapped_inode {
                        if adjacency.insert(parent, name, child).is_some() {
                            stats.entries_replaced += 1;
                        }
                        stats.entries_recorded += 1;
                    }
                }
            }
        }

        self.emit_progress(CollectStage::Complete, total, total);

        tracing::info!(
            "Bucket information collection complete: {} objects, {} entries under {} parents",
            stats.objects_listed,
            adjacency.entry_count(),
            adjacency.len()
        );
        tracing::debug!(
            "Skipped {} inode/superblock objects, {} unmapped, {} malformed keys",
            stats.skipped_structural,
            stats.skipped_unmapped,
            stats.skipped_malformed
        );

        Ok(Collection { adjacency, stats })
    }

    fn inspect(&self, object: &ObjectDescriptor) -> Result<Inspection, StorageError> {
        tracing::debug!("Processing bucket item {}", object.key);

        let Some((parent, name)) = split_key(&object.key) else {
            tracing::warn!("Skipping object with no entry name in key: {}", object.key);
            return Ok(Inspection::Malformed);
        };

        let metadata = self.source.fetch_metadata(&object.key)?;

        Ok(Inspection::Record {
            parent: parent.to_string(),
            name: name.to_string(),
            record: ObjectRecord::from_metadata(object.key.as_str(), &metadata),
        })
    }

    fn emit_progress(&self, stage: CollectStage, inspected: usize, total: usize) {
        if let Some(ref callback) = self.progress_callback {
            callback(CollectProgress {
                stage,
                inspected,
                total,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::sync::Mutex;

    #[test]
    fn test_split_key_uses_first_two_segments() {
        assert_eq!(split_key("1/dirA"), Some(("1", "dirA")));
        assert_eq!(split_key("7/photo.jpg/extra/parts"), Some(("7", "photo.jpg")));
        assert_eq!(split_key("superblock"), None);
    }

    #[test]
    fn test_absent_inode_sentinel() {
        let metadata = ObjectMetadata::new()
            .with(MAPPED_INODE_FIELD, "None")
            .with(SCHEMA_OBJECT_TYPE_FIELD, "file");

        let record = ObjectRecord::from_metadata("1/a", &metadata);
        assert_eq!(record.mapped_inode, None);
        assert_eq!(record.disposition(), RecordDisposition::Unmapped);
    }

    #[test]
    fn test_disposition() {
        let record = |kind: Option<&str>, inode: Option<&str>| ObjectRecord {
            key: "1/a".to_string(),
            mapped_inode: inode.map(str::to_string),
            schema_object_type: kind.map(str::to_string),
        };

        use RecordDisposition::*;

        assert_eq!(record(Some("inode"), Some("2")).disposition(), Structural);
        assert_eq!(record(Some("superblock"), Some("2")).disposition(), Structural);
        assert_eq!(record(Some("file"), None).disposition(), Unmapped);
        assert_eq!(record(Some("dir"), Some("2")).disposition(), Entry);
        assert_eq!(record(None, Some("2")).disposition(), Entry);
    }

    #[test]
    fn test_malformed_keys_skip_metadata_fetch() {
        let mut source = MemorySource::new("bucket");
        source.insert_entry("superblock", "superblock", None);
        source.insert_entry("1/dirA", "dir", Some("2"));
        // Would abort the run if the collector tried to fetch it.
        source.fail_metadata_for("superblock");

        let collection = AdjacencyCollector::new(&source).collect().unwrap();

        assert_eq!(collection.stats.skipped_malformed, 1);
        assert_eq!(collection.stats.objects_inspected, 1);
        assert_eq!(collection.adjacency.entry_count(), 1);
    }

    #[test]
    fn test_later_fact_replaces_earlier_one() {
        // Both keys resolve to (1, "a"); "1/a/x" sorts after "1/a".
        let mut source = MemorySource::new("bucket");
        source.insert_entry("1/a", "file", Some("2"));
        source.insert_entry("1/a/x", "file", Some("3"));

        for parallel in [false, true] {
            let collection = AdjacencyCollector::with_config(&source, CollectorConfig { parallel })
                .collect()
                .unwrap();

            assert_eq!(collection.adjacency.children("1").unwrap()["a"], "3");
            assert_eq!(collection.adjacency.entry_count(), 1);
            assert_eq!(collection.stats.entries_recorded, 2);
            assert_eq!(collection.stats.entries_replaced, 1);
        }
    }

    #[test]
    fn test_entry_names_are_kept_verbatim() {
        let mut source = MemorySource::new("bucket");
        source.insert_entry("5/", "dir", Some("8"));
        source.insert_entry("7/report\tQ3.txt", "file", Some("9"));

        let collection = AdjacencyCollector::new(&source).collect().unwrap();

        assert_eq!(collection.adjacency.children("5").unwrap()[""], "8");
        assert_eq!(
            collection.adjacency.children("7").unwrap()["report\tQ3.txt"],
            "9"
        );
        assert_eq!(collection.stats.skipped_malformed, 0);
    }

    #[test]
    fn test_progress_reports_every_object() {
        let mut source = MemorySource::new("bucket");
        source.insert_entry("1/a", "dir", Some("2"));
        source.insert_entry("2/b", "file", Some("3"));

        let reports = Mutex::new(Vec::new());
        let mut collector = AdjacencyCollector::new(&source);
        collector.set_progress_callback(|p| {
            reports.lock().unwrap().push((p.stage, p.inspected));
        });
        collector.collect().unwrap();
        drop(collector);

        let reports = reports.into_inner().unwrap();
        assert_eq!(reports.first(), Some(&(CollectStage::Listing, 0)));
        assert_eq!(reports.last(), Some(&(CollectStage::Complete, 2)));
        assert_eq!(
            reports
                .iter()
                .filter(|(stage, _)| *stage == CollectStage::Inspecting)
                .count(),
            2
        );
    }
}
