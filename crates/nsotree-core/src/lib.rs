//! Directory tree reconstruction for NAS bridge buckets
//!
//! The bridge stores every directory entry as an object keyed
//! `<parent inode>/<entry name>` whose metadata names the inode the entry
//! points to. Reconstruction runs in two strictly sequential stages:
//!
//! 1. [`AdjacencyCollector`] scans the whole bucket and builds the flat
//!    [`AdjacencyMap`] (parent inode → entry name → child inode).
//! 2. [`TreeMaterializer`] expands that map from [`ROOT_INODE`] into one
//!    nested [`MaterializedTree`], expanding each inode at most once.

pub mod adjacency;
pub mod collect;
pub mod config;
pub mod error;
pub mod materialize;
pub mod output;
pub mod source;

pub use adjacency::{AdjacencyMap, Children};
pub use collect::{
    split_key, AdjacencyCollector, CollectProgress, CollectStage, CollectStats, Collection,
    CollectorConfig, ObjectRecord, RecordDisposition,
};
pub use config::Settings;
pub use error::{ConfigError, StorageError};
pub use materialize::{
    MaterializeStats, Materialized, MaterializedTree, Node, TreeMaterializer, ROOT_INODE,
};
pub use source::{
    MemorySource, ObjectDescriptor, ObjectMetadata, ObjectSource, S3Config, S3Source,
    MAPPED_INODE_FIELD, SCHEMA_OBJECT_TYPE_FIELD,
};

/// Outcome of a full bucket reconstruction
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub tree: MaterializedTree,
    pub collect_stats: CollectStats,
    pub materialize_stats: MaterializeStats,
}

/// Collect the bucket behind `source`, then materialize the tree from the root.
///
/// Materialization only starts once collection has fully succeeded.
pub fn reconstruct<S>(source: &S, config: CollectorConfig) -> Result<Reconstruction, StorageError>
where
    S: ObjectSource + ?Sized,
{
    reconstruct_with_progress(source, config, |_| {})
}

/// Same as [`reconstruct`], reporting collection progress to `progress`
pub fn reconstruct_with_progress<S, F>(
    source: &S,
    config: CollectorConfig,
    progress: F,
) -> Result<Reconstruction, StorageError>
where
    S: ObjectSource + ?Sized,
    F: Fn(CollectProgress) + Send + Sync,
{
    let mut collector = AdjacencyCollector::with_config(source, config);
    collector.set_progress_callback(progress);
    let collection = collector.collect()?;

    let materialized = TreeMaterializer::new(&collection.adjacency).materialize();

    Ok(Reconstruction {
        tree: materialized.tree,
        collect_stats: collection.stats,
        materialize_stats: materialized.stats,
    })
}
