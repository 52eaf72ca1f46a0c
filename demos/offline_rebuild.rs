//! Rebuild a directory tree from an in-memory NAS bridge bucket
//!
//! Run with: cargo run -p nsotree-core --example offline_rebuild

use nsotree_core::output::tree_to_json;
use nsotree_core::{reconstruct, CollectorConfig, MemorySource};

fn main() -> anyhow::Result<()> {
    let mut bucket = MemorySource::new("nas-bridge");

    // Entry objects: <parent inode>/<name> -> mapped inode
    bucket.insert_entry("1/projects", "directory", Some("2"));
    bucket.insert_entry("1/shared", "directory", Some("3"));
    bucket.insert_entry("2/report.pdf", "file", Some("20"));
    bucket.insert_entry("2/drafts", "directory", Some("4"));
    bucket.insert_entry("4/v1.docx", "file", Some("21"));
    // Hard link to the drafts directory from a second parent
    bucket.insert_entry("3/drafts-link", "directory", Some("4"));

    // Objects describing inodes themselves are ignored
    bucket.insert_entry("2/inode", "inode", Some("2"));
    bucket.insert_entry("0/superblock", "superblock", Some("1"));

    println!("Scanning {} objects", bucket.len());
    let result = reconstruct(&bucket, CollectorConfig::default())?;

    println!("{}", tree_to_json(&result.tree)?);
    println!();
    println!("Entries recorded: {}", result.collect_stats.entries_recorded);
    println!("Subtrees expanded: {}", result.materialize_stats.expanded);
    println!("Repeated references: {}", result.materialize_stats.repeated);
    println!("Dangling references: {}", result.materialize_stats.dangling);

    Ok(())
}
