//! Encoding of collection and reconstruction results

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::materialize::{MaterializedTree, Node};

/// Serialize `value` as JSON indented with four spaces
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .context("Failed to encode JSON")?;

    // serde_json only ever emits UTF-8
    String::from_utf8(buf).context("Failed to encode JSON")
}

/// Encode `tree` as JSON indented with four spaces.
///
/// Produces the same text as [`to_pretty_json`], but walks the tree with an
/// explicit stack so arbitrarily deep directory chains can be written.
pub fn write_tree_json<W: Write>(tree: &MaterializedTree, mut writer: W) -> Result<()> {
    if tree.is_empty() {
        writer.write_all(b"{}")?;
        return Ok(());
    }

    writer.write_all(b"{")?;
    let mut stack = vec![(tree.entries.iter(), true)];

    loop {
        let depth = stack.len();
        let Some((entries, first)) = stack.last_mut() else {
            break;
        };

        let Some((name, node)) = entries.next() else {
            stack.pop();
            writer.write_all(b"\n")?;
            write_indent(&mut writer, depth - 1)?;
            writer.write_all(b"}")?;
            continue;
        };

        if !*first {
            writer.write_all(b",")?;
        }
        *first = false;

        writer.write_all(b"\n")?;
        write_indent(&mut writer, depth)?;
        serde_json::to_writer(&mut writer, name)?;
        writer.write_all(b": ")?;

        match node {
            Node::Inode(id) => serde_json::to_writer(&mut writer, id)?,
            Node::Directory(subtree) if subtree.is_empty() => writer.write_all(b"{}")?,
            Node::Directory(subtree) => {
                writer.write_all(b"{")?;
                stack.push((subtree.entries.iter(), true));
            }
        }
    }

    Ok(())
}

fn write_indent<W: Write>(writer: &mut W, depth: usize) -> std::io::Result<()> {
    for _ in 0..depth {
        writer.write_all(b"    ")?;
    }
    Ok(())
}

/// Render `tree` with [`write_tree_json`] into a string
pub fn tree_to_json(tree: &MaterializedTree) -> Result<String> {
    let mut buf = Vec::new();
    write_tree_json(tree, &mut buf).context("Failed to encode JSON")?;
    String::from_utf8(buf).context("Failed to encode JSON")
}

/// One `path<TAB>inode` line per raw-id leaf
pub fn write_paths<W: Write>(tree: &MaterializedTree, mut writer: W) -> Result<()> {
    for (path, inode) in tree.leaves() {
        writeln!(writer, "{}\t{}", path, inode)?;
    }
    writer.flush()?;
    Ok(())
}

/// Open the output destination: stdout when `path` is `-`, otherwise a new file
pub fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if path == Path::new("-") {
        return Ok(Box::new(std::io::stdout().lock()));
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(Box::new(BufWriter::new(file)))
}

/// Write `contents` followed by a newline if it lacks one, then flush
pub fn write_contents<W: Write>(mut writer: W, contents: &str) -> Result<()> {
    writer
        .write_all(contents.as_bytes())
        .context("Failed to write output")?;
    if !contents.ends_with('\n') {
        writer.write_all(b"\n")?;
    }
    writer.flush().context("Failed to write output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjacency::AdjacencyMap;
    use crate::materialize::TreeMaterializer;

    fn tree() -> MaterializedTree {
        let map: AdjacencyMap = [("1", "dirA", "2"), ("2", "file1", "3")]
            .into_iter()
            .collect();
        TreeMaterializer::new(&map).materialize().tree
    }

    #[test]
    fn test_pretty_json_uses_four_space_indent() {
        let json = to_pretty_json(&tree()).unwrap();
        assert_eq!(
            json,
            "{\n    \"dirA\": {\n        \"file1\": \"3\"\n    }\n}"
        );
    }

    #[test]
    fn test_tree_writer_matches_serde_output() {
        let map: AdjacencyMap = [
            ("1", "b \"quoted\"", "2"),
            ("1", "a", "9"),
            ("2", "tab\there", "3"),
            ("2", "empty", "4"),
            ("4", "gone", "2"),
        ]
        .into_iter()
        .collect();
        let tree = TreeMaterializer::new(&map).materialize().tree;

        assert_eq!(tree_to_json(&tree).unwrap(), to_pretty_json(&tree).unwrap());
        assert_eq!(
            tree_to_json(&MaterializedTree::new()).unwrap(),
            to_pretty_json(&MaterializedTree::new()).unwrap()
        );
    }

    #[test]
    fn test_tree_writer_handles_deep_chains() {
        let n = 2_000;
        let map: AdjacencyMap = (1..=n)
            .map(|i| (i.to_string(), "d", (i + 1).to_string()))
            .collect();
        let tree = TreeMaterializer::new(&map).materialize().tree;

        let json = tree_to_json(&tree).unwrap();

        assert_eq!(json.lines().count(), 2 * n + 1);
        assert!(json.starts_with("{\n    \"d\": {\n        \"d\": {"));
        assert!(json.ends_with("\n    }\n}"));
        assert!(json.contains(&format!("\"d\": \"{}\"", n + 1)));
    }

    #[test]
    fn test_write_paths() {
        let mut out = Vec::new();
        write_paths(&tree(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "dirA/file1\t3\n");
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nso.json");

        write_contents(open_output(&path).unwrap(), "{}").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn test_write_contents_terminates_line() {
        let mut out = Vec::new();
        write_contents(&mut out, "{\n}").unwrap();
        write_contents(&mut out, "x\n").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\n}\nx\n");
    }
}
