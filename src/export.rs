//! JSON-lines export and import of node and edge records.
//!
//! One record per line, tagged with `"type": "node"` or `"type": "edge"`.
//! Nodes are written before edges, each sorted by id, so dumping the same
//! snapshot twice produces identical files.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Lines, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::LineageError,
    graph::{
        snapshot::GraphSnapshot,
        types::{AssetNode, EdgeRecord, LineageEdge, NodeRecord},
    },
    loader::{LineageSource, RecordStream},
};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DumpRecord {
    Node(AssetNode),
    Edge(LineageEdge),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DumpSummary {
    pub nodes: usize,
    pub edges: usize,
}

pub fn dump_snapshot_to_path<P: AsRef<Path>>(
    snapshot: &GraphSnapshot,
    path: P,
) -> Result<DumpSummary, LineageError> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| LineageError::invalid_input(format!("{}: {e}", path.display())))?;
    let mut writer = BufWriter::new(file);
    let summary = dump_snapshot_to_writer(snapshot, &mut writer)?;
    writer
        .flush()
        .map_err(|e| LineageError::invalid_input(e.to_string()))?;
    Ok(summary)
}

pub fn dump_snapshot_to_writer<W: Write>(
    snapshot: &GraphSnapshot,
    writer: W,
) -> Result<DumpSummary, LineageError> {
    let nodes = snapshot.nodes();
    let edges = snapshot.edges();
    write_records(nodes.iter().copied(), edges.iter().copied(), writer)
}

/// Writes arbitrary records in the dump format.
pub fn write_records<'a, N, E, W>(nodes: N, edges: E, mut writer: W) -> Result<DumpSummary, LineageError>
where
    N: IntoIterator<Item = &'a AssetNode>,
    E: IntoIterator<Item = &'a LineageEdge>,
    W: Write,
{
    let mut summary = DumpSummary::default();
    for node in nodes {
        write_line(&mut writer, &DumpRecord::Node(node.clone()))?;
        summary.nodes += 1;
    }
    for edge in edges {
        write_line(&mut writer, &DumpRecord::Edge(edge.clone()))?;
        summary.edges += 1;
    }
    Ok(summary)
}

fn write_line<W: Write>(writer: &mut W, record: &DumpRecord) -> Result<(), LineageError> {
    serde_json::to_writer(&mut *writer, record)?;
    writer
        .write_all(b"\n")
        .map_err(|e| LineageError::invalid_input(e.to_string()))
}

/// Reads every record from a dump, in file order.
pub fn read_records<R: BufRead>(reader: R) -> Result<(Vec<AssetNode>, Vec<LineageEdge>), LineageError> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for record in DumpLines::new(reader.lines()) {
        match record? {
            DumpRecord::Node(node) => nodes.push(node),
            DumpRecord::Edge(edge) => edges.push(edge),
        }
    }
    Ok((nodes, edges))
}

struct DumpLines<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl<R: BufRead> DumpLines<R> {
    fn new(lines: Lines<R>) -> Self {
        Self { lines, line_no: 0 }
    }
}

impl<R: BufRead> Iterator for DumpLines<R> {
    type Item = Result<DumpRecord, LineageError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(LineageError::load(e.to_string()))),
            };
            if line.trim().is_empty() {
                continue;
            }
            let line_no = self.line_no;
            return Some(serde_json::from_str(&line).map_err(|e| {
                LineageError::invalid_input(format!("line {line_no}: {e}"))
            }));
        }
    }
}

/// A dump file used as a loader source. Each listing re-reads the file and
/// streams the matching records.
#[derive(Clone, Debug)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<DumpLines<BufReader<File>>, LineageError> {
        let file = File::open(&self.path)
            .map_err(|e| LineageError::load(format!("{}: {e}", self.path.display())))?;
        Ok(DumpLines::new(BufReader::new(file).lines()))
    }
}

impl LineageSource for JsonlSource {
    fn list_nodes(&self) -> Result<RecordStream<'_, NodeRecord>, LineageError> {
        Ok(Box::new(self.open()?.filter_map(|record| match record {
            Ok(DumpRecord::Node(node)) => Some(Ok(node)),
            Ok(DumpRecord::Edge(_)) => None,
            Err(err) => Some(Err(err)),
        })))
    }

    fn list_edges(&self) -> Result<RecordStream<'_, EdgeRecord>, LineageError> {
        Ok(Box::new(self.open()?.filter_map(|record| match record {
            Ok(DumpRecord::Edge(edge)) => Some(Ok(edge)),
            Ok(DumpRecord::Node(_)) => None,
            Err(err) => Some(Err(err)),
        })))
    }
}
