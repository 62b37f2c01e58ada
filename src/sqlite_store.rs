//! SQLite-backed durable store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, params};
use tracing::debug;

use crate::{
    errors::LineageError,
    graph::{
        delta::GraphChange,
        types::{AssetNode, EdgeRecord, LineageEdge, NodeRecord},
    },
    impact::ImpactRecord,
    loader::{LineageSink, LineageSource, RecordStream},
    schema::ensure_schema,
};

const NODE_COLUMNS: &str = "node_id, asset_type, asset_name, schema_name, database_name, \
     parent_node_id, business_importance, metadata, tags";
const EDGE_COLUMNS: &str = "edge_id, source_node_id, target_node_id, lineage_type, \
     transformation_type, confidence, metadata";

pub struct SqliteLineageStore {
    conn: Mutex<Connection>,
}

struct RawNode {
    node_id: String,
    asset_type: String,
    asset_name: String,
    schema_name: Option<String>,
    database_name: Option<String>,
    parent_node_id: Option<String>,
    business_importance: f64,
    metadata: String,
    tags: String,
}

impl RawNode {
    fn decode(self) -> Result<AssetNode, LineageError> {
        let metadata = serde_json::from_str(&self.metadata).map_err(|e| {
            LineageError::storage(format!("node {} metadata: {e}", self.node_id))
        })?;
        let tags = serde_json::from_str(&self.tags)
            .map_err(|e| LineageError::storage(format!("node {} tags: {e}", self.node_id)))?;
        Ok(AssetNode {
            node_id: self.node_id,
            asset_type: self.asset_type,
            asset_name: self.asset_name,
            schema_name: self.schema_name,
            database_name: self.database_name,
            parent_node_id: self.parent_node_id,
            business_importance: self.business_importance,
            metadata,
            tags,
        })
    }
}

struct RawEdge {
    edge_id: String,
    source_node_id: String,
    target_node_id: String,
    lineage_type: String,
    transformation_type: Option<String>,
    confidence: f64,
    metadata: String,
}

impl RawEdge {
    fn decode(self) -> Result<LineageEdge, LineageError> {
        let metadata = serde_json::from_str(&self.metadata).map_err(|e| {
            LineageError::storage(format!("edge {} metadata: {e}", self.edge_id))
        })?;
        Ok(LineageEdge {
            edge_id: self.edge_id,
            source_node_id: self.source_node_id,
            target_node_id: self.target_node_id,
            lineage_type: self.lineage_type,
            transformation_type: self.transformation_type,
            confidence: self.confidence,
            metadata,
        })
    }
}

impl SqliteLineageStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LineageError> {
        let conn = Connection::open(path)
            .map_err(|e| LineageError::storage(format!("open: {e}")))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LineageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LineageError::storage(format!("open: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LineageError> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn upsert_node(&self, node: &AssetNode) -> Result<(), LineageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        upsert_node(&tx, node)?;
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_edge(&self, edge: &LineageEdge) -> Result<(), LineageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        upsert_edge(&tx, edge)?;
        tx.commit()?;
        Ok(())
    }

    /// Writes many records in one transaction.
    pub fn bulk_insert(&self, nodes: &[AssetNode], edges: &[LineageEdge]) -> Result<(), LineageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for node in nodes {
            upsert_node(&tx, node)?;
        }
        for edge in edges {
            upsert_edge(&tx, edge)?;
        }
        tx.commit()?;
        debug!(nodes = nodes.len(), edges = edges.len(), "bulk insert committed");
        Ok(())
    }

    pub fn delete_node(&self, node_id: &str) -> Result<bool, LineageError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM lineage_nodes WHERE node_id = ?1", params![node_id])?;
        Ok(removed > 0)
    }

    pub fn delete_edge(&self, edge_id: &str) -> Result<bool, LineageError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM lineage_edges WHERE edge_id = ?1", params![edge_id])?;
        Ok(removed > 0)
    }

    pub fn counts(&self) -> Result<(usize, usize), LineageError> {
        let conn = self.conn.lock();
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM lineage_nodes", [], |row| row.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM lineage_edges", [], |row| row.get(0))?;
        Ok((nodes as usize, edges as usize))
    }

    /// Stored impact analyses, oldest first, optionally for one source asset.
    pub fn impact_history(&self, source_asset: Option<&str>) -> Result<Vec<ImpactRecord>, LineageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT record FROM impact_analyses \
             WHERE ?1 IS NULL OR source_asset = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![source_asset], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for raw in rows {
            records.push(serde_json::from_str(&raw?)?);
        }
        Ok(records)
    }

    fn read_nodes(&self) -> Result<Vec<Result<NodeRecord, LineageError>>, LineageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM lineage_nodes ORDER BY node_id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(RawNode {
                node_id: row.get(0)?,
                asset_type: row.get(1)?,
                asset_name: row.get(2)?,
                schema_name: row.get(3)?,
                database_name: row.get(4)?,
                parent_node_id: row.get(5)?,
                business_importance: row.get(6)?,
                metadata: row.get(7)?,
                tags: row.get(8)?,
            })
        })?;
        Ok(rows
            .map(|row| row.map_err(LineageError::from).and_then(RawNode::decode))
            .collect())
    }

    fn read_edges(&self) -> Result<Vec<Result<EdgeRecord, LineageError>>, LineageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM lineage_edges ORDER BY edge_id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(RawEdge {
                edge_id: row.get(0)?,
                source_node_id: row.get(1)?,
                target_node_id: row.get(2)?,
                lineage_type: row.get(3)?,
                transformation_type: row.get(4)?,
                confidence: row.get(5)?,
                metadata: row.get(6)?,
            })
        })?;
        Ok(rows
            .map(|row| row.map_err(LineageError::from).and_then(RawEdge::decode))
            .collect())
    }
}

fn upsert_node(tx: &Transaction<'_>, node: &AssetNode) -> Result<(), LineageError> {
    let metadata = serde_json::to_string(&node.metadata)?;
    let tags = serde_json::to_string(&node.tags)?;
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO lineage_nodes({NODE_COLUMNS}) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            node.node_id,
            node.asset_type,
            node.asset_name,
            node.schema_name,
            node.database_name,
            node.parent_node_id,
            node.business_importance,
            metadata,
            tags,
        ],
    )?;
    Ok(())
}

fn upsert_edge(tx: &Transaction<'_>, edge: &LineageEdge) -> Result<(), LineageError> {
    let metadata = serde_json::to_string(&edge.metadata)?;
    tx.execute(
        &format!(
            "INSERT OR REPLACE INTO lineage_edges({EDGE_COLUMNS}) \
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            edge.edge_id,
            edge.source_node_id,
            edge.target_node_id,
            edge.lineage_type,
            edge.transformation_type,
            edge.confidence,
            metadata,
        ],
    )?;
    Ok(())
}

impl LineageSource for SqliteLineageStore {
    fn list_nodes(&self) -> Result<RecordStream<'_, NodeRecord>, LineageError> {
        Ok(Box::new(self.read_nodes()?.into_iter()))
    }

    fn list_edges(&self) -> Result<RecordStream<'_, EdgeRecord>, LineageError> {
        Ok(Box::new(self.read_edges()?.into_iter()))
    }
}

impl LineageSink for SqliteLineageStore {
    fn persist_changes(&self, changes: &[GraphChange]) -> Result<(), LineageError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for change in changes {
            match change {
                GraphChange::CreateNode(node) | GraphChange::UpdateNode(node) => {
                    upsert_node(&tx, node)?
                }
                GraphChange::DeleteNode(id) => {
                    tx.execute("DELETE FROM lineage_nodes WHERE node_id = ?1", params![id])?;
                }
                GraphChange::CreateEdge(edge) | GraphChange::UpdateEdge(edge) => {
                    upsert_edge(&tx, edge)?
                }
                GraphChange::DeleteEdge(id) => {
                    tx.execute("DELETE FROM lineage_edges WHERE edge_id = ?1", params![id])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn persist_impact_analysis(&self, record: &ImpactRecord) -> Result<(), LineageError> {
        let raw = serde_json::to_string(record)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO impact_analyses(source_asset, change_type, overall_score, overall_level, \
             impacted_count, analyzed_at, record) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.source_asset,
                record.change_type.to_string(),
                record.overall_impact_score,
                record.overall_impact_level.to_string(),
                record.impacted_count as i64,
                record.analyzed_at as i64,
                raw,
            ],
        )?;
        Ok(())
    }
}

